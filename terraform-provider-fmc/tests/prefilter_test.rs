// End to end tests of `fmc_prefilter_policy` against a mock FMC.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use terraform_provider_fmc::resources::{PrefilterPolicyResource, Resource, ResourceState};
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn policies_path() -> String {
    config_path("/policy/prefilterpolicies")
}

fn rules_path(policy_id: &str) -> String {
    format!("{}/{}/prefilterrules", policies_path(), policy_id)
}

fn state(value: Value) -> ResourceState {
    ResourceState::from_value(&value).unwrap()
}

/// Rule as read back from FMC
fn rule(id: &str, name: &str, action: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "rule_type": "PREFILTER",
        "action": action,
        "enabled": true,
        "bidirectional": false,
        "log_begin": false,
        "log_end": false,
        "send_events_to_fmc": false,
        "source_network_objects": null,
        "destination_network_objects": null
    })
}

#[tokio::test]
async fn test_failed_rules_keep_created_policy() {
    let server = fmc_server().await;

    Mock::given(method("POST"))
        .and(path(policies_path().as_str()))
        .and(body_partial_json(json!({"name": "edge", "type": "PrefilterPolicy"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pol-1",
            "name": "edge",
            "defaultAction": {"id": "da-1", "action": "BLOCK_TUNNELS"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(rules_path("pol-1").as_str()))
        .and(query_param("bulk", "true"))
        .respond_with(ResponseTemplate::new(400).set_body_json(fmc_error("Invalid action")))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let resource = PrefilterPolicyResource::new();
    let proposed = state(json!({
        "name": "edge",
        "default_action": "BLOCK_TUNNELS",
        "rules": [{"name": "a", "action": "BOGUS"}]
    }));

    let planned = resource.plan_change(None, &proposed).unwrap();
    let error = resource.create(&client, &planned).await.unwrap_err();

    let detail = error.diagnostics[0].detail.as_deref().unwrap_or_default();
    assert!(detail.contains("Invalid action"), "detail: {detail}");
    let partial = error.partial_state.expect("partial state");
    assert_eq!(partial.get_str("id"), Some("pol-1"));
    assert_eq!(partial.get_str("default_action_id"), Some("da-1"));
    assert_eq!(partial.get("rules"), Some(&json!([])));
}

#[tokio::test]
async fn test_update_rules_only() {
    let server = fmc_server().await;
    let rules = rules_path("pol-1");

    Mock::given(method("PUT"))
        .and(path(format!("{}/pol-1", policies_path()).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "pol-1"})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(rules.as_str()))
        .and(query_param("filter", "ids:r2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/r1", rules).as_str()))
        .and(body_partial_json(json!({"id": "r1", "name": "a", "action": "BLOCK"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(rules.as_str()))
        .and(query_param("bulk", "true"))
        .and(body_json(json!([{
            "name": "c",
            "type": "PrefilterRule",
            "ruleType": "PREFILTER",
            "action": "ANALYZE",
            "enabled": true,
            "logBegin": false,
            "logEnd": false,
            "sendEventsToFMC": false
        }])))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "items": [{"id": "r3", "name": "c"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let resource = PrefilterPolicyResource::new();
    let current = state(json!({
        "id": "pol-1",
        "name": "edge",
        "description": null,
        "default_action": "BLOCK_TUNNELS",
        "default_action_id": "da-1",
        "default_action_log_begin": false,
        "default_action_send_events_to_fmc": false,
        "rules": [rule("r1", "a", "FASTPATH"), rule("r2", "b", "FASTPATH")]
    }));
    let proposed = state(json!({
        "name": "edge",
        "description": null,
        "default_action": "BLOCK_TUNNELS",
        "rules": [
            {"name": "a", "action": "BLOCK"},
            {"name": "c", "action": "ANALYZE"}
        ]
    }));

    let planned = resource.plan_change(Some(&current), &proposed).unwrap();
    let updated = resource.update(&client, &current, &planned).await.unwrap();

    let rules = updated.get("rules").unwrap().as_array().unwrap();
    let ids: Vec<&str> = rules.iter().filter_map(|r| r["id"].as_str()).collect();
    assert_eq!(ids, vec!["r1", "r3"]);
    assert_eq!(rules[0]["action"], json!("BLOCK"));
    assert_eq!(updated.get_str("default_action_id"), Some("da-1"));
}
