// End to end tests of `fmc_hosts` against a mock FMC.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use terraform_provider_fmc::bulk::{diff_items, items_from_value};
use terraform_provider_fmc::resources::{BulkObjectsResource, HostKind, Resource, ResourceState, HOSTS_PATH};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn state(value: Value) -> ResourceState {
    ResourceState::from_value(&value).unwrap()
}

fn host(id: &str, ip: &str) -> Value {
    json!({"id": id, "ip": ip, "description": null, "overridable": null, "type": "Host"})
}

fn hosts() -> BulkObjectsResource<HostKind> {
    BulkObjectsResource::new(HostKind)
}

#[tokio::test]
async fn test_create_in_one_bulk_call() {
    let server = fmc_server().await;
    let path_hosts = config_path(HOSTS_PATH);

    Mock::given(method("POST"))
        .and(path(path_hosts.as_str()))
        .and(query_param("bulk", "true"))
        .and(body_json(json!([
            {"name": "db", "type": "Host", "value": "10.0.0.2", "overridable": false},
            {"name": "web", "type": "Host", "value": "10.0.0.1", "description": "frontend", "overridable": false}
        ])))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "items": [
                {"id": "id-db", "name": "db", "type": "Host", "value": "10.0.0.2"},
                {"id": "id-web", "name": "web", "type": "Host", "value": "10.0.0.1"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let resource = hosts();
    let proposed = state(json!({
        "items": {
            "web": {"ip": "10.0.0.1", "description": "frontend", "overridable": null},
            "db": {"ip": "10.0.0.2", "description": null, "overridable": null}
        }
    }));

    let planned = resource.plan_change(None, &proposed).unwrap();
    let created = resource.create(&client, &planned).await.unwrap();

    assert_eq!(created.get_str("id"), Some(DOMAIN_UUID));
    assert_eq!(created.get("items").unwrap()["web"]["id"], json!("id-web"));
    assert_eq!(created.get("items").unwrap()["db"]["id"], json!("id-db"));
}

#[tokio::test]
async fn test_failed_create_keeps_finished_steps() {
    let server = fmc_server().await;
    let path_hosts = config_path(HOSTS_PATH);

    Mock::given(method("DELETE"))
        .and(path(path_hosts.as_str()))
        .and(query_param("bulk", "true"))
        .and(query_param("filter", "ids:id-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/id-a", path_hosts).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "id-a", "name": "a"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(path_hosts.as_str()))
        .respond_with(ResponseTemplate::new(400).set_body_json(fmc_error("Invalid IP address")))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let resource = hosts();
    let current = state(json!({
        "id": DOMAIN_UUID,
        "items": {"a": host("id-a", "10.0.0.1"), "b": host("id-b", "10.0.0.2")}
    }));
    let proposed = state(json!({
        "items": {
            "a": {"ip": "10.0.0.9", "description": null, "overridable": null},
            "c": {"ip": "bogus", "description": null, "overridable": null}
        }
    }));

    let planned = resource.plan_change(Some(&current), &proposed).unwrap();
    let error = resource.update(&client, &current, &planned).await.unwrap_err();

    let detail = error.diagnostics[0].detail.as_deref().unwrap_or_default();
    assert!(detail.contains("Invalid IP address"), "detail: {detail}");
    let partial = error.partial_state.expect("partial state");
    let items = partial.get("items").unwrap().as_object().unwrap();
    let names: Vec<&str> = items.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["a"]);
    assert_eq!(items["a"]["id"], json!("id-a"));
    assert_eq!(items["a"]["ip"], json!("10.0.0.9"));
}

#[tokio::test]
async fn test_read_reports_drift() {
    let server = fmc_server().await;
    let path_hosts = config_path(HOSTS_PATH);

    Mock::given(method("GET"))
        .and(path(path_hosts.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "id-a", "name": "a-renamed", "type": "Host", "value": "10.0.0.1"},
                {"id": "id-x", "name": "unmanaged", "type": "Host", "value": "10.9.9.9"}
            ],
            "paging": {"offset": 0, "limit": 1000, "count": 2, "pages": 1}
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let current = state(json!({
        "id": DOMAIN_UUID,
        "items": {"a": host("id-a", "10.0.0.1"), "b": host("id-b", "10.0.0.2")}
    }));

    let refreshed = hosts().read(&client, &current).await.unwrap();
    let items = refreshed.get("items").unwrap().as_object().unwrap();

    // renamed outside Terraform, b is gone, unmanaged objects stay out
    let names: Vec<&str> = items.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["a-renamed"]);
    assert_eq!(items["a-renamed"]["id"], json!("id-a"));
}

#[tokio::test]
async fn test_delete_batches_ids() {
    let server = fmc_server().await;
    let path_hosts = config_path(HOSTS_PATH);

    Mock::given(method("DELETE"))
        .and(path(path_hosts.as_str()))
        .and(query_param("filter", "ids:id-a,id-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let current = state(json!({
        "id": DOMAIN_UUID,
        "items": {"a": host("id-a", "10.0.0.1"), "b": host("id-b", "10.0.0.2")}
    }));

    hosts().delete(&client, &current).await.unwrap();
}

#[tokio::test]
async fn test_unchanged_config_plans_no_change_after_read() {
    let server = fmc_server().await;
    let path_hosts = config_path(HOSTS_PATH);

    // FMC always reports overridable, even when it was never set
    Mock::given(method("GET"))
        .and(path(path_hosts.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "id-web", "name": "web", "type": "Host", "value": "10.0.0.1", "overridable": false}],
            "paging": {"offset": 0, "limit": 1000, "count": 1, "pages": 1}
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let resource = hosts();
    let current = state(json!({
        "id": DOMAIN_UUID,
        "items": {"web": host("id-web", "10.0.0.1")}
    }));

    let refreshed = resource.read(&client, &current).await.unwrap();
    let proposed = state(json!({
        "items": {"web": {"ip": "10.0.0.1", "description": null, "overridable": null}}
    }));
    let planned = resource.plan_change(Some(&refreshed), &proposed).unwrap();

    let changes = diff_items(
        &items_from_value(refreshed.get("items")),
        &items_from_value(planned.get("items")),
        &["type"],
    );
    assert!(changes.is_empty(), "unexpected changes: {changes:?}");
}
