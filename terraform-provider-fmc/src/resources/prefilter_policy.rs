//! `fmc_prefilter_policy`: a Prefilter Policy and its ordered rules

use super::{api_error, ApplyError, ApplyResult, Resource, ResourceResult, ResourceState};
use crate::bulk::{
    ids_by_name, plan_ordered, reconcile_ordered, BulkApi, PartialFailure, ID_FILTER_PREFIX,
};
use crate::client::{ClientError, FmcClient};
use crate::schema::{
    AttributeType, NestedBlock, NestingMode, ResourceSchema, SchemaAttribute, SchemaBlock,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub const PREFILTER_POLICIES_PATH: &str = "/policy/prefilterpolicies";

/// Rule booleans FMC reports as `false` when unset
const RULE_FLAGS: [&str; 4] = ["bidirectional", "log_begin", "log_end", "send_events_to_fmc"];

fn rules_path(policy_path: &str, policy_id: &str) -> String {
    format!("{}/{}/prefilterrules", policy_path, policy_id)
}

fn network_objects() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::object(&[
        ("id", AttributeType::String),
        ("type", AttributeType::String),
    ])))
}

fn policy_body(planned: &ResourceState, id: Option<&str>) -> Value {
    let mut default_action = json!({
        "type": "PrefilterPolicyDefaultAction",
        "action": planned.get_str("default_action").unwrap_or("ANALYZE_TUNNELS"),
        "logBegin": planned.get_bool("default_action_log_begin").unwrap_or(false),
        "sendEventsToFMC": planned.get_bool("default_action_send_events_to_fmc").unwrap_or(false),
    });
    if let Some(action_id) = planned.get_str("default_action_id") {
        default_action["id"] = json!(action_id);
    }

    let mut body = json!({
        "name": planned.get_str("name").unwrap_or_default(),
        "type": "PrefilterPolicy",
        "defaultAction": default_action,
    });
    if let Some(description) = planned.get_str("description") {
        body["description"] = json!(description);
    }
    if let Some(id) = id {
        body["id"] = json!(id);
    }
    body
}

/// Policy attributes from a remote policy
fn set_policy_fields(state: &mut ResourceState, remote: &Value) {
    let pointer = |path: &str| remote.pointer(path).cloned().unwrap_or(Value::Null);

    state.set("id", pointer("/id"));
    state.set("name", pointer("/name"));
    state.set("description", pointer("/description"));
    state.set("default_action", pointer("/defaultAction/action"));
    state.set("default_action_id", pointer("/defaultAction/id"));
    state.set(
        "default_action_log_begin",
        json!(remote.pointer("/defaultAction/logBegin").and_then(|v| v.as_bool()).unwrap_or(false)),
    );
    state.set(
        "default_action_send_events_to_fmc",
        json!(remote
            .pointer("/defaultAction/sendEventsToFMC")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)),
    );
}

fn objects_body(objects: Option<&Value>) -> Option<Value> {
    let objects = objects?.as_array().filter(|a| !a.is_empty())?;
    Some(json!({ "objects": objects }))
}

fn objects_from(remote: &Value, path: &str) -> Value {
    let objects: Vec<Value> = remote
        .pointer(path)
        .and_then(|v| v.as_array())
        .map(|objects| {
            objects
                .iter()
                .map(|o| json!({"id": o.get("id"), "type": o.get("type")}))
                .collect()
        })
        .unwrap_or_default();

    if objects.is_empty() {
        Value::Null
    } else {
        Value::Array(objects)
    }
}

fn rule_body(name: &str, rule: &Value) -> Value {
    let flag = |key: &str| rule.get(key).and_then(|v| v.as_bool()).unwrap_or(false);

    let mut body = json!({
        "name": name,
        "type": "PrefilterRule",
        "ruleType": rule.get("rule_type").and_then(|v| v.as_str()).unwrap_or("PREFILTER"),
        "action": rule.get("action"),
        "enabled": rule.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true),
        "logBegin": flag("log_begin"),
        "logEnd": flag("log_end"),
        "sendEventsToFMC": flag("send_events_to_fmc"),
    });
    if flag("bidirectional") {
        body["bidirectional"] = json!(true);
    }
    if let Some(objects) = objects_body(rule.get("source_network_objects")) {
        body["sourceNetworks"] = objects;
    }
    if let Some(objects) = objects_body(rule.get("destination_network_objects")) {
        body["destinationNetworks"] = objects;
    }
    body
}

fn rule_from_body(remote: &Value) -> Value {
    let flag = |key: &str| json!(remote.get(key).and_then(|v| v.as_bool()).unwrap_or(false));

    json!({
        "id": remote.get("id"),
        "name": remote.get("name"),
        "rule_type": remote.get("ruleType"),
        "action": remote.get("action"),
        "enabled": remote.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true),
        "bidirectional": flag("bidirectional"),
        "log_begin": flag("logBegin"),
        "log_end": flag("logEnd"),
        "send_events_to_fmc": flag("sendEventsToFMC"),
        "source_network_objects": objects_from(remote, "/sourceNetworks/objects"),
        "destination_network_objects": objects_from(remote, "/destinationNetworks/objects"),
    })
}

/// Planned rule with server defaults filled in
fn normalize_rule(rule: &Value) -> Value {
    let mut rule = rule.as_object().cloned().unwrap_or_else(Map::new);

    let unset = |rule: &Map<String, Value>, key: &str| rule.get(key).map_or(true, Value::is_null);
    if unset(&rule, "rule_type") {
        rule.insert("rule_type".to_string(), json!("PREFILTER"));
    }
    if unset(&rule, "enabled") {
        rule.insert("enabled".to_string(), json!(true));
    }
    for key in RULE_FLAGS {
        if unset(&rule, key) {
            rule.insert(key.to_string(), json!(false));
        }
    }
    for key in ["source_network_objects", "destination_network_objects"] {
        let empty = rule
            .get(key)
            .and_then(|v| v.as_array())
            .map_or(false, |a| a.is_empty());
        if empty {
            rule.insert(key.to_string(), Value::Null);
        }
    }

    Value::Object(rule)
}

fn rules_of(state: &ResourceState) -> Vec<Value> {
    state
        .get("rules")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Bulk endpoints of the rules of one policy
struct RulesApi {
    path: String,
}

#[async_trait]
impl BulkApi for RulesApi {
    async fn create_batch(
        &self,
        client: &FmcClient,
        items: &[(String, Value)],
    ) -> Result<HashMap<String, String>, ClientError> {
        let body: Vec<Value> = items.iter().map(|(name, rule)| rule_body(name, rule)).collect();
        let response: Value = client
            .post(&self.path, &[("bulk", "true".to_string())], &body)
            .await?;
        Ok(ids_by_name(&response))
    }

    async fn delete_batch(&self, client: &FmcClient, ids: &[String]) -> Result<(), ClientError> {
        let query = [
            ("bulk", "true".to_string()),
            ("filter", format!("{}{}", ID_FILTER_PREFIX, ids.join(","))),
        ];
        client.delete_with_query(&self.path, &query).await?;
        Ok(())
    }

    async fn update_item(
        &self,
        client: &FmcClient,
        id: &str,
        name: &str,
        rule: &Value,
    ) -> Result<(), ClientError> {
        let mut body = rule_body(name, rule);
        body["id"] = json!(id);
        client
            .put::<Value, _>(&format!("{}/{}", self.path, id), &body)
            .await?;
        Ok(())
    }
}

pub struct PrefilterPolicyResource;

impl PrefilterPolicyResource {
    pub fn new() -> Self {
        Self
    }

    async fn rules_api(&self, client: &FmcClient, state: &ResourceState, policy_id: &str) -> ResourceResult<RulesApi> {
        let policy_path = client
            .config_path(state.domain(), PREFILTER_POLICIES_PATH)
            .await
            .map_err(|e| api_error("resolve domain", &e))?;
        Ok(RulesApi {
            path: rules_path(&policy_path, policy_id),
        })
    }

    /// Reconcile rules; `state` already carries the policy fields
    async fn apply_rules(
        &self,
        client: &FmcClient,
        mut state: ResourceState,
        current_rules: &[Value],
        planned: &ResourceState,
    ) -> ApplyResult<ResourceState> {
        let policy_id = state.require_id("Prefilter policy")?;
        let api = self.rules_api(client, planned, &policy_id).await?;

        match reconcile_ordered(&api, client, current_rules, &rules_of(planned)).await {
            Ok(rules) => {
                state.set("rules", json!(rules));
                Ok(state)
            }
            Err(PartialFailure { state: rules, error }) => {
                state.set("rules", json!(rules));
                Err(ApplyError::partial(
                    state,
                    api_error("reconcile prefilter rules", &error),
                ))
            }
        }
    }
}

impl Default for PrefilterPolicyResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for PrefilterPolicyResource {
    fn type_name(&self) -> &str {
        "fmc_prefilter_policy"
    }

    fn schema(&self) -> ResourceSchema {
        let rule = SchemaBlock::new()
            .with_attribute("id", SchemaAttribute::string().computed())
            .with_attribute("name", SchemaAttribute::string().required())
            .with_attribute(
                "rule_type",
                SchemaAttribute::string()
                    .with_description("PREFILTER or TUNNEL")
                    .optional()
                    .with_default(json!("PREFILTER")),
            )
            .with_attribute(
                "action",
                SchemaAttribute::string()
                    .with_description("FASTPATH, ANALYZE or BLOCK")
                    .required(),
            )
            .with_attribute(
                "enabled",
                SchemaAttribute::bool().optional().with_default(json!(true)),
            )
            .with_attribute("bidirectional", SchemaAttribute::bool().optional())
            .with_attribute(
                "source_network_objects",
                SchemaAttribute::of_type(network_objects()).optional(),
            )
            .with_attribute(
                "destination_network_objects",
                SchemaAttribute::of_type(network_objects()).optional(),
            )
            .with_attribute("log_begin", SchemaAttribute::bool().optional())
            .with_attribute("log_end", SchemaAttribute::bool().optional())
            .with_attribute("send_events_to_fmc", SchemaAttribute::bool().optional())
            .with_description("Ordered rules; the first match wins");

        let block = SchemaBlock::new()
            .with_common_attributes()
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the policy")
                    .required(),
            )
            .with_attribute("description", SchemaAttribute::string().optional())
            .with_attribute(
                "default_action",
                SchemaAttribute::string()
                    .with_description("ANALYZE_TUNNELS or BLOCK_TUNNELS")
                    .required(),
            )
            .with_attribute("default_action_id", SchemaAttribute::string().computed())
            .with_attribute("default_action_log_begin", SchemaAttribute::bool().optional())
            .with_attribute(
                "default_action_send_events_to_fmc",
                SchemaAttribute::bool().optional(),
            )
            .with_block("rules", NestedBlock::new(NestingMode::List, rule))
            .with_description("Manages a Prefilter Policy with its rules");

        ResourceSchema::new(0, block)
    }

    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let mut planned = proposed.clone();
        for key in ["id", "default_action_id"] {
            planned.set(
                key,
                current.and_then(|c| c.get(key).cloned()).unwrap_or(Value::Null),
            );
        }
        for key in ["default_action_log_begin", "default_action_send_events_to_fmc"] {
            if planned.get_bool(key).is_none() {
                planned.set(key, json!(false));
            }
        }

        let prior = current.map(rules_of).unwrap_or_default();
        let proposed_rules: Vec<Value> = rules_of(proposed).iter().map(normalize_rule).collect();
        planned.set("rules", json!(plan_ordered(&prior, &proposed_rules)));
        Ok(planned)
    }

    async fn create(&self, client: &FmcClient, planned: &ResourceState) -> ApplyResult<ResourceState> {
        let path = client
            .config_path(planned.domain(), PREFILTER_POLICIES_PATH)
            .await
            .map_err(|e| api_error("resolve domain", &e))?;

        let created: Value = client
            .post(&path, &[], &policy_body(planned, None))
            .await
            .map_err(|e| api_error("create prefilter policy", &e))?;
        tracing::info!("Created prefilter policy {:?}", created.get("id"));

        let mut state = planned.clone();
        set_policy_fields(&mut state, &created);
        state.set("rules", json!([]));
        self.apply_rules(client, state, &[], planned).await
    }

    async fn read(&self, client: &FmcClient, current: &ResourceState) -> ResourceResult<ResourceState> {
        let id = current.require_id("Prefilter policy")?;
        let path = client
            .config_path(current.domain(), PREFILTER_POLICIES_PATH)
            .await
            .map_err(|e| api_error("resolve domain", &e))?;

        let remote: Value = match client.get(&format!("{}/{}", path, id)).await {
            Ok(policy) => policy,
            Err(e) if e.is_not_found() => return Ok(ResourceState::new()),
            Err(e) => return Err(api_error("read prefilter policy", &e)),
        };
        let rules = client
            .get_all(&rules_path(&path, &id), &[])
            .await
            .map_err(|e| api_error("read prefilter rules", &e))?;

        let mut state = current.clone();
        set_policy_fields(&mut state, &remote);
        state.set(
            "rules",
            Value::Array(rules.iter().map(rule_from_body).collect()),
        );
        Ok(state)
    }

    async fn update(
        &self,
        client: &FmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ApplyResult<ResourceState> {
        let id = current.require_id("Prefilter policy")?;
        let mut state = current.clone();

        let mut with_id = planned.clone();
        with_id.set("id", json!(id));
        with_id.set(
            "default_action_id",
            current.get("default_action_id").cloned().unwrap_or(Value::Null),
        );
        let body = policy_body(&with_id, Some(&id));
        if body != policy_body(current, Some(&id)) {
            let path = client
                .config_path(planned.domain(), PREFILTER_POLICIES_PATH)
                .await
                .map_err(|e| api_error("resolve domain", &e))?;
            let updated: Value = client
                .put(&format!("{}/{}", path, id), &body)
                .await
                .map_err(|e| api_error("update prefilter policy", &e))?;
            set_policy_fields(&mut state, &updated);
        }

        self.apply_rules(client, state, &rules_of(current), planned).await
    }

    async fn delete(&self, client: &FmcClient, current: &ResourceState) -> ApplyResult<()> {
        let id = current.require_id("Prefilter policy")?;
        let path = client
            .config_path(current.domain(), PREFILTER_POLICIES_PATH)
            .await
            .map_err(|e| api_error("resolve domain", &e))?;

        // rules are removed together with the policy
        match client.delete(&format!("{}/{}", path, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(api_error("delete prefilter policy", &e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn planned_policy() -> ResourceState {
        let mut state = ResourceState::new();
        state.set("name", json!("edge"));
        state.set("default_action", json!("BLOCK_TUNNELS"));
        state
    }

    #[test]
    fn test_policy_body() {
        let body = policy_body(&planned_policy(), None);
        assert_eq!(
            body,
            json!({
                "name": "edge",
                "type": "PrefilterPolicy",
                "defaultAction": {
                    "type": "PrefilterPolicyDefaultAction",
                    "action": "BLOCK_TUNNELS",
                    "logBegin": false,
                    "sendEventsToFMC": false
                }
            })
        );
    }

    #[test]
    fn test_rule_body() {
        let body = rule_body(
            "allow-dns",
            &json!({
                "action": "FASTPATH",
                "source_network_objects": [{"id": "n1", "type": "Network"}],
                "destination_network_objects": [],
                "log_end": true
            }),
        );

        assert_eq!(
            body,
            json!({
                "name": "allow-dns",
                "type": "PrefilterRule",
                "ruleType": "PREFILTER",
                "action": "FASTPATH",
                "enabled": true,
                "logBegin": false,
                "logEnd": true,
                "sendEventsToFMC": false,
                "sourceNetworks": {"objects": [{"id": "n1", "type": "Network"}]}
            })
        );
    }

    #[test]
    fn test_remote_rule_matches_normalized_plan() {
        let remote = json!({
            "id": "r1",
            "name": "allow-dns",
            "type": "PrefilterRule",
            "ruleType": "PREFILTER",
            "action": "FASTPATH",
            "enabled": true,
            "sourceNetworks": {"objects": [{"id": "n1", "type": "Network", "name": "dns"}]},
            "logBegin": false,
            "logEnd": false,
            "sendEventsToFMC": false
        });
        let mut planned = normalize_rule(&json!({
            "name": "allow-dns",
            "action": "FASTPATH",
            "source_network_objects": [{"id": "n1", "type": "Network"}],
            "destination_network_objects": []
        }));
        planned["id"] = json!("r1");

        assert_eq!(rule_from_body(&remote), planned);
    }

    #[test]
    fn test_plan_keeps_rule_ids() {
        let resource = PrefilterPolicyResource::new();
        let mut current = planned_policy();
        current.set("id", json!("p1"));
        current.set("default_action_id", json!("da1"));
        current.set(
            "rules",
            json!([normalize_rule(&json!({"id": "r1", "name": "a", "action": "BLOCK"}))]),
        );

        let mut proposed = planned_policy();
        proposed.set(
            "rules",
            json!([{"name": "a", "action": "BLOCK"}, {"name": "b", "action": "FASTPATH"}]),
        );

        let planned = resource.plan_change(Some(&current), &proposed).unwrap();
        let rules = planned.get("rules").unwrap();

        assert_eq!(planned.get_str("id"), Some("p1"));
        assert_eq!(planned.get_str("default_action_id"), Some("da1"));
        assert_eq!(rules[0]["id"], json!("r1"));
        assert_eq!(rules[1]["id"], Value::Null);
        assert_eq!(rules[1]["enabled"], json!(true));
    }

    #[test]
    fn test_schema_rules_block() {
        let schema = PrefilterPolicyResource::new().schema();
        let rules = &schema.block.blocks["rules"];

        assert_eq!(rules.nesting_mode, NestingMode::List);
        assert!(rules.block.attributes["action"].required);
        assert!(schema.block.attributes["default_action_id"].computed);
    }
}
