//! `fmc_vpn_ra_connection_profiles`: connection profiles of a Remote Access VPN
//!
//! FMC has no bulk endpoint for connection profiles, so the shared
//! reconciliation runs with batches of one. Every RA VPN owns a
//! `DefaultWEBVPNGroup` profile that cannot be created or deleted: it is
//! adopted (looked up and updated) on create and left alone on delete.

use super::bulk_objects::match_remote;
use super::hosts::field;
use super::{api_error, ApplyError, ApplyResult, Resource, ResourceResult, ResourceState};
use crate::bulk::{
    carry_ids, delete_all, items_from_value, items_to_value, reconcile, BatchLimits, BulkApi,
    ItemMap, PartialFailure,
};
use crate::client::{ClientError, FmcClient};
use crate::import::ImportId;
use crate::schema::{AttributeType, Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};
use crate::version::FmcVersion;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub const DEFAULT_PROFILE: &str = "DefaultWEBVPNGroup";

const PROFILE_TYPE: &str = "RaVpnConnectionProfile";

fn profiles_path(vpn_ra_id: &str) -> String {
    format!("/policy/ravpns/{}/connectionprofiles", vpn_ra_id)
}

/// Request body for one profile
fn to_body(name: &str, item: &Value) -> Value {
    let mut body = Map::new();
    body.insert("name".to_string(), json!(name));
    body.insert("type".to_string(), json!(PROFILE_TYPE));

    if let Some(id) = item.get("group_policy_id").and_then(|v| v.as_str()) {
        body.insert("groupPolicy".to_string(), json!({"id": id, "type": "RAVpnGroupPolicy"}));
    }

    let pools: Vec<Value> = item
        .get("ipv4_address_pools")
        .and_then(|v| v.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str())
                .map(|id| json!({"id": id, "type": "IPv4AddressPool"}))
                .collect()
        })
        .unwrap_or_default();
    if !pools.is_empty() {
        body.insert("ipv4AddressPool".to_string(), Value::Array(pools));
    }

    if let Some(method) = item.get("authentication_method").and_then(|v| v.as_str()) {
        body.insert("authenticationMethod".to_string(), json!(method));
    }

    if let Some(id) = item.get("authentication_server_id").and_then(|v| v.as_str()) {
        let kind = item
            .get("authentication_server_type")
            .and_then(|v| v.as_str())
            .unwrap_or("RadiusServerGroup");
        body.insert(
            "primaryAuthenticationServer".to_string(),
            json!({"id": id, "type": kind}),
        );
    }

    Value::Object(body)
}

/// State item from a remote profile
fn from_body(remote: &Value) -> Value {
    let pools: Vec<Value> = remote
        .get("ipv4AddressPool")
        .and_then(|v| v.as_array())
        .map(|pools| pools.iter().filter_map(|p| p.get("id").cloned()).collect())
        .unwrap_or_default();

    json!({
        "id": field(remote, "id"),
        "type": PROFILE_TYPE,
        "group_policy_id": remote.pointer("/groupPolicy/id").cloned().unwrap_or(Value::Null),
        "ipv4_address_pools": if pools.is_empty() { Value::Null } else { Value::Array(pools) },
        "authentication_method": field(remote, "authenticationMethod"),
        "authentication_server_id": remote
            .pointer("/primaryAuthenticationServer/id")
            .cloned()
            .unwrap_or(Value::Null),
        "authentication_server_type": remote
            .pointer("/primaryAuthenticationServer/type")
            .cloned()
            .unwrap_or(Value::Null),
    })
}

struct ProfilesApi {
    path: String,
}

impl ProfilesApi {
    /// Remote ID of the built-in profile
    async fn default_profile_id(&self, client: &FmcClient) -> Result<String, ClientError> {
        let profiles = client.get_all(&self.path, &[]).await?;
        profiles
            .iter()
            .find(|p| p.get("name").and_then(|n| n.as_str()) == Some(DEFAULT_PROFILE))
            .and_then(|p| p.get("id").and_then(|id| id.as_str()))
            .map(String::from)
            .ok_or_else(|| ClientError::NotFound(format!("{} in {}", DEFAULT_PROFILE, self.path)))
    }
}

#[async_trait]
impl BulkApi for ProfilesApi {
    async fn create_batch(
        &self,
        client: &FmcClient,
        items: &[(String, Value)],
    ) -> Result<HashMap<String, String>, ClientError> {
        let mut ids = HashMap::new();

        for (name, item) in items {
            if name == DEFAULT_PROFILE {
                let id = self.default_profile_id(client).await?;
                tracing::info!("Adopting existing {} ({})", DEFAULT_PROFILE, id);
                self.update_item(client, &id, name, item).await?;
                ids.insert(name.clone(), id);
                continue;
            }

            let created: Value = client.post(&self.path, &[], &to_body(name, item)).await?;
            let id = created
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ClientError::InvalidResponse(format!("no id for profile '{}'", name)))?;
            ids.insert(name.clone(), id.to_string());
        }

        Ok(ids)
    }

    async fn delete_batch(&self, client: &FmcClient, ids: &[String]) -> Result<(), ClientError> {
        for id in ids {
            match client.delete(&format!("{}/{}", self.path, id)).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn update_item(
        &self,
        client: &FmcClient,
        id: &str,
        name: &str,
        item: &Value,
    ) -> Result<(), ClientError> {
        let mut body = to_body(name, item);
        if let Some(object) = body.as_object_mut() {
            object.insert("id".to_string(), json!(id));
        }
        client
            .put::<Value, _>(&format!("{}/{}", self.path, id), &body)
            .await?;
        Ok(())
    }

    fn create_limits(&self) -> BatchLimits {
        BatchLimits::single()
    }

    fn delete_limits(&self) -> BatchLimits {
        BatchLimits::single()
    }

    fn ignored_keys(&self) -> &[&'static str] {
        &["type"]
    }

    fn undeletable(&self, name: &str) -> bool {
        name == DEFAULT_PROFILE
    }
}

pub struct VpnRaConnectionProfilesResource;

impl VpnRaConnectionProfilesResource {
    pub fn new() -> Self {
        Self
    }

    async fn api(&self, client: &FmcClient, state: &ResourceState) -> ResourceResult<ProfilesApi> {
        let vpn_ra_id = state
            .get_string("vpn_ra_id")
            .ok_or_else(|| vec![Diagnostic::error("vpn_ra_id is required")])?;
        let path = client
            .config_path(state.domain(), &profiles_path(&vpn_ra_id))
            .await
            .map_err(|e| api_error("resolve domain", &e))?;
        Ok(ProfilesApi { path })
    }

    async fn apply(
        &self,
        client: &FmcClient,
        state: &ItemMap,
        planned: &ResourceState,
    ) -> ApplyResult<ResourceState> {
        let api = self.api(client, planned).await?;
        let plan = items_from_value(planned.get("items"));

        match reconcile(&api, client, state, &plan).await {
            Ok(items) => Ok(with_items(planned, &items)),
            Err(PartialFailure { state, error }) => Err(ApplyError::partial(
                with_items(planned, &state),
                api_error("update connection profiles", &error),
            )),
        }
    }
}

impl Default for VpnRaConnectionProfilesResource {
    fn default() -> Self {
        Self::new()
    }
}

fn with_items(base: &ResourceState, items: &ItemMap) -> ResourceState {
    let mut state = base.clone();
    state.set("id", base.get("vpn_ra_id").cloned().unwrap_or(Value::Null));
    state.set("items", items_to_value(items));
    state
}

#[async_trait]
impl Resource for VpnRaConnectionProfilesResource {
    fn type_name(&self) -> &str {
        "fmc_vpn_ra_connection_profiles"
    }

    fn schema(&self) -> ResourceSchema {
        let profile = AttributeType::object(&[
            ("id", AttributeType::String),
            ("type", AttributeType::String),
            ("group_policy_id", AttributeType::String),
            ("ipv4_address_pools", AttributeType::List(Box::new(AttributeType::String))),
            ("authentication_method", AttributeType::String),
            ("authentication_server_id", AttributeType::String),
            ("authentication_server_type", AttributeType::String),
        ]);

        let block = SchemaBlock::new()
            .with_common_attributes()
            .with_attribute(
                "vpn_ra_id",
                SchemaAttribute::string()
                    .with_description("ID of the parent Remote Access VPN policy")
                    .required(),
            )
            .with_attribute(
                "items",
                SchemaAttribute::map(profile)
                    .with_description(
                        "Connection profiles keyed by name. DefaultWEBVPNGroup is adopted, never deleted",
                    )
                    .required(),
            )
            .with_description("Manages the connection profiles of a Remote Access VPN");

        ResourceSchema::new(0, block)
    }

    fn min_version(&self) -> Option<FmcVersion> {
        Some(FmcVersion::new(7, 2, 0))
    }

    fn requires_replace(&self) -> &[&'static str] {
        &["vpn_ra_id", "domain"]
    }

    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let prior = current.map(|c| items_from_value(c.get("items")));
        let mut items = carry_ids(prior.as_ref(), &items_from_value(proposed.get("items")));
        for item in items.values_mut() {
            if let Some(object) = item.as_object_mut() {
                object.insert("type".to_string(), json!(PROFILE_TYPE));
            }
        }

        let mut planned = proposed.clone();
        planned.set("id", proposed.get("vpn_ra_id").cloned().unwrap_or(Value::Null));
        planned.set("items", items_to_value(&items));
        Ok(planned)
    }

    async fn create(&self, client: &FmcClient, planned: &ResourceState) -> ApplyResult<ResourceState> {
        self.apply(client, &ItemMap::new(), planned).await
    }

    async fn read(&self, client: &FmcClient, current: &ResourceState) -> ResourceResult<ResourceState> {
        let api = self.api(client, current).await?;
        let remote = match client.get_all(&api.path, &[]).await {
            Ok(remote) => remote,
            // the parent RA VPN is gone
            Err(e) if e.is_not_found() => return Ok(ResourceState::new()),
            Err(e) => return Err(api_error("read connection profiles", &e)),
        };

        let owned = items_from_value(current.get("items"));
        let items = match_remote(&owned, &remote, from_body);
        Ok(with_items(current, &items))
    }

    async fn update(
        &self,
        client: &FmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ApplyResult<ResourceState> {
        let state = items_from_value(current.get("items"));
        self.apply(client, &state, planned).await
    }

    async fn delete(&self, client: &FmcClient, current: &ResourceState) -> ApplyResult<()> {
        let api = self.api(client, current).await?;
        let state = items_from_value(current.get("items"));

        delete_all(&api, client, &state).await.map_err(|failure| {
            ApplyError::partial(
                with_items(current, &failure.state),
                api_error("delete connection profiles", &failure.error),
            )
        })
    }

    fn import_state(&self, id: &ImportId) -> ResourceResult<ResourceState> {
        let (domain, vpn_ra_id, names) = id
            .parent_list()
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        let items: ItemMap = names
            .into_iter()
            .map(|name| (name, json!({"id": null})))
            .collect();

        let mut state = ResourceState::new();
        state.set("vpn_ra_id", json!(vpn_ra_id));
        if let Some(domain) = domain {
            state.set("domain", json!(domain));
        }
        Ok(with_items(&state, &items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_to_body() {
        let body = to_body(
            "Corp",
            &json!({
                "id": "p1",
                "group_policy_id": "gp1",
                "ipv4_address_pools": ["pool1"],
                "authentication_method": "AAA_ONLY",
                "authentication_server_id": null
            }),
        );

        assert_eq!(
            body,
            json!({
                "name": "Corp",
                "type": "RaVpnConnectionProfile",
                "groupPolicy": {"id": "gp1", "type": "RAVpnGroupPolicy"},
                "ipv4AddressPool": [{"id": "pool1", "type": "IPv4AddressPool"}],
                "authenticationMethod": "AAA_ONLY"
            })
        );
    }

    #[test]
    fn test_from_body() {
        let item = from_body(&json!({
            "id": "p1",
            "name": "Corp",
            "groupPolicy": {"id": "gp1", "name": "DfltGrpPolicy"},
            "primaryAuthenticationServer": {"id": "r1", "type": "RadiusServerGroup"}
        }));

        assert_eq!(item["group_policy_id"], json!("gp1"));
        assert_eq!(item["authentication_server_type"], json!("RadiusServerGroup"));
        assert_eq!(item["ipv4_address_pools"], Value::Null);
    }

    #[test]
    fn test_default_profile_is_undeletable() {
        let api = ProfilesApi {
            path: profiles_path("ra1"),
        };
        assert!(api.undeletable(DEFAULT_PROFILE));
        assert!(!api.undeletable("Corp"));
        assert_eq!(api.create_limits(), BatchLimits::single());
    }

    #[test]
    fn test_plan_uses_parent_id() {
        let resource = VpnRaConnectionProfilesResource::new();
        let mut proposed = ResourceState::new();
        proposed.set("vpn_ra_id", json!("ra1"));
        proposed.set("items", json!({"Corp": {"group_policy_id": "gp1"}}));

        let planned = resource.plan_change(None, &proposed).unwrap();

        assert_eq!(planned.get_str("id"), Some("ra1"));
        assert_eq!(planned.get("items").unwrap()["Corp"]["id"], Value::Null);
        assert_eq!(planned.get("items").unwrap()["Corp"]["type"], json!(PROFILE_TYPE));
    }

    #[test]
    fn test_import() {
        let resource = VpnRaConnectionProfilesResource::new();
        let id = ImportId::parse("ra1,[DefaultWEBVPNGroup,Corp]").unwrap();

        let state = resource.import_state(&id).unwrap();

        assert_eq!(state.get_str("id"), Some("ra1"));
        assert_eq!(state.get_str("vpn_ra_id"), Some("ra1"));
        assert_eq!(
            state.get("items"),
            Some(&json!({"Corp": {"id": null}, "DefaultWEBVPNGroup": {"id": null}}))
        );
    }
}
