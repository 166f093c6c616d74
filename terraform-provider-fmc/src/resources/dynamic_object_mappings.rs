//! `fmc_dynamic_object_mappings`: the IP mappings of one Dynamic Object
//!
//! Mappings have no IDs of their own. Changes go through the
//! `dynamicobjectmappings` endpoint as `remove` and `add` batches; removes
//! are sent first so an address moving between objects never collides.

use super::dynamic_objects::DYNAMIC_OBJECTS_PATH;
use super::{api_error, ApplyError, ApplyResult, Resource, ResourceResult, ResourceState};
use crate::bulk::batch::json_weight;
use crate::bulk::{batches, BatchLimits};
use crate::client::{ClientError, FmcClient};
use crate::import::ImportId;
use crate::schema::{AttributeType, Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};
use crate::version::FmcVersion;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;

pub const MAPPINGS_PATH: &str = "/object/dynamicobjectmappings";

/// Per request ceiling on mappings and body size
pub const MAPPING_LIMITS: BatchLimits = BatchLimits::new(1000, 2_000_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MappingAction {
    Add,
    Remove,
}

impl MappingAction {
    fn key(self) -> &'static str {
        match self {
            MappingAction::Add => "add",
            MappingAction::Remove => "remove",
        }
    }
}

/// Body of one `dynamicobjectmappings` call
fn mapping_body(action: MappingAction, object_id: &str, mappings: &[String]) -> Value {
    json!({
        action.key(): [{
            "mappings": mappings,
            "dynamicObject": {"id": object_id}
        }]
    })
}

pub struct DynamicObjectMappingsResource;

impl DynamicObjectMappingsResource {
    pub fn new() -> Self {
        Self
    }

    /// Send `targets` in batches, keeping `running` equal to what FMC holds
    async fn send(
        &self,
        client: &FmcClient,
        path: &str,
        object_id: &str,
        action: MappingAction,
        targets: Vec<String>,
        running: &mut BTreeSet<String>,
    ) -> Result<(), ClientError> {
        let groups = batches(targets, MAPPING_LIMITS, |m| json_weight(&json!(m)));
        let total = groups.len();

        for (index, group) in groups.into_iter().enumerate() {
            tracing::info!(
                "Dynamic object {}: {} batch {}/{} ({} mappings)",
                object_id,
                action.key(),
                index + 1,
                total,
                group.len()
            );
            client
                .post::<Value, _>(path, &[], &mapping_body(action, object_id, &group))
                .await?;

            for mapping in group {
                match action {
                    MappingAction::Add => running.insert(mapping),
                    MappingAction::Remove => running.remove(&mapping),
                };
            }
        }

        Ok(())
    }

    async fn apply(
        &self,
        client: &FmcClient,
        current: &BTreeSet<String>,
        planned: &ResourceState,
    ) -> ApplyResult<ResourceState> {
        let object_id = planned
            .get_string("dynamic_object_id")
            .ok_or_else(|| vec![Diagnostic::error("dynamic_object_id is required")])?;
        let path = client
            .config_path(planned.domain(), MAPPINGS_PATH)
            .await
            .map_err(|e| api_error("resolve domain", &e))?;

        let wanted: BTreeSet<String> = planned.get_strings("mappings").into_iter().collect();
        let remove: Vec<String> = current.difference(&wanted).cloned().collect();
        let add: Vec<String> = wanted.difference(current).cloned().collect();

        let mut running = current.clone();
        let result = match self
            .send(client, &path, &object_id, MappingAction::Remove, remove, &mut running)
            .await
        {
            Ok(()) => {
                self.send(client, &path, &object_id, MappingAction::Add, add, &mut running)
                    .await
            }
            Err(e) => Err(e),
        };

        let state = with_mappings(planned, &object_id, &running);
        match result {
            Ok(()) => Ok(state),
            Err(e) => Err(ApplyError::partial(
                state,
                api_error("update dynamic object mappings", &e),
            )),
        }
    }
}

impl Default for DynamicObjectMappingsResource {
    fn default() -> Self {
        Self::new()
    }
}

fn with_mappings(base: &ResourceState, object_id: &str, mappings: &BTreeSet<String>) -> ResourceState {
    let mut state = base.clone();
    state.set("id", json!(object_id));
    state.set("dynamic_object_id", json!(object_id));
    state.set("mappings", json!(mappings));
    state
}

#[async_trait]
impl Resource for DynamicObjectMappingsResource {
    fn type_name(&self) -> &str {
        "fmc_dynamic_object_mappings"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_common_attributes()
            .with_attribute(
                "dynamic_object_id",
                SchemaAttribute::string()
                    .with_description("ID of the Dynamic Object")
                    .required(),
            )
            .with_attribute(
                "mappings",
                SchemaAttribute::set(AttributeType::String)
                    .with_description("IP addresses or networks mapped to the object")
                    .required(),
            )
            .with_description("Manages all mappings of a Dynamic Object");

        ResourceSchema::new(0, block)
    }

    fn min_version(&self) -> Option<FmcVersion> {
        Some(FmcVersion::new(7, 1, 0))
    }

    fn requires_replace(&self) -> &[&'static str] {
        &["dynamic_object_id", "domain"]
    }

    async fn create(&self, client: &FmcClient, planned: &ResourceState) -> ApplyResult<ResourceState> {
        // the object may already carry mappings pushed by another tool
        let existing = read_mappings(client, planned).await?.unwrap_or_default();
        if !existing.is_empty() {
            tracing::warn!(
                "Dynamic object already has {} mappings, taking ownership",
                existing.len()
            );
        }
        self.apply(client, &existing, planned).await
    }

    async fn read(&self, client: &FmcClient, current: &ResourceState) -> ResourceResult<ResourceState> {
        let Some(mappings) = read_mappings(client, current).await? else {
            return Ok(ResourceState::new());
        };
        let object_id = current
            .get_string("dynamic_object_id")
            .or_else(|| current.get_string("id"))
            .unwrap_or_default();
        Ok(with_mappings(current, &object_id, &mappings))
    }

    async fn update(
        &self,
        client: &FmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ApplyResult<ResourceState> {
        let state: BTreeSet<String> = current.get_strings("mappings").into_iter().collect();
        self.apply(client, &state, planned).await
    }

    async fn delete(&self, client: &FmcClient, current: &ResourceState) -> ApplyResult<()> {
        let mut empty = current.clone();
        empty.set("mappings", json!([]));
        let state: BTreeSet<String> = current.get_strings("mappings").into_iter().collect();
        self.apply(client, &state, &empty).await.map(|_| ())
    }

    fn import_state(&self, id: &ImportId) -> ResourceResult<ResourceState> {
        let (domain, object_id) = id
            .single()
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        let mut state = ResourceState::new();
        state.set("id", json!(object_id));
        state.set("dynamic_object_id", json!(object_id));
        if let Some(domain) = domain {
            state.set("domain", json!(domain));
        }
        Ok(state)
    }
}

/// Current mappings of the object; `None` when the object is gone
async fn read_mappings(
    client: &FmcClient,
    state: &ResourceState,
) -> ResourceResult<Option<BTreeSet<String>>> {
    let object_id = state
        .get_string("dynamic_object_id")
        .or_else(|| state.get_string("id"))
        .ok_or_else(|| vec![Diagnostic::error("dynamic_object_id is required")])?;
    let path = client
        .config_path(
            state.domain(),
            &format!("{}/{}/mappings", DYNAMIC_OBJECTS_PATH, object_id),
        )
        .await
        .map_err(|e| api_error("resolve domain", &e))?;

    match client.get_all(&path, &[]).await {
        Ok(items) => Ok(Some(
            items
                .iter()
                .filter_map(|item| item.get("mapping").and_then(|m| m.as_str()))
                .map(String::from)
                .collect(),
        )),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(api_error("read dynamic object mappings", &e)),
    }
}
