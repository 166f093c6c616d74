//! Terraform Resources for FMC
//!
//! Defines the resources that can be managed via Terraform.

mod bulk_objects;
mod dynamic_object_mappings;
mod dynamic_objects;
mod host;
mod hosts;
mod prefilter_policy;
mod vpn_ra_connection_profiles;

pub use bulk_objects::{BulkObjectsResource, ObjectKind};
pub use dynamic_object_mappings::DynamicObjectMappingsResource;
pub use dynamic_objects::{DynamicObjectKind, DYNAMIC_OBJECTS_PATH};
pub use host::{HostResource, HOSTS_PATH};
pub use hosts::HostKind;
pub use prefilter_policy::PrefilterPolicyResource;
pub use vpn_ra_connection_profiles::VpnRaConnectionProfilesResource;

use crate::client::{ClientError, FmcClient};
use crate::import::ImportId;
use crate::schema::{Diagnostic, ResourceSchema};
use crate::version::FmcVersion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, Vec<Diagnostic>>;

/// Failure of an apply step.
///
/// `partial_state` is set when some remote changes already happened; the
/// provider stores it so the next plan starts from reality.
#[derive(Debug, Clone)]
pub struct ApplyError {
    pub diagnostics: Vec<Diagnostic>,
    pub partial_state: Option<ResourceState>,
}

impl ApplyError {
    pub fn partial(state: ResourceState, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            partial_state: Some(state),
        }
    }
}

impl From<Vec<Diagnostic>> for ApplyError {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            partial_state: None,
        }
    }
}

pub type ApplyResult<T> = Result<T, ApplyError>;

/// Resource state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub values: HashMap<String, Value>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// State from a JSON object; `None` for null or non-objects
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(|obj| Self {
            values: obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get_str(key).map(String::from)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.values
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Optional `domain` attribute
    pub fn domain(&self) -> Option<&str> {
        self.get_str("domain")
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Remote ID, or an error diagnostic naming `what`
    pub fn require_id(&self, what: &str) -> ResourceResult<String> {
        self.get_string("id")
            .ok_or_else(|| vec![Diagnostic::error(&format!("{} ID is required", what))])
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Diagnostic for a failed API call
pub fn api_error(action: &str, error: &ClientError) -> Vec<Diagnostic> {
    vec![Diagnostic::error(&format!("Failed to {}", action)).with_detail(&error.to_string())]
}

/// Resource trait
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &str;

    /// Get the schema for this resource
    fn schema(&self) -> ResourceSchema;

    /// Oldest FMC release supporting this resource
    fn min_version(&self) -> Option<FmcVersion> {
        None
    }

    /// Attributes whose change forces a new resource
    fn requires_replace(&self) -> &[&'static str] {
        &["domain"]
    }

    /// Create a new resource
    async fn create(&self, client: &FmcClient, planned: &ResourceState) -> ApplyResult<ResourceState>;

    /// Read an existing resource; an empty state means it is gone
    async fn read(&self, client: &FmcClient, current: &ResourceState) -> ResourceResult<ResourceState>;

    /// Update an existing resource
    async fn update(
        &self,
        client: &FmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ApplyResult<ResourceState>;

    /// Delete a resource
    async fn delete(&self, client: &FmcClient, current: &ResourceState) -> ApplyResult<()>;

    /// Plan changes. Default keeps the known ID.
    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let mut planned = proposed.clone();
        let id = current
            .and_then(|c| c.get("id").cloned())
            .unwrap_or(Value::Null);
        planned.set("id", id);
        Ok(planned)
    }

    /// Check the configuration before planning. Default enforces required attributes.
    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        missing_required(&self.schema(), config)
    }

    /// Minimal state handed to `read` after `terraform import`
    fn import_state(&self, id: &ImportId) -> ResourceResult<ResourceState> {
        let (domain, id) = id
            .single()
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;

        let mut state = ResourceState::new();
        state.set("id", Value::String(id));
        if let Some(domain) = domain {
            state.set("domain", Value::String(domain));
        }
        Ok(state)
    }
}

/// Error diagnostics for required attributes that are absent or null
pub fn missing_required(schema: &ResourceSchema, config: &ResourceState) -> Vec<Diagnostic> {
    let mut names: Vec<&String> = schema
        .block
        .attributes
        .iter()
        .filter(|(_, attr)| attr.required)
        .map(|(name, _)| name)
        .collect();
    names.sort();

    names
        .into_iter()
        .filter(|name| config.get(name).map_or(true, Value::is_null))
        .map(|name| {
            Diagnostic::error(&format!("Missing required attribute '{}'", name))
                .with_attribute(vec![name.clone()])
        })
        .collect()
}

/// Get all available resources
pub fn get_all_resources() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(HostResource::new()),
        Box::new(BulkObjectsResource::new(HostKind)),
        Box::new(BulkObjectsResource::new(DynamicObjectKind)),
        Box::new(DynamicObjectMappingsResource::new()),
        Box::new(VpnRaConnectionProfilesResource::new()),
        Box::new(PrefilterPolicyResource::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaAttribute, SchemaBlock};

    #[test]
    fn test_resource_state() {
        let mut state = ResourceState::new();
        state.set("name", serde_json::json!("web-server"));
        state.set("overridable", serde_json::json!(true));
        state.set("domain", serde_json::json!(""));

        assert_eq!(state.get_string("name"), Some("web-server".to_string()));
        assert_eq!(state.get_bool("overridable"), Some(true));
        assert_eq!(state.domain(), None);
        assert!(state.require_id("Host").is_err());
    }

    #[test]
    fn test_from_value() {
        let state = ResourceState::from_value(&serde_json::json!({"id": "1"})).unwrap();
        assert_eq!(state.get_str("id"), Some("1"));
        assert!(ResourceState::from_value(&Value::Null).is_none());
    }

    #[test]
    fn test_missing_required() {
        let schema = ResourceSchema::new(
            0,
            SchemaBlock::new()
                .with_attribute("name", SchemaAttribute::string().required())
                .with_attribute("ip", SchemaAttribute::string().required())
                .with_attribute("description", SchemaAttribute::string().optional()),
        );
        let mut config = ResourceState::new();
        config.set("name", serde_json::json!("h1"));
        config.set("ip", Value::Null);

        let diags = missing_required(&schema, &config);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("'ip'"));
    }

    #[test]
    fn test_resource_names_are_unique() {
        let resources = get_all_resources();
        let mut names: Vec<&str> = resources.iter().map(|r| r.type_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), resources.len());
        assert!(names.contains(&"fmc_hosts"));
        assert!(names.contains(&"fmc_prefilter_policy"));
    }
}
