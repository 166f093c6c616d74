//! `fmc_host`: a single Host network object

use super::{api_error, ApplyResult, Resource, ResourceResult, ResourceState};
use crate::client::FmcClient;
use crate::schema::{ResourceSchema, SchemaAttribute, SchemaBlock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const HOSTS_PATH: &str = "/object/hosts";

/// Host object as exchanged with FMC
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", default = "host_type")]
    pub kind: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overridable: Option<bool>,
}

fn host_type() -> String {
    "Host".to_string()
}

impl HostBody {
    fn to_state(&self, domain: Option<&str>) -> ResourceState {
        let mut state = ResourceState::new();
        state.set("id", json!(self.id));
        state.set("name", json!(self.name));
        state.set("ip", json!(self.value));
        state.set("type", json!(self.kind));
        state.set("description", json!(self.description));
        state.set("overridable", json!(self.overridable));
        if let Some(domain) = domain {
            state.set("domain", json!(domain));
        }
        state
    }
}

fn to_body(planned: &ResourceState, id: Option<String>) -> HostBody {
    HostBody {
        id,
        name: planned.get_string("name").unwrap_or_default(),
        kind: host_type(),
        value: planned.get_string("ip").unwrap_or_default(),
        description: planned.get_string("description"),
        overridable: planned.get_bool("overridable"),
    }
}

pub struct HostResource;

impl HostResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HostResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for HostResource {
    fn type_name(&self) -> &str {
        "fmc_host"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_common_attributes()
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the object")
                    .required(),
            )
            .with_attribute(
                "ip",
                SchemaAttribute::string()
                    .with_description("IP address of the host")
                    .required(),
            )
            .with_attribute(
                "description",
                SchemaAttribute::string()
                    .with_description("Description")
                    .optional(),
            )
            .with_attribute(
                "overridable",
                SchemaAttribute::bool()
                    .with_description("Whether the object values can be overridden")
                    .optional(),
            )
            .with_attribute(
                "type",
                SchemaAttribute::string()
                    .with_description("Type of the object; always 'Host'")
                    .computed(),
            )
            .with_description("Manages a Host object");

        ResourceSchema::new(0, block)
    }

    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let mut planned = proposed.clone();
        planned.set(
            "id",
            current.and_then(|c| c.get("id").cloned()).unwrap_or(Value::Null),
        );
        planned.set("type", json!(host_type()));
        // FMC reports false when unset
        if planned.get_bool("overridable").is_none() {
            planned.set("overridable", json!(false));
        }
        Ok(planned)
    }

    async fn create(&self, client: &FmcClient, planned: &ResourceState) -> ApplyResult<ResourceState> {
        let path = client
            .config_path(planned.domain(), HOSTS_PATH)
            .await
            .map_err(|e| api_error("resolve domain", &e))?;

        let body = to_body(planned, None);
        let created: HostBody = client
            .post(&path, &[], &body)
            .await
            .map_err(|e| api_error("create host", &e))?;
        tracing::info!("Created host {} ({:?})", created.name, created.id);

        Ok(created.to_state(planned.domain()))
    }

    async fn read(&self, client: &FmcClient, current: &ResourceState) -> ResourceResult<ResourceState> {
        let id = current.require_id("Host")?;
        let path = client
            .config_path(current.domain(), HOSTS_PATH)
            .await
            .map_err(|e| api_error("resolve domain", &e))?;

        match client.get::<HostBody>(&format!("{}/{}", path, id)).await {
            Ok(host) => Ok(host.to_state(current.domain())),
            Err(e) if e.is_not_found() => {
                // Resource no longer exists
                Ok(ResourceState::new())
            }
            Err(e) => Err(api_error("read host", &e)),
        }
    }

    async fn update(
        &self,
        client: &FmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ApplyResult<ResourceState> {
        let id = current.require_id("Host")?;
        let path = client
            .config_path(planned.domain(), HOSTS_PATH)
            .await
            .map_err(|e| api_error("resolve domain", &e))?;

        let body = to_body(planned, Some(id.clone()));
        client
            .put::<Value, _>(&format!("{}/{}", path, id), &body)
            .await
            .map_err(|e| api_error("update host", &e))?;

        Ok(body.to_state(planned.domain()))
    }

    async fn delete(&self, client: &FmcClient, current: &ResourceState) -> ApplyResult<()> {
        let id = current.require_id("Host")?;
        let path = client
            .config_path(current.domain(), HOSTS_PATH)
            .await
            .map_err(|e| api_error("resolve domain", &e))?;

        match client.delete(&format!("{}/{}", path, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()), // Already deleted
            Err(e) => Err(api_error("delete host", &e).into()),
        }
    }
}
