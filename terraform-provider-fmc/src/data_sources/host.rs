//! `fmc_host` data source

use super::{lookup, DataSource, Selector};
use crate::client::FmcClient;
use crate::resources::{ResourceResult, ResourceState, HOSTS_PATH};
use crate::schema::{ResourceSchema, SchemaAttribute, SchemaBlock};
use async_trait::async_trait;
use serde_json::Value;

pub struct HostDataSource;

impl HostDataSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HostDataSource {
    fn default() -> Self {
        Self::new()
    }
}

fn to_state(config: &ResourceState, remote: &Value) -> ResourceState {
    let field = |key: &str| remote.get(key).cloned().unwrap_or(Value::Null);

    let mut state = config.clone();
    state.set("id", field("id"));
    state.set("name", field("name"));
    state.set("ip", field("value"));
    state.set("description", field("description"));
    state.set("overridable", field("overridable"));
    state
}

#[async_trait]
impl DataSource for HostDataSource {
    fn type_name(&self) -> &str {
        "fmc_host"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Id of the object")
                    .optional()
                    .computed(),
            )
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the object")
                    .optional()
                    .computed(),
            )
            .with_attribute("domain", SchemaAttribute::string().optional())
            .with_attribute("ip", SchemaAttribute::string().computed())
            .with_attribute("description", SchemaAttribute::string().computed())
            .with_attribute("overridable", SchemaAttribute::bool().computed())
            .with_description("Looks up a Host object by id or name");

        ResourceSchema::new(0, block)
    }

    async fn read(&self, client: &FmcClient, config: &ResourceState) -> ResourceResult<ResourceState> {
        let selector = Selector::from_config(config)?;
        let remote = lookup(client, config.domain(), HOSTS_PATH, "nameOrValue", &selector).await?;
        tracing::debug!("Found host {:?}", remote.get("id"));
        Ok(to_state(config, &remote))
    }
}
