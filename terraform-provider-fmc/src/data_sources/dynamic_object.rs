//! `fmc_dynamic_object` data source

use super::{lookup, DataSource, Selector};
use crate::client::FmcClient;
use crate::resources::{ResourceResult, ResourceState, DYNAMIC_OBJECTS_PATH};
use crate::schema::{ResourceSchema, SchemaAttribute, SchemaBlock};
use async_trait::async_trait;
use serde_json::Value;

pub struct DynamicObjectDataSource;

impl DynamicObjectDataSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DynamicObjectDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for DynamicObjectDataSource {
    fn type_name(&self) -> &str {
        "fmc_dynamic_object"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute("id", SchemaAttribute::string().optional().computed())
            .with_attribute("name", SchemaAttribute::string().optional().computed())
            .with_attribute("domain", SchemaAttribute::string().optional())
            .with_attribute("description", SchemaAttribute::string().computed())
            .with_attribute("object_type", SchemaAttribute::string().computed())
            .with_description("Looks up a Dynamic Object by id or name");

        ResourceSchema::new(0, block)
    }

    async fn read(&self, client: &FmcClient, config: &ResourceState) -> ResourceResult<ResourceState> {
        let selector = Selector::from_config(config)?;
        let remote = lookup(client, config.domain(), DYNAMIC_OBJECTS_PATH, "name", &selector).await?;

        let field = |key: &str| remote.get(key).cloned().unwrap_or(Value::Null);
        let mut state = config.clone();
        state.set("id", field("id"));
        state.set("name", field("name"));
        state.set("description", field("description"));
        state.set("object_type", field("objectType"));
        Ok(state)
    }
}
