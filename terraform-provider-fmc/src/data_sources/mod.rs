//! Terraform Data Sources for FMC
//!
//! Read-only lookups of existing objects, by `id` or by `name`.

mod dynamic_object;
mod host;

pub use dynamic_object::DynamicObjectDataSource;
pub use host::HostDataSource;

use crate::client::FmcClient;
use crate::resources::{api_error, ResourceResult, ResourceState};
use crate::schema::{Diagnostic, ResourceSchema};
use async_trait::async_trait;
use serde_json::Value;

/// Data source trait
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &str;

    fn schema(&self) -> ResourceSchema;

    /// Read the object selected by `config`
    async fn read(&self, client: &FmcClient, config: &ResourceState) -> ResourceResult<ResourceState>;
}

/// Which object a lookup selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Id(String),
    Name(String),
}

impl Selector {
    /// Exactly one of `id` and `name` must be set
    pub fn from_config(config: &ResourceState) -> ResourceResult<Self> {
        match (config.get_string("id"), config.get_string("name")) {
            (Some(id), None) => Ok(Selector::Id(id)),
            (None, Some(name)) => Ok(Selector::Name(name)),
            (Some(_), Some(_)) => Err(vec![Diagnostic::error(
                "Only one of 'id' or 'name' can be set",
            )]),
            (None, None) => Err(vec![Diagnostic::error("One of 'id' or 'name' must be set")]),
        }
    }
}

/// Fetch one object of the collection at `suffix`.
///
/// Name lookups narrow the listing with `filter=<filter_key>:<name>` and
/// then require an exact name match.
pub async fn lookup(
    client: &FmcClient,
    domain: Option<&str>,
    suffix: &str,
    filter_key: &str,
    selector: &Selector,
) -> ResourceResult<Value> {
    let path = client
        .config_path(domain, suffix)
        .await
        .map_err(|e| api_error("resolve domain", &e))?;

    match selector {
        Selector::Id(id) => client
            .get(&format!("{}/{}", path, id))
            .await
            .map_err(|e| api_error(&format!("read object {}", id), &e)),
        Selector::Name(name) => {
            let query = [("filter", format!("{}:{}", filter_key, name))];
            let items = client
                .get_all(&path, &query)
                .await
                .map_err(|e| api_error(&format!("look up '{}'", name), &e))?;

            items
                .into_iter()
                .find(|item| item.get("name").and_then(|n| n.as_str()) == Some(name.as_str()))
                .ok_or_else(|| vec![Diagnostic::error(&format!("Object '{}' not found", name))])
        }
    }
}

/// Get all available data sources
pub fn get_all_data_sources() -> Vec<Box<dyn DataSource>> {
    vec![
        Box::new(HostDataSource::new()),
        Box::new(DynamicObjectDataSource::new()),
    ]
}
