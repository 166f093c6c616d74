//! Collections of simple objects managed from one resource
//!
//! `fmc_hosts` and `fmc_dynamic_objects` share everything except the
//! endpoint and the item fields, which an [`ObjectKind`] supplies. The
//! `items` attribute maps each object name to its fields; the resource ID
//! is the domain UUID.

use super::{api_error, ApplyError, ApplyResult, Resource, ResourceResult, ResourceState};
use crate::bulk::{
    carry_ids, delete_all, ids_by_name, item_id, items_from_value, items_to_value, reconcile,
    BulkApi, ItemMap, PartialFailure, ID_FILTER_PREFIX,
};
use crate::client::{ClientError, FmcClient};
use crate::import::ImportId;
use crate::schema::{AttributeType, Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};
use crate::version::FmcVersion;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// One kind of FMC object managed in bulk
pub trait ObjectKind: Send + Sync + 'static {
    /// Terraform type name, e.g. `fmc_hosts`
    fn type_name(&self) -> &'static str;

    /// Collection path under the domain, e.g. `/object/hosts`
    fn path(&self) -> &'static str;

    /// FMC `type` of every object in the collection
    fn object_type(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Fields of one item besides `id` and `type`
    fn item_fields(&self) -> Vec<(&'static str, AttributeType)>;

    /// Request body for one item
    fn to_body(&self, name: &str, item: &Value) -> Value;

    /// Item fields from a remote object
    fn from_body(&self, remote: &Value) -> Map<String, Value>;

    /// Fill server-side defaults into a planned item
    fn fill_defaults(&self, _item: &mut Map<String, Value>) {}

    fn min_version(&self) -> Option<FmcVersion> {
        None
    }
}

pub struct BulkObjectsResource<K: ObjectKind> {
    kind: K,
}

impl<K: ObjectKind> BulkObjectsResource<K> {
    pub fn new(kind: K) -> Self {
        Self { kind }
    }

    async fn api(&self, client: &FmcClient, domain: Option<&str>) -> Result<ObjectsApi<'_, K>, ClientError> {
        let path = client.config_path(domain, self.kind.path()).await?;
        Ok(ObjectsApi {
            kind: &self.kind,
            path,
        })
    }

    /// Item as stored in state: the kind's fields plus `id` and `type`
    fn item_from_remote(&self, remote: &Value) -> Value {
        let mut item = self.kind.from_body(remote);
        item.insert("id".to_string(), remote.get("id").cloned().unwrap_or(Value::Null));
        item.insert("type".to_string(), json!(self.kind.object_type()));
        Value::Object(item)
    }

    async fn apply(
        &self,
        client: &FmcClient,
        state: &ItemMap,
        planned: &ResourceState,
        action: &str,
    ) -> ApplyResult<ResourceState> {
        let api = self
            .api(client, planned.domain())
            .await
            .map_err(|e| api_error("resolve domain", &e))?;
        let domain_uuid = client
            .domain_uuid(planned.domain())
            .await
            .map_err(|e| api_error("resolve domain", &e))?;
        let plan = items_from_value(planned.get("items"));

        match reconcile(&api, client, state, &plan).await {
            Ok(items) => Ok(with_items(planned, &domain_uuid, &items)),
            Err(PartialFailure { state, error }) => Err(ApplyError::partial(
                with_items(planned, &domain_uuid, &state),
                api_error(&format!("{} {}", action, self.kind.type_name()), &error),
            )),
        }
    }
}

fn with_items(base: &ResourceState, domain_uuid: &str, items: &ItemMap) -> ResourceState {
    let mut state = base.clone();
    state.set("id", json!(domain_uuid));
    state.set("items", items_to_value(items));
    state
}

#[async_trait]
impl<K: ObjectKind> Resource for BulkObjectsResource<K> {
    fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    fn schema(&self) -> ResourceSchema {
        let mut fields = self.kind.item_fields();
        fields.push(("id", AttributeType::String));
        fields.push(("type", AttributeType::String));

        let block = SchemaBlock::new()
            .with_common_attributes()
            .with_attribute(
                "items",
                SchemaAttribute::map(AttributeType::object(&fields))
                    .with_description("Map of objects keyed by object name")
                    .required(),
            )
            .with_description(self.kind.description());

        ResourceSchema::new(0, block)
    }

    fn min_version(&self) -> Option<FmcVersion> {
        self.kind.min_version()
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
                self.kind.fill_defaults(object);
                object.insert("type".to_string(), json!(self.kind.object_type()));
            }
        }

        let mut planned = proposed.clone();
        planned.set(
            "id",
            current.and_then(|c| c.get("id").cloned()).unwrap_or(Value::Null),
        );
        planned.set("items", items_to_value(&items));
        Ok(planned)
    }

    async fn create(&self, client: &FmcClient, planned: &ResourceState) -> ApplyResult<ResourceState> {
        self.apply(client, &ItemMap::new(), planned, "create").await
    }

    async fn read(&self, client: &FmcClient, current: &ResourceState) -> ResourceResult<ResourceState> {
        let api = self
            .api(client, current.domain())
            .await
            .map_err(|e| api_error("resolve domain", &e))?;
        let remote = client
            .get_all(&api.path, &[])
            .await
            .map_err(|e| api_error(&format!("read {}", self.kind.type_name()), &e))?;

        let owned = items_from_value(current.get("items"));
        let items = match_remote(&owned, &remote, |r| self.item_from_remote(r));

        let mut state = current.clone();
        state.set("items", items_to_value(&items));
        if state.get_str("id").is_none() {
            let uuid = client
                .domain_uuid(current.domain())
                .await
                .map_err(|e| api_error("resolve domain", &e))?;
            state.set("id", json!(uuid));
        }
        Ok(state)
    }

    async fn update(
        &self,
        client: &FmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ApplyResult<ResourceState> {
        let state = items_from_value(current.get("items"));
        self.apply(client, &state, planned, "update").await
    }

    async fn delete(&self, client: &FmcClient, current: &ResourceState) -> ApplyResult<()> {
        let api = self
            .api(client, current.domain())
            .await
            .map_err(|e| api_error("resolve domain", &e))?;
        let state = items_from_value(current.get("items"));

        delete_all(&api, client, &state).await.map_err(|failure| {
            let mut remaining = current.clone();
            remaining.set("items", items_to_value(&failure.state));
            ApplyError::partial(
                remaining,
                api_error(&format!("delete {}", self.kind.type_name()), &failure.error),
            )
        })
    }

    fn import_state(&self, id: &ImportId) -> ResourceResult<ResourceState> {
        let (domain, names) = id
            .named_list()
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])?;
        Ok(imported_names(domain, &names))
    }
}

/// Import state listing object names without IDs; `read` resolves them
pub(crate) fn imported_names(domain: Option<String>, names: &[String]) -> ResourceState {
    let items: ItemMap = names
        .iter()
        .map(|name| (name.clone(), json!({"id": null})))
        .collect();

    let mut state = ResourceState::new();
    state.set("id", Value::Null);
    state.set("items", items_to_value(&items));
    if let Some(domain) = domain {
        state.set("domain", json!(domain));
    }
    state
}

/// Refresh owned items from a remote listing.
///
/// Items are matched by ID, or by name when state has no ID yet (just
/// imported). Owned items missing remotely are dropped; the map key
/// follows the remote name so renames made outside Terraform show up.
pub(crate) fn match_remote<F>(owned: &ItemMap, remote: &[Value], convert: F) -> ItemMap
where
    F: Fn(&Value) -> Value,
{
    let by_id: HashMap<&str, &Value> = remote
        .iter()
        .filter_map(|r| item_id(r).map(|id| (id, r)))
        .collect();
    let by_name: HashMap<&str, &Value> = remote
        .iter()
        .filter_map(|r| r.get("name").and_then(|n| n.as_str()).map(|n| (n, r)))
        .collect();

    let mut items = ItemMap::new();
    for (name, item) in owned {
        let found = match item_id(item) {
            Some(id) => by_id.get(id),
            None => by_name.get(name.as_str()),
        };

        match found {
            Some(remote) => {
                let key = remote
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or(name)
                    .to_string();
                items.insert(key, convert(remote));
            }
            None => tracing::warn!("'{}' no longer exists on FMC, removing it from state", name),
        }
    }
    items
}

/// Bulk endpoints of one object collection
struct ObjectsApi<'a, K: ObjectKind> {
    kind: &'a K,
    path: String,
}

#[async_trait]
impl<'a, K: ObjectKind> BulkApi for ObjectsApi<'a, K> {
    async fn create_batch(
        &self,
        client: &FmcClient,
        items: &[(String, Value)],
    ) -> Result<HashMap<String, String>, ClientError> {
        let body: Vec<Value> = items
            .iter()
            .map(|(name, item)| self.kind.to_body(name, item))
            .collect();
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
        item: &Value,
    ) -> Result<(), ClientError> {
        let mut body = self.kind.to_body(name, item);
        if let Some(object) = body.as_object_mut() {
            object.insert("id".to_string(), json!(id));
        }
        client
            .put::<Value, _>(&format!("{}/{}", self.path, id), &body)
            .await?;
        Ok(())
    }

    fn ignored_keys(&self) -> &[&'static str] {
        &["type"]
    }
}
