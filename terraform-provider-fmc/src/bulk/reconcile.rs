//! Applying a change set against FMC while keeping state consistent
//!
//! The running item map starts as the prior state and is edited after
//! every successful call. When a call fails the map is handed back with
//! the error, so Terraform records exactly what exists remotely.

use super::batch::{batches, id_batches, json_weight, BatchLimits, BULK_CREATE_LIMITS, BULK_DELETE_LIMITS};
use super::diff::{diff_items, item_id, ChangeSet, ItemMap};
use crate::client::{ClientError, FmcClient};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Remote operations for one kind of child item
#[async_trait]
pub trait BulkApi: Send + Sync {
    /// Create a batch of `(name, item)`; returns remote IDs by name
    async fn create_batch(
        &self,
        client: &FmcClient,
        items: &[(String, Value)],
    ) -> Result<HashMap<String, String>, ClientError>;

    /// Delete a batch of remote objects
    async fn delete_batch(&self, client: &FmcClient, ids: &[String]) -> Result<(), ClientError>;

    /// Update one remote object
    async fn update_item(
        &self,
        client: &FmcClient,
        id: &str,
        name: &str,
        item: &Value,
    ) -> Result<(), ClientError>;

    fn create_limits(&self) -> BatchLimits {
        BULK_CREATE_LIMITS
    }

    fn delete_limits(&self) -> BatchLimits {
        BULK_DELETE_LIMITS
    }

    /// Item keys that never cause an update
    fn ignored_keys(&self) -> &[&'static str] {
        &[]
    }

    /// Items FMC refuses to delete; they are only dropped from state
    fn undeletable(&self, _name: &str) -> bool {
        false
    }
}

/// Reconciliation stopped at a failed call
#[derive(Debug)]
pub struct PartialFailure<S = ItemMap> {
    /// State after the last successful call
    pub state: S,
    pub error: ClientError,
}

/// Bring the remote collection from `state` to `plan`.
///
/// Order: deletes (batched), updates (one call each), creates (batched).
/// Deleting and renaming first frees names the creates may reuse.
pub async fn reconcile<A>(
    api: &A,
    client: &FmcClient,
    state: &ItemMap,
    plan: &ItemMap,
) -> Result<ItemMap, PartialFailure>
where
    A: BulkApi + ?Sized,
{
    let changes = diff_items(state, plan, api.ignored_keys());
    let mut running = state.clone();

    if changes.is_empty() {
        return Ok(running);
    }

    tracing::debug!(
        "Reconciling: {} to delete, {} to update, {} to create",
        changes.delete.len(),
        changes.update.len(),
        changes.create.len()
    );

    for name in &changes.forget {
        running.remove(name);
    }

    match apply_changes(api, client, changes, &mut running).await {
        Ok(()) => Ok(running),
        Err(error) => Err(PartialFailure {
            state: running,
            error,
        }),
    }
}

async fn apply_changes<A>(
    api: &A,
    client: &FmcClient,
    changes: ChangeSet,
    running: &mut ItemMap,
) -> Result<(), ClientError>
where
    A: BulkApi + ?Sized,
{
    delete_items(api, client, changes.delete, running).await?;
    update_items(api, client, changes.update, running).await?;
    create_items(api, client, changes.create, running).await
}

/// Delete every item of `state`
pub async fn delete_all<A>(api: &A, client: &FmcClient, state: &ItemMap) -> Result<(), PartialFailure>
where
    A: BulkApi + ?Sized,
{
    let mut running = state.clone();
    let mut targets = Vec::new();

    for (name, item) in state {
        match item_id(item) {
            Some(id) => targets.push((name.clone(), id.to_string())),
            None => {
                running.remove(name);
            }
        }
    }

    match delete_items(api, client, targets, &mut running).await {
        Ok(()) => Ok(()),
        Err(error) => Err(PartialFailure {
            state: running,
            error,
        }),
    }
}

async fn delete_items<A>(
    api: &A,
    client: &FmcClient,
    targets: Vec<(String, String)>,
    running: &mut ItemMap,
) -> Result<(), ClientError>
where
    A: BulkApi + ?Sized,
{
    let (kept, deletable): (Vec<_>, Vec<_>) = targets
        .into_iter()
        .partition(|(name, _)| api.undeletable(name));

    for (name, _) in kept {
        tracing::info!("Leaving '{}' in place, FMC does not allow deleting it", name);
        running.remove(&name);
    }

    let groups = id_batches(deletable, api.delete_limits(), |(_, id)| id.as_str());
    let total = groups.len();

    for (index, group) in groups.into_iter().enumerate() {
        let ids: Vec<String> = group.iter().map(|(_, id)| id.clone()).collect();
        tracing::info!("Deleting batch {}/{} ({} items)", index + 1, total, ids.len());

        api.delete_batch(client, &ids).await?;

        for (name, _) in &group {
            running.remove(name);
        }
    }

    Ok(())
}

async fn update_items<A>(
    api: &A,
    client: &FmcClient,
    updates: Vec<(String, Value)>,
    running: &mut ItemMap,
) -> Result<(), ClientError>
where
    A: BulkApi + ?Sized,
{
    for (name, item) in updates {
        let Some(id) = item_id(&item).map(String::from) else {
            continue;
        };
        tracing::debug!("Updating '{}' ({})", name, id);

        api.update_item(client, &id, &name, &item).await?;

        // a rename leaves the object under its old key
        running.retain(|_, existing| item_id(existing) != Some(id.as_str()));
        running.insert(name, item);
    }

    Ok(())
}

async fn create_items<A>(
    api: &A,
    client: &FmcClient,
    creates: Vec<(String, Value)>,
    running: &mut ItemMap,
) -> Result<(), ClientError>
where
    A: BulkApi + ?Sized,
{
    let groups = batches(creates, api.create_limits(), |(name, item)| {
        json_weight(item) + name.len() + 12
    });
    let total = groups.len();

    for (index, group) in groups.into_iter().enumerate() {
        tracing::info!("Creating batch {}/{} ({} items)", index + 1, total, group.len());

        let created = api.create_batch(client, &group).await?;

        let mut missing = Vec::new();
        for (name, mut item) in group {
            match created.get(&name) {
                Some(id) => {
                    if let Some(object) = item.as_object_mut() {
                        object.insert("id".to_string(), Value::String(id.clone()));
                    }
                    running.insert(name, item);
                }
                None => missing.push(name),
            }
        }

        if !missing.is_empty() {
            return Err(ClientError::InvalidResponse(format!(
                "bulk create response did not include: {}",
                missing.join(", ")
            )));
        }
    }

    Ok(())
}

/// Map a bulk POST response (`{"items": [...]}` or a single object) to IDs by name
pub fn ids_by_name(response: &Value) -> HashMap<String, String> {
    let items: Vec<&Value> = match response.get("items").and_then(|v| v.as_array()) {
        Some(items) => items.iter().collect(),
        None => vec![response],
    };

    items
        .into_iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?;
            let id = item.get("id")?.as_str()?;
            Some((name.to_string(), id.to_string()))
        })
        .collect()
}
