//! Reconciliation of ordered item lists
//!
//! Rule lists are positional and FMC bulk creates append at the end. The
//! longest prefix whose IDs match state position by position is kept and
//! updated in place; everything after it is deleted and recreated in
//! plan order.

use super::batch::{batches, id_batches, json_weight};
use super::diff::{item_id, same_content};
use super::reconcile::{BulkApi, PartialFailure};
use crate::client::{ClientError, FmcClient};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

fn item_name(item: &Value) -> Option<&str> {
    item.get("name").and_then(|v| v.as_str())
}

/// Changes for an ordered list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedChanges {
    /// Length of the retained prefix
    pub keep: usize,
    /// Remote IDs of the state tail
    pub delete: Vec<String>,
    /// `(position, item)` inside the prefix whose content changed
    pub update: Vec<(usize, Value)>,
    /// Plan tail, in order
    pub create: Vec<Value>,
}

impl OrderedChanges {
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.update.is_empty() && self.create.is_empty()
    }
}

/// Number of leading positions where plan and state hold the same remote ID
fn common_prefix(state: &[Value], plan: &[Value]) -> usize {
    state
        .iter()
        .zip(plan)
        .take_while(|(s, p)| matches!((item_id(s), item_id(p)), (Some(a), Some(b)) if a == b))
        .count()
}

pub fn diff_ordered(state: &[Value], plan: &[Value], ignored: &[&str]) -> OrderedChanges {
    let keep = common_prefix(state, plan);

    let delete = state[keep..]
        .iter()
        .filter_map(item_id)
        .map(String::from)
        .collect();

    let update = state[..keep]
        .iter()
        .zip(&plan[..keep])
        .enumerate()
        .filter(|(_, (current, planned))| {
            item_name(current) != item_name(planned) || !same_content(current, planned, ignored)
        })
        .map(|(index, (_, planned))| (index, planned.clone()))
        .collect();

    let create = plan[keep..].to_vec();

    OrderedChanges {
        keep,
        delete,
        update,
        create,
    }
}

/// Planning helper: carry IDs by name, then drop the IDs of every item
/// past the retained prefix since those will be recreated.
pub fn plan_ordered(prior: &[Value], proposed: &[Value]) -> Vec<Value> {
    let ids: HashMap<&str, &str> = prior
        .iter()
        .filter_map(|item| Some((item_name(item)?, item_id(item)?)))
        .collect();

    let mut planned: Vec<Value> = proposed
        .iter()
        .map(|item| {
            let mut item = item.clone();
            let id = item_name(&item)
                .and_then(|name| ids.get(name))
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null);
            if let Some(object) = item.as_object_mut() {
                object.insert("id".to_string(), id);
            }
            item
        })
        .collect();

    let keep = common_prefix(prior, &planned);
    for item in planned.iter_mut().skip(keep) {
        if let Some(object) = item.as_object_mut() {
            object.insert("id".to_string(), Value::Null);
        }
    }
    planned
}

/// Bring a remote ordered list from `state` to `plan`.
///
/// Order: tail deletes (batched), prefix updates, tail creates (batched).
pub async fn reconcile_ordered<A>(
    api: &A,
    client: &FmcClient,
    state: &[Value],
    plan: &[Value],
) -> Result<Vec<Value>, PartialFailure<Vec<Value>>>
where
    A: BulkApi + ?Sized,
{
    let changes = diff_ordered(state, plan, api.ignored_keys());
    // tail items without an ID were never created remotely
    let mut running: Vec<Value> = state
        .iter()
        .enumerate()
        .filter(|(index, item)| *index < changes.keep || item_id(item).is_some())
        .map(|(_, item)| item.clone())
        .collect();

    if changes.is_empty() {
        return Ok(running);
    }

    tracing::debug!(
        "Reconciling list: keeping {}, {} to delete, {} to update, {} to create",
        changes.keep,
        changes.delete.len(),
        changes.update.len(),
        changes.create.len()
    );

    match apply_ordered(api, client, changes, &mut running).await {
        Ok(()) => Ok(running),
        Err(error) => Err(PartialFailure {
            state: running,
            error,
        }),
    }
}

async fn apply_ordered<A>(
    api: &A,
    client: &FmcClient,
    changes: OrderedChanges,
    running: &mut Vec<Value>,
) -> Result<(), ClientError>
where
    A: BulkApi + ?Sized,
{
    let groups = id_batches(changes.delete, api.delete_limits(), String::as_str);
    let total = groups.len();
    for (index, group) in groups.into_iter().enumerate() {
        tracing::info!("Deleting batch {}/{} ({} items)", index + 1, total, group.len());
        api.delete_batch(client, &group).await?;

        let deleted: HashSet<&str> = group.iter().map(String::as_str).collect();
        running.retain(|item| item_id(item).map_or(true, |id| !deleted.contains(id)));
    }

    for (position, item) in changes.update {
        let (Some(id), Some(name)) = (item_id(&item), item_name(&item)) else {
            continue;
        };
        tracing::debug!("Updating #{} '{}' ({})", position + 1, name, id);
        api.update_item(client, id, name, &item).await?;
        running[position] = item;
    }

    let named: Vec<(String, Value)> = changes
        .create
        .into_iter()
        .map(|item| (item_name(&item).unwrap_or_default().to_string(), item))
        .collect();
    let groups = batches(named, api.create_limits(), |(_, item)| json_weight(item));
    let total = groups.len();
    for (index, group) in groups.into_iter().enumerate() {
        tracing::info!("Creating batch {}/{} ({} items)", index + 1, total, group.len());
        let created = api.create_batch(client, &group).await?;

        for (name, mut item) in group {
            let Some(id) = created.get(&name) else {
                return Err(ClientError::InvalidResponse(format!(
                    "bulk create response did not include '{}'",
                    name
                )));
            };
            if let Some(object) = item.as_object_mut() {
                object.insert("id".to_string(), Value::String(id.clone()));
            }
            running.push(item);
        }
    }

    Ok(())
}
