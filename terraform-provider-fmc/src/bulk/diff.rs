//! Three-way diff of named child items
//!
//! Items live in maps keyed by their logical name. An item object may
//! carry the remote `id`; the plan only knows an ID for items it carried
//! over from state, so the set of IDs present in the plan tells which
//! remote objects the plan still owns.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Logical name -> item object
pub type ItemMap = BTreeMap<String, Value>;

/// Remote ID stored in an item, if known
pub fn item_id(item: &Value) -> Option<&str> {
    item.get("id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
}

/// Items to change, in the order they must be applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// `(name, id)` of remote objects no longer owned by the plan
    pub delete: Vec<(String, String)>,
    /// State items without a remote ID; dropped without an API call
    pub forget: Vec<String>,
    /// Plan items with no matching remote object
    pub create: Vec<(String, Value)>,
    /// Plan items whose remote object exists but differs
    pub update: Vec<(String, Value)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty()
            && self.forget.is_empty()
            && self.create.is_empty()
            && self.update.is_empty()
    }
}

/// Compare state against plan.
///
/// `ignored` lists keys that never trigger an update (computed fields
/// such as `type`).
pub fn diff_items(state: &ItemMap, plan: &ItemMap, ignored: &[&str]) -> ChangeSet {
    let planned_ids: HashSet<&str> = plan.values().filter_map(item_id).collect();

    let state_by_id: HashMap<&str, (&String, &Value)> = state
        .iter()
        .filter_map(|(name, item)| item_id(item).map(|id| (id, (name, item))))
        .collect();

    let mut changes = ChangeSet::default();

    for (name, item) in state {
        match item_id(item) {
            Some(id) if planned_ids.contains(id) => {}
            Some(id) => changes.delete.push((name.clone(), id.to_string())),
            None => changes.forget.push(name.clone()),
        }
    }

    for (name, item) in plan {
        match item_id(item).and_then(|id| state_by_id.get(id)) {
            None => changes.create.push((name.clone(), item.clone())),
            Some((current_name, current)) => {
                if *current_name != name || !same_content(current, item, ignored) {
                    changes.update.push((name.clone(), item.clone()));
                }
            }
        }
    }

    changes
}

/// Equality of the planned keys, ignoring `id` and the `ignored` keys.
/// A key missing on one side compares as null.
pub fn same_content(current: &Value, planned: &Value, ignored: &[&str]) -> bool {
    let (Some(current), Some(planned)) = (current.as_object(), planned.as_object()) else {
        return current == planned;
    };

    planned
        .iter()
        .filter(|(key, _)| key.as_str() != "id" && !ignored.contains(&key.as_str()))
        .all(|(key, value)| current.get(key).unwrap_or(&Value::Null) == value)
}

/// Copy remote IDs from prior items onto proposed items of the same name.
///
/// Items missing from the prior map get `id: null` so Terraform shows the
/// value as known after apply.
pub fn carry_ids(prior: Option<&ItemMap>, proposed: &ItemMap) -> ItemMap {
    proposed
        .iter()
        .map(|(name, item)| {
            let mut object = item.as_object().cloned().unwrap_or_else(Map::new);
            let id = prior
                .and_then(|p| p.get(name))
                .and_then(item_id)
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null);
            object.insert("id".to_string(), id);
            (name.clone(), Value::Object(object))
        })
        .collect()
}

/// Read an item map from a state attribute
pub fn items_from_value(value: Option<&Value>) -> ItemMap {
    value
        .and_then(|v| v.as_object())
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// Write an item map back into a state attribute
pub fn items_to_value(items: &ItemMap) -> Value {
    Value::Object(items.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}
