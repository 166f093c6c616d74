//! `fmc_hosts`: many Host objects in one resource

use super::bulk_objects::ObjectKind;
use super::host::HOSTS_PATH;
use crate::schema::AttributeType;
use serde_json::{json, Map, Value};

pub struct HostKind;

impl ObjectKind for HostKind {
    fn type_name(&self) -> &'static str {
        "fmc_hosts"
    }

    fn path(&self) -> &'static str {
        HOSTS_PATH
    }

    fn object_type(&self) -> &'static str {
        "Host"
    }

    fn description(&self) -> &'static str {
        "Manages Host objects in bulk"
    }

    fn item_fields(&self) -> Vec<(&'static str, AttributeType)> {
        vec![
            ("ip", AttributeType::String),
            ("description", AttributeType::String),
            ("overridable", AttributeType::Bool),
        ]
    }

    fn to_body(&self, name: &str, item: &Value) -> Value {
        let mut body = json!({
            "name": name,
            "type": "Host",
            "value": item.get("ip").cloned().unwrap_or(Value::Null),
        });
        copy_present(item, &mut body, &["description", "overridable"]);
        body
    }

    fn from_body(&self, remote: &Value) -> Map<String, Value> {
        let mut item = Map::new();
        item.insert("ip".to_string(), field(remote, "value"));
        item.insert("description".to_string(), field(remote, "description"));
        item.insert("overridable".to_string(), field(remote, "overridable"));
        item
    }

    fn fill_defaults(&self, item: &mut Map<String, Value>) {
        if item.get("overridable").map_or(true, Value::is_null) {
            item.insert("overridable".to_string(), json!(false));
        }
    }
}

/// Remote field or null
pub(crate) fn field(remote: &Value, key: &str) -> Value {
    remote.get(key).cloned().unwrap_or(Value::Null)
}

/// Copy non-null `keys` from an item into a request body
pub(crate) fn copy_present(item: &Value, body: &mut Value, keys: &[&str]) {
    let Some(body) = body.as_object_mut() else {
        return;
    };
    for key in keys {
        if let Some(value) = item.get(*key).filter(|v| !v.is_null()) {
            body.insert(key.to_string(), value.clone());
        }
    }
}
