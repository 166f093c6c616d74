//! `fmc_dynamic_objects`: Dynamic Objects in bulk

use super::bulk_objects::ObjectKind;
use super::hosts::{copy_present, field};
use crate::schema::AttributeType;
use crate::version::FmcVersion;
use serde_json::{json, Map, Value};

pub const DYNAMIC_OBJECTS_PATH: &str = "/object/dynamicobjects";

/// Only IP mappings exist today
const DEFAULT_OBJECT_TYPE: &str = "IP";

pub struct DynamicObjectKind;

impl ObjectKind for DynamicObjectKind {
    fn type_name(&self) -> &'static str {
        "fmc_dynamic_objects"
    }

    fn path(&self) -> &'static str {
        DYNAMIC_OBJECTS_PATH
    }

    fn object_type(&self) -> &'static str {
        "DynamicObject"
    }

    fn description(&self) -> &'static str {
        "Manages Dynamic Objects in bulk"
    }

    fn item_fields(&self) -> Vec<(&'static str, AttributeType)> {
        vec![
            ("description", AttributeType::String),
            ("object_type", AttributeType::String),
        ]
    }

    fn to_body(&self, name: &str, item: &Value) -> Value {
        let object_type = item
            .get("object_type")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_OBJECT_TYPE);

        let mut body = json!({
            "name": name,
            "type": "DynamicObject",
            "objectType": object_type,
        });
        copy_present(item, &mut body, &["description"]);
        body
    }

    fn from_body(&self, remote: &Value) -> Map<String, Value> {
        let mut item = Map::new();
        item.insert("description".to_string(), field(remote, "description"));
        item.insert("object_type".to_string(), field(remote, "objectType"));
        item
    }

    fn fill_defaults(&self, item: &mut Map<String, Value>) {
        let unset = item.get("object_type").map_or(true, Value::is_null);
        if unset {
            item.insert("object_type".to_string(), json!(DEFAULT_OBJECT_TYPE));
        }
    }

    fn min_version(&self) -> Option<FmcVersion> {
        // bulk delete of dynamic objects
        Some(FmcVersion::new(7, 4, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_object_type_defaults_to_ip() {
        let body = DynamicObjectKind.to_body("k8s-pods", &json!({"description": "pods"}));
        assert_eq!(
            body,
            json!({
                "name": "k8s-pods",
                "type": "DynamicObject",
                "objectType": "IP",
                "description": "pods"
            })
        );
    }

    #[test]
    fn test_from_body() {
        let item = DynamicObjectKind.from_body(&json!({
            "id": "1",
            "name": "k8s-pods",
            "objectType": "IP"
        }));
        assert_eq!(item["object_type"], json!("IP"));
        assert_eq!(item["description"], Value::Null);
    }

    #[test]
    fn test_fill_defaults() {
        let mut item = Map::new();
        item.insert("object_type".to_string(), Value::Null);
        DynamicObjectKind.fill_defaults(&mut item);
        assert_eq!(item["object_type"], json!("IP"));
    }

    #[test]
    fn test_requires_7_4() {
        assert_eq!(DynamicObjectKind.min_version(), Some(FmcVersion::new(7, 4, 0)));
    }
}
