//! Items: the host-facing output of an evaluated file (spec Glossary,
//! §6.2 `RunResult`).

use indexmap::IndexMap;

use crate::location::LocationRange;
use crate::value::Value;

/// A named bag of key/value pairs produced by a host item-declarator
/// function and drained from the item collector (spec §4.6, "Host
/// item-declarators").
#[derive(Debug, Clone)]
pub struct Item {
    pub item_type: String,
    pub name: String,
    pub key_value_map: IndexMap<String, Value>,
    pub defined_from: LocationRange,
}

impl Item {
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("type".to_string(), serde_json::Value::String(self.item_type.clone()));
        map.insert("name".to_string(), serde_json::Value::String(self.name.clone()));
        let mut kvs = serde_json::Map::new();
        for (k, v) in &self.key_value_map {
            kvs.insert(k.clone(), v.to_json());
        }
        map.insert("key_value_map".to_string(), serde_json::Value::Object(kvs));
        serde_json::Value::Object(map)
    }
}
