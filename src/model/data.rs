//! Construction input — the serialized property bag a node is loaded from.
//!
//! The scene graph never parses persisted documents itself; an external
//! serializer produces `NodeData` and hands it to [`Scene::load`]. The shape
//! is: a persistent identifier (optional — generated when absent) plus named
//! values grouped by declared type.
//!
//! [`Scene::load`]: crate::scene::Scene::load

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::value::{PropType, Value};

/// Per-node construction input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    /// Identifier stable across loads. Generated when `None`.
    #[serde(default)]
    pub persistent_id: Option<String>,

    /// Declared properties, grouped by declared type.
    ///
    /// A value whose runtime shape disagrees with its declared group is
    /// skipped silently at load (loosely-typed authoring data must not
    /// crash the graph).
    #[serde(default)]
    pub properties: HashMap<PropType, HashMap<String, Value>>,
}

impl NodeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.persistent_id = Some(id.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.properties
            .entry(value.prop_type())
            .or_default()
            .insert(name.into(), value);
        self
    }

    /// Iterate declared properties whose value matches its declared group,
    /// in no particular order. Mismatched entries are dropped here.
    pub fn declared(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().flat_map(|(ty, group)| {
            group
                .iter()
                .filter(move |(_, v)| v.prop_type() == *ty)
                .map(|(name, v)| (name.as_str(), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_groups_by_type() {
        let data = NodeData::new()
            .with_id("root")
            .with_property("width", 10i64)
            .with_property("label", "hi");

        assert_eq!(data.persistent_id.as_deref(), Some("root"));
        assert_eq!(data.properties[&PropType::Int]["width"], Value::Int(10));
        assert_eq!(data.properties[&PropType::Str]["label"], Value::from("hi"));
    }

    #[test]
    fn test_declared_drops_mismatched_group() {
        let mut data = NodeData::new();
        data.properties
            .entry(PropType::Int)
            .or_default()
            .insert("oops".into(), Value::from("not an int"));
        data.properties
            .entry(PropType::Int)
            .or_default()
            .insert("ok".into(), Value::Int(1));

        let names: Vec<&str> = data.declared().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["ok"]);
    }

    #[test]
    fn test_deserialize_from_json() {
        let data: NodeData = serde_json::from_str(
            r#"{
                "persistent_id": "panel",
                "properties": {
                    "Str": { "title": { "type": "Str", "value": "Settings" } },
                    "Int": { "width": { "type": "Int", "value": 320 } }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(data.persistent_id.as_deref(), Some("panel"));
        assert_eq!(data.declared().count(), 2);
    }
}
