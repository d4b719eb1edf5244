//! Raw and parsed key/value pairs.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A raw pair as fetched from the store, value already normalized.
#[derive(Debug, Clone)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Classification assigned to a key by the pattern table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternLabel {
    /// No pattern matched; the whole key is treated as an entity name.
    Primitive,
    /// `entity:id:property` - a direct scalar attribute.
    Prop,
    /// `entity:id:aggregate.property` - an attribute of a 1:1 nested object.
    AggProp,
    /// `entity:id:array[index]` - a reference slot of a repeated object.
    Arr,
    /// `entity:id:array[index].property` - an attribute of a repeated object.
    ArrProp,
}

/// Named key components bound by a pattern.
///
/// The component set is closed: patterns may only bind these five names.
/// `id` and `index` capture digit runs, the rest capture word characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Components {
    pub entity: String,
    pub id: Option<String>,
    pub property: Option<String>,
    pub index: Option<String>,
    pub aggregate_property: Option<String>,
    /// Set when `id` was invented rather than read from the key.
    pub synthetic_id: bool,
}

impl Components {
    /// Fallthrough classification: the entire key names the entity.
    pub fn primitive(raw_key: &str) -> Self {
        Self {
            entity: raw_key.to_string(),
            ..Default::default()
        }
    }
}

/// A key/value pair after classification through the pattern table.
#[derive(Debug, Clone)]
pub struct ParsedKey {
    pub key: String,
    pub value: Value,
    pub label: PatternLabel,
    pub components: Components,
}
