//! Id-path grouping and nested-object materialization.
//!
//! The JSON-Schema path does not need the labelled pattern table: keys are
//! split on `:`/`/`/`.`, the first numeric-or-UUID token closes the group
//! prefix, and every key sharing that prefix is materialized into one nested
//! object per entity instance.

use indexmap::IndexMap;
use kvx_core::{KeyValue, Value};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::OnceLock;

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9A-Fa-f]{8}(-[0-9A-Fa-f]{4}){3}-[0-9A-Fa-f]{12}").expect("static regex")
    })
}

fn array_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\w+)\[(\d+)\]").expect("static regex"))
}

/// Split a flat key on the separator class `[:/.]`.
pub fn split_segments(key: &str) -> Vec<String> {
    key.split([':', '/', '.']).map(str::to_string).collect()
}

/// True for tokens that look like instance ids: digit runs or UUIDs.
pub fn is_id_token(token: &str) -> bool {
    (!token.is_empty() && token.chars().all(|c| c.is_ascii_digit())) || uuid_re().is_match(token)
}

/// The inferred id path of a key: the segment prefix up to and including the
/// first id-looking token. Keys without one group under their first segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub segments: Vec<String>,
    pub id_level: usize,
    pub has_id: bool,
}

fn find_id_path(segments: &[String]) -> GroupKey {
    for (i, segment) in segments.iter().enumerate() {
        if is_id_token(segment) {
            return GroupKey {
                segments: segments[..=i].to_vec(),
                id_level: i + 1,
                has_id: true,
            };
        }
    }
    GroupKey {
        segments: segments.first().cloned().into_iter().collect(),
        id_level: 1,
        has_id: false,
    }
}

/// Partition pairs by inferred id path, preserving first-seen group order.
pub fn group_pairs(pairs: Vec<KeyValue>) -> IndexMap<GroupKey, Vec<KeyValue>> {
    let mut groups: IndexMap<GroupKey, Vec<KeyValue>> = IndexMap::new();
    for kv in pairs {
        let group = find_id_path(&split_segments(&kv.key));
        groups.entry(group).or_default().push(kv);
    }
    groups
}

fn ensure_object(v: &mut JsonValue) -> &mut Map<String, JsonValue> {
    if !v.is_object() {
        *v = JsonValue::Object(Map::new());
    }
    match v {
        JsonValue::Object(map) => map,
        _ => unreachable!("just coerced to object"),
    }
}

/// Merge a terminal value that lands exactly on the id segment: mappings
/// merge into the instance, scalars are recorded under `"value"`.
fn add_terminal(map: &mut Map<String, JsonValue>, value: &Value) {
    match value {
        Value::Map(fields) => {
            for (k, v) in fields {
                map.insert(k.clone(), v.to_json());
            }
        }
        other => {
            map.insert("value".to_string(), other.to_json());
        }
    }
}

fn descend<'a>(
    current: &'a mut JsonValue,
    segment: &str,
    value: &Value,
    pos: usize,
    total: usize,
) -> &'a mut JsonValue {
    if let Some(caps) = array_segment_re().captures(segment) {
        let name = caps.get(1).map(|m| m.as_str()).unwrap_or(segment);
        let index: usize = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);

        let map = ensure_object(current);
        let slot = map
            .entry(name.to_string())
            .or_insert_with(|| JsonValue::Array(Vec::new()));
        if !slot.is_array() {
            *slot = JsonValue::Array(Vec::new());
        }
        let items = match slot {
            JsonValue::Array(items) => items,
            _ => unreachable!("just coerced to array"),
        };
        while items.len() <= index {
            items.push(JsonValue::Object(Map::new()));
        }
        if pos == total {
            items[index] = value.to_json();
        } else if !items[index].is_object() {
            items[index] = JsonValue::Object(Map::new());
        }
        &mut items[index]
    } else {
        let map = ensure_object(current);
        if pos == total {
            let slot = map.entry(segment.to_string()).or_insert(JsonValue::Null);
            *slot = value.to_json();
            slot
        } else {
            let slot = map
                .entry(segment.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if !slot.is_object() {
                *slot = JsonValue::Object(Map::new());
            }
            slot
        }
    }
}

/// Materialize one group of pairs into a nested object.
///
/// Segments walk/extend objects; `name[idx]` segments create or extend
/// arrays. The id segment inserts an `id` field (coerced to its concrete
/// type) and otherwise stays transparent. Empty containers left behind by
/// placeholder slots are pruned.
pub fn build_nested(group: &GroupKey, pairs: &[KeyValue]) -> JsonValue {
    let entity_id = if group.has_id {
        group.segments.last().cloned()
    } else {
        None
    };

    let mut root = JsonValue::Object(Map::new());

    for kv in pairs {
        let segments = split_segments(&kv.key);
        let total = segments.len();
        let mut current: &mut JsonValue = &mut root;

        for (i, segment) in segments.iter().enumerate() {
            let pos = i + 1;
            if group.has_id && pos == group.id_level {
                let map = ensure_object(&mut *current);
                if !map.contains_key("id") {
                    if let Some(id) = &entity_id {
                        map.insert("id".to_string(), Value::coerce_scalar(id).to_json());
                    }
                }
                if pos == total {
                    add_terminal(map, &kv.value);
                }
                continue;
            }
            current = descend(current, segment, &kv.value, pos, total);
        }
    }

    prune_empty(root)
}

fn is_empty_container(v: &JsonValue) -> bool {
    match v {
        JsonValue::Object(m) => m.is_empty(),
        JsonValue::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Drop empty objects/arrays at every nesting level.
pub fn prune_empty(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| (k, prune_empty(v)))
                .filter(|(_, v)| !is_empty_container(v))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(prune_empty)
                .filter(|v| !is_empty_container(v))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kv(key: &str, raw: &str) -> KeyValue {
        KeyValue::new(key, Value::normalize(raw))
    }

    #[test]
    fn digit_and_uuid_tokens_close_the_group() {
        assert!(is_id_token("42"));
        assert!(is_id_token("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_id_token("name"));
        assert!(!is_id_token(""));
    }

    #[test]
    fn keys_of_one_instance_share_a_group() {
        let groups = group_pairs(vec![
            kv("User:1:name", "Alice"),
            kv("User:1:email", "a@x.io"),
            kv("User:2:name", "Bob"),
        ]);
        assert_eq!(groups.len(), 2);
        let first = groups.keys().next().expect("group");
        assert_eq!(first.segments, vec!["User", "1"]);
        assert!(first.has_id);
        assert_eq!(first.id_level, 2);
    }

    #[test]
    fn idless_keys_group_by_first_segment() {
        let groups = group_pairs(vec![kv("config.timeout", "30"), kv("config.retries", "5")]);
        assert_eq!(groups.len(), 1);
        let key = groups.keys().next().expect("group");
        assert!(!key.has_id);
        assert_eq!(key.segments, vec!["config"]);
    }

    #[test]
    fn builds_nested_object_with_coerced_id() {
        let pairs = vec![kv("User:1:name", "Alice"), kv("User:1:age", "30")];
        let groups = group_pairs(pairs);
        let (group, members) = groups.into_iter().next().expect("group");
        let obj = build_nested(&group, &members);
        assert_eq!(obj, json!({"User": {"id": 1, "name": "Alice", "age": "30"}}));
    }

    #[test]
    fn array_segments_create_array_slots() {
        let pairs = vec![
            kv("User:7:watched[0]:title", "X"),
            kv("User:7:watched[1]:title", "Y"),
        ];
        let groups = group_pairs(pairs);
        let (group, members) = groups.into_iter().next().expect("group");
        let obj = build_nested(&group, &members);
        assert_eq!(
            obj,
            json!({"User": {"id": 7, "watched": [{"title": "X"}, {"title": "Y"}]}})
        );
    }

    #[test]
    fn terminal_mapping_at_id_merges_into_instance() {
        let pairs = vec![kv("User:5", r#"{"name": "Eve", "age": 9}"#)];
        let groups = group_pairs(pairs);
        let (group, members) = groups.into_iter().next().expect("group");
        let obj = build_nested(&group, &members);
        assert_eq!(obj, json!({"User": {"id": 5, "name": "Eve", "age": 9}}));
    }

    #[test]
    fn terminal_scalar_at_id_is_recorded_under_value() {
        let pairs = vec![kv("counter:9", "41")];
        let groups = group_pairs(pairs);
        let (group, members) = groups.into_iter().next().expect("group");
        let obj = build_nested(&group, &members);
        assert_eq!(obj, json!({"counter": {"id": 9, "value": "41"}}));
    }

    #[test]
    fn empty_containers_are_pruned() {
        let pruned = prune_empty(json!({"a": {"b": {}}, "c": [[], {"d": 1}], "e": 2}));
        assert_eq!(pruned, json!({"c": [{"d": 1}], "e": 2}));
    }
}
