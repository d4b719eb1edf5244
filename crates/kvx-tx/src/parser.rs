//! Key classification and structured-value flattening.
//!
//! Keys are matched against an ordered table of labelled templates
//! (`User:{id}:{property}` -> `Prop`). Structured values are flattened into
//! synthetic flat keys that re-enter the same table, so a JSON document
//! stored under one key ends up contributing ordinary entity attributes.

use crate::fuzzy;
use kvx_core::{Components, KeyValue, KvxError, ParsedKey, PatternLabel, PatternsSpec, SyntheticIds, Value};
use regex::Regex;
use std::sync::OnceLock;

/// Similarity above which a flattened path is accepted as the entity id.
const ID_MATCH_THRESHOLD: u32 = 75;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("static regex"))
}

/// The five component names a template may bind.
const COMPONENT_NAMES: [&str; 5] = ["entity", "id", "property", "index", "aggregate_property"];

/// An ordered, compiled pattern table. Declaration order is match order.
#[derive(Debug)]
pub struct PatternTable {
    patterns: Vec<(Regex, PatternLabel)>,
}

impl PatternTable {
    /// Load and compile a YAML pattern file.
    pub fn load(path: &std::path::Path) -> Result<Self, KvxError> {
        Self::compile(&PatternsSpec::load(path)?)
    }

    /// Compile labelled templates into anchored regexes with named groups.
    ///
    /// `{id}` and `{index}` bind digit runs, the other components word
    /// characters. Literal `.`, `[`, `]` are escaped. Every template must
    /// bind `entity`, and only the five reserved component names exist.
    pub fn compile(spec: &PatternsSpec) -> Result<Self, KvxError> {
        let mut patterns = Vec::with_capacity(spec.patterns.len());
        for item in &spec.patterns {
            if item.label == PatternLabel::Primitive {
                return Err(KvxError::Config(format!(
                    "pattern {:?}: Primitive is the fallthrough label and cannot be declared",
                    item.pattern
                )));
            }
            let regex = compile_template(&item.pattern)?;
            patterns.push((regex, item.label));
        }
        Ok(Self { patterns })
    }

    /// Classify a key: the first matching template wins; a key that matches
    /// nothing is `Primitive` with the whole key as entity name.
    pub fn classify(&self, key: &str) -> (Components, PatternLabel) {
        for (regex, label) in &self.patterns {
            if let Some(caps) = regex.captures(key) {
                let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
                let components = Components {
                    entity: group("entity").unwrap_or_default(),
                    id: group("id"),
                    property: group("property"),
                    index: group("index"),
                    aggregate_property: group("aggregate_property"),
                    synthetic_id: false,
                };
                return (components, *label);
            }
        }
        (Components::primitive(key), PatternLabel::Primitive)
    }
}

fn compile_template(template: &str) -> Result<Regex, KvxError> {
    let mut out = String::from("^");
    let mut last = 0;
    let mut saw_entity = false;

    for caps in placeholder_re().captures_iter(template) {
        let whole = caps.get(0).expect("capture 0 always present");
        let name = &caps[1];
        if !COMPONENT_NAMES.contains(&name) {
            return Err(KvxError::Config(format!(
                "pattern {:?}: unknown component {{{}}}",
                template, name
            )));
        }
        saw_entity |= name == "entity";
        out.push_str(&escape_literal(&template[last..whole.start()]));
        if name == "id" || name == "index" {
            out.push_str(&format!(r"(?P<{}>\d+)", name));
        } else {
            out.push_str(&format!(r"(?P<{}>\w+)", name));
        }
        last = whole.end();
    }
    out.push_str(&escape_literal(&template[last..]));
    out.push('$');

    if !saw_entity {
        return Err(KvxError::Config(format!(
            "pattern {:?}: template does not bind {{entity}}",
            template
        )));
    }
    Regex::new(&out).map_err(|e| KvxError::Config(format!("pattern {:?}: {}", template, e)))
}

/// Escape the literal separators templates are allowed to contain.
fn escape_literal(text: &str) -> String {
    text.replace('[', r"\[").replace(']', r"\]").replace('.', r"\.")
}

/// Recursively walk a structured value, yielding `(path, leaf)` pairs.
/// Objects descend with `.`, arrays with `[i]`.
pub fn flatten_pairs(value: &Value, parent: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Map(map) => {
            for (key, v) in map {
                let path = if parent.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", parent, key)
                };
                flatten_pairs(v, &path, out);
            }
        }
        Value::List(items) | Value::Set(items) => {
            for (index, v) in items.iter().enumerate() {
                flatten_pairs(v, &format!("{}[{}]", parent, index), out);
            }
        }
        leaf => out.push((parent.to_string(), leaf.clone())),
    }
}

/// Flatten one nested object into flat `(key, leaf)` pairs under the given
/// components.
///
/// When no id is known, the leaf paths are scanned for one whose name is
/// close to `"{entity}ID"`; the first path clearing the threshold donates
/// its value as the id. Failing that, a synthetic id is drawn. Returns the
/// pairs plus whether the id was synthesized.
pub fn flatten_object(
    value: &Value,
    components: &Components,
    ids: &mut SyntheticIds,
) -> (Vec<(String, Value)>, bool) {
    let entity = &components.entity;
    let mut pairs = Vec::new();
    flatten_pairs(value, "", &mut pairs);

    let mut synthetic = false;
    let id = match &components.id {
        Some(id) => id.clone(),
        None => {
            let target = format!("{}ID", entity);
            match pairs
                .iter()
                .find(|(path, _)| fuzzy::weighted_ratio(&target, path) > ID_MATCH_THRESHOLD)
            {
                Some((_, leaf)) => leaf.to_string(),
                None => {
                    synthetic = true;
                    ids.next_id()
                }
            }
        }
    };

    let from_list = matches!(value, Value::List(_) | Value::Set(_));
    let flat = pairs
        .into_iter()
        .map(|(path, leaf)| {
            let mut key = format!("{}:{}", entity, id);
            match &components.property {
                Some(property) => {
                    key.push(':');
                    key.push_str(property);
                    if from_list {
                        key.push_str(&path);
                    } else {
                        if let Some(index) = &components.index {
                            key.push_str(&format!("[{}]", index));
                        }
                        key.push('.');
                        key.push_str(&path);
                    }
                }
                None => {
                    key.push(':');
                    key.push_str(&path);
                }
            }
            (key, leaf)
        })
        .collect();

    (flat, synthetic)
}

/// Flatten a structured value into one or more objects' worth of flat pairs.
///
/// The top-level shape dictates entity placement: an object whose values are
/// all objects spawns one entity per key; a list of such objects likewise; a
/// list of plain objects flattens each element under the current components;
/// anything else stays a single object.
pub fn flatten_structured(
    value: &Value,
    components: &Components,
    ids: &mut SyntheticIds,
) -> Vec<(Vec<(String, Value)>, bool)> {
    let mut objects = Vec::new();

    match value {
        Value::Map(map) => {
            if map.values().all(|v| matches!(v, Value::Map(_))) {
                for (name, object) in map {
                    let comps = Components {
                        entity: name.clone(),
                        ..Default::default()
                    };
                    objects.push(flatten_object(object, &comps, ids));
                }
            } else {
                objects.push(flatten_object(value, components, ids));
            }
        }
        Value::List(items) | Value::Set(items) => {
            if items.iter().all(|v| matches!(v, Value::Map(_))) {
                for item in items {
                    if let Value::Map(map) = item {
                        if map.values().all(|v| matches!(v, Value::Map(_))) {
                            for (name, object) in map {
                                let comps = Components {
                                    entity: name.clone(),
                                    ..Default::default()
                                };
                                objects.push(flatten_object(object, &comps, ids));
                            }
                        } else {
                            objects.push(flatten_object(item, components, ids));
                        }
                    }
                }
            } else {
                objects.push(flatten_object(value, components, ids));
            }
        }
        _ => objects.push(flatten_object(value, components, ids)),
    }

    objects
}

/// Classify a batch of raw pairs, flattening structured values into
/// re-classified synthetic keys (the `parse_key_values` stage).
pub fn parse_pairs(
    pairs: Vec<KeyValue>,
    table: &PatternTable,
    ids: &mut SyntheticIds,
) -> Vec<ParsedKey> {
    let mut parsed = Vec::new();

    for kv in pairs {
        let (mut components, label) = table.classify(&kv.key);

        if kv.value.is_structured() {
            for (flat, synthetic) in flatten_structured(&kv.value, &components, ids) {
                for (key, leaf) in flat {
                    let (mut comps, label) = table.classify(&key);
                    comps.synthetic_id = synthetic;
                    parsed.push(ParsedKey {
                        key,
                        value: leaf,
                        label,
                        components: comps,
                    });
                }
            }
        } else {
            if label == PatternLabel::Primitive {
                // A primitive key with a primitive value carries neither id
                // nor property.
                components.id = Some(ids.next_id());
                components.synthetic_id = true;
                components.property = Some("value".to_string());
            } else if components.id.is_none() {
                components.id = Some(ids.next_id());
                components.synthetic_id = true;
            }
            parsed.push(ParsedKey {
                key: kv.key,
                value: kv.value,
                label,
                components,
            });
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvx_core::PatternSpec;

    fn table() -> PatternTable {
        PatternTable::compile(&PatternsSpec {
            patterns: vec![
                PatternSpec {
                    pattern: "{entity}:{id}:{property}[{index}].{aggregate_property}".into(),
                    label: PatternLabel::ArrProp,
                },
                PatternSpec {
                    pattern: "{entity}:{id}:{property}[{index}]".into(),
                    label: PatternLabel::Arr,
                },
                PatternSpec {
                    pattern: "{entity}:{id}:{property}.{aggregate_property}".into(),
                    label: PatternLabel::AggProp,
                },
                PatternSpec {
                    pattern: "{entity}:{id}:{property}".into(),
                    label: PatternLabel::Prop,
                },
            ],
        })
        .expect("patterns compile")
    }

    #[test]
    fn first_matching_pattern_wins() {
        let table = table();
        let (comps, label) = table.classify("User:42:Addr.city");
        assert_eq!(label, PatternLabel::AggProp);
        assert_eq!(comps.entity, "User");
        assert_eq!(comps.id.as_deref(), Some("42"));
        assert_eq!(comps.property.as_deref(), Some("Addr"));
        assert_eq!(comps.aggregate_property.as_deref(), Some("city"));
    }

    #[test]
    fn array_property_binds_index() {
        let (comps, label) = table().classify("User:1:watchedMovies[3].movie_id");
        assert_eq!(label, PatternLabel::ArrProp);
        assert_eq!(comps.index.as_deref(), Some("3"));
        assert_eq!(comps.aggregate_property.as_deref(), Some("movie_id"));
    }

    #[test]
    fn unmatched_keys_fall_through_to_primitive() {
        let (comps, label) = table().classify("some opaque key");
        assert_eq!(label, PatternLabel::Primitive);
        assert_eq!(comps.entity, "some opaque key");
        assert_eq!(comps.id, None);
    }

    #[test]
    fn id_binds_digits_only() {
        let (_, label) = table().classify("User:abc:name");
        assert_eq!(label, PatternLabel::Primitive);
    }

    #[test]
    fn unknown_component_is_a_config_error() {
        let bad = PatternsSpec {
            patterns: vec![PatternSpec {
                pattern: "{entity}:{wild}".into(),
                label: PatternLabel::Prop,
            }],
        };
        assert!(PatternTable::compile(&bad).is_err());
    }

    #[test]
    fn nested_map_flattens_with_dot_and_index_paths() {
        let value = Value::normalize(r#"{"name": "Alice", "tags": ["a", "b"], "addr": {"city": "NYC"}}"#);
        let mut out = Vec::new();
        flatten_pairs(&value, "", &mut out);
        let paths: Vec<&str> = out.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["name", "tags[0]", "tags[1]", "addr.city"]);
    }

    #[test]
    fn flatten_object_discovers_embedded_id() {
        let value = Value::normalize(r#"{"userId": 42, "name": "Alice"}"#);
        let comps = Components {
            entity: "User".into(),
            ..Default::default()
        };
        let mut ids = SyntheticIds::seeded(1);
        let (flat, synthetic) = flatten_object(&value, &comps, &mut ids);
        assert!(!synthetic);
        assert!(flat.iter().all(|(k, _)| k.starts_with("User:42:")));
    }

    #[test]
    fn flatten_object_falls_back_to_synthetic_id() {
        let value = Value::normalize(r#"{"name": "widget"}"#);
        let comps = Components {
            entity: "Product".into(),
            ..Default::default()
        };
        let mut ids = SyntheticIds::seeded(1);
        let (flat, synthetic) = flatten_object(&value, &comps, &mut ids);
        assert!(synthetic);
        assert_eq!(flat.len(), 1);
        let (key, leaf) = &flat[0];
        assert!(key.ends_with(":name"));
        assert_eq!(leaf, &Value::Str("widget".into()));
    }

    #[test]
    fn object_of_objects_spawns_one_entity_per_key() {
        let value =
            Value::normalize(r#"{"User": {"userId": 1, "name": "A"}, "Movie": {"movieId": 9}}"#);
        let comps = Components::primitive("doc");
        let mut ids = SyntheticIds::seeded(1);
        let objects = flatten_structured(&value, &comps, &mut ids);
        assert_eq!(objects.len(), 2);
        assert!(objects[0].0.iter().all(|(k, _)| k.starts_with("User:1:")));
        assert!(objects[1].0.iter().all(|(k, _)| k.starts_with("Movie:9:")));
    }

    #[test]
    fn parse_pairs_reclassifies_flattened_keys() {
        let table = table();
        let mut ids = SyntheticIds::seeded(1);
        let pairs = vec![KeyValue::new(
            "User:1:profile",
            Value::normalize(r#"{"age": 30, "city": "NYC"}"#),
        )];
        let parsed = parse_pairs(pairs, &table, &mut ids);
        assert_eq!(parsed.len(), 2);
        assert!(parsed
            .iter()
            .all(|p| p.label == PatternLabel::AggProp && p.components.property.as_deref() == Some("profile")));
    }

    #[test]
    fn primitive_string_pair_gets_synthetic_id_and_value_property() {
        let table = table();
        let mut ids = SyntheticIds::seeded(1);
        let parsed = parse_pairs(
            vec![KeyValue::new("version", Value::Str("7".into()))],
            &table,
            &mut ids,
        );
        assert_eq!(parsed.len(), 1);
        let p = &parsed[0];
        assert_eq!(p.label, PatternLabel::Primitive);
        assert!(p.components.synthetic_id);
        assert_eq!(p.components.property.as_deref(), Some("value"));
        assert!(p.components.id.is_some());
    }
}
