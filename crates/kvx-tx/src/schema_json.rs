//! JSON-Schema inference, variant hashing, and variant combination.
//!
//! Each entity instance yields one schema variant. Variants are
//! canonicalized (recursively sorted keys, compact form), hashed with md5 to
//! deduplicate, counted, and finally merged into one schema per entity with
//! required/optional detection.

use indexmap::{IndexMap, IndexSet};
use kvx_core::Value;
use serde_json::{json, Map, Value as JsonValue};

/// Infer the schema of one instance value.
///
/// Strings are coerced first so `"42"` infers as an integer and an embedded
/// JSON document infers as its structure. Array item schemas collapse to a
/// single schema when identical, `oneOf` otherwise.
pub fn infer_schema(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => json!({"type": "null"}),
        JsonValue::Bool(_) => json!({"type": "boolean"}),
        JsonValue::Number(n) => {
            if n.is_i64() || n.is_u64() {
                json!({"type": "integer"})
            } else {
                json!({"type": "number"})
            }
        }
        JsonValue::String(s) => {
            let coerced = Value::coerce_scalar(s);
            if coerced.is_structured() {
                infer_schema(&coerced.to_json())
            } else {
                match coerced {
                    Value::Null => json!({"type": "null"}),
                    Value::Bool(_) => json!({"type": "boolean"}),
                    Value::Int(_) => json!({"type": "integer"}),
                    Value::Float(_) => json!({"type": "number"}),
                    _ => json!({"type": "string"}),
                }
            }
        }
        JsonValue::Array(items) => {
            let schemas = items.iter().map(infer_schema).collect();
            json!({"type": "array", "items": merge_item_schemas(schemas)})
        }
        JsonValue::Object(map) => {
            let mut properties = Map::new();
            for (name, v) in map {
                properties.insert(name.clone(), infer_schema(v));
            }
            json!({"type": "object", "properties": properties})
        }
    }
}

/// Merge the schemas of one array's items: identical schemas collapse,
/// mixed schemas become `oneOf` over the distinct shapes.
fn merge_item_schemas(schemas: Vec<JsonValue>) -> JsonValue {
    if schemas.is_empty() {
        return json!({"type": "string"});
    }
    let mut distinct: IndexMap<String, JsonValue> = IndexMap::new();
    for schema in &schemas {
        distinct.entry(canonical_string(schema)).or_insert_with(|| canonicalize(schema));
    }
    if distinct.len() == 1 {
        return schemas.into_iter().next().expect("non-empty");
    }
    json!({"oneOf": distinct.into_values().collect::<Vec<_>>()})
}

/// Recursively sort object keys, producing the canonical schema form.
pub fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn canonical_string(value: &JsonValue) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Stable 128-bit digest of a schema, invariant under key permutation.
pub fn schema_hash(schema: &JsonValue) -> String {
    format!("{:x}", md5::compute(canonical_string(schema).as_bytes()))
}

/// Extract `(entity, schema)` from a materialized instance object. The
/// entity is the single top-level key; empty instances yield nothing.
pub fn extract_schema(object: &JsonValue) -> Option<(String, JsonValue)> {
    let map = object.as_object()?;
    let (entity, inner) = map.iter().next()?;
    Some((entity.clone(), infer_schema(inner)))
}

/// Group schema variants per entity, counting identical shapes by hash.
pub fn group_variations(
    schemas: impl IntoIterator<Item = (String, JsonValue)>,
) -> IndexMap<String, Vec<(JsonValue, u64)>> {
    let mut grouped: IndexMap<String, IndexMap<String, (JsonValue, u64)>> = IndexMap::new();
    for (entity, schema) in schemas {
        let hash = schema_hash(&schema);
        let entry = grouped
            .entry(entity)
            .or_default()
            .entry(hash)
            .or_insert((schema, 0));
        entry.1 += 1;
    }
    grouped
        .into_iter()
        .map(|(entity, by_hash)| (entity, by_hash.into_values().collect()))
        .collect()
}

/// Combine an entity's schema variants into one schema.
pub fn combine_variations(variants: &[(JsonValue, u64)]) -> JsonValue {
    if variants.is_empty() {
        return json!({"type": "string"});
    }

    let types: IndexSet<&str> = variants
        .iter()
        .filter_map(|(schema, _)| schema.get("type").and_then(JsonValue::as_str))
        .collect();

    if types.len() == 1 {
        match types[0] {
            "object" => combine_object_variants(variants),
            "array" => combine_array_variants(variants),
            other => json!({"type": other}),
        }
    } else {
        json!({"type": dominant_type(variants)})
    }
}

fn dominant_type(variants: &[(JsonValue, u64)]) -> String {
    let mut counts: IndexMap<&str, u64> = IndexMap::new();
    for (schema, count) in variants {
        if let Some(t) = schema.get("type").and_then(JsonValue::as_str) {
            *counts.entry(t).or_default() += count;
        }
    }
    let mut best: Option<(&str, u64)> = None;
    for (t, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((t, count));
        }
    }
    best.map(|(t, _)| t.to_string()).unwrap_or_else(|| "string".to_string())
}

fn combine_object_variants(variants: &[(JsonValue, u64)]) -> JsonValue {
    let total: u64 = variants.iter().map(|(_, count)| count).sum();

    let mut stats: IndexMap<String, (u64, Vec<(JsonValue, u64)>)> = IndexMap::new();
    for (schema, count) in variants {
        let Some(properties) = schema.get("properties").and_then(JsonValue::as_object) else {
            continue;
        };
        for (name, prop_schema) in properties {
            let entry = stats.entry(name.clone()).or_default();
            entry.0 += count;
            entry.1.push((prop_schema.clone(), *count));
        }
    }

    let mut merged = Map::new();
    let mut required = Vec::new();
    for (name, (count, variations)) in &stats {
        merged.insert(name.clone(), combine_variations(variations));
        if *count == total {
            required.push(name.clone());
        }
    }

    let mut result = json!({"type": "object", "properties": merged});
    if !required.is_empty() {
        required.sort();
        result["required"] = json!(required);
    }
    result
}

fn combine_array_variants(variants: &[(JsonValue, u64)]) -> JsonValue {
    let mut items = Vec::new();
    for (schema, count) in variants {
        if let Some(item_schema) = schema.get("items") {
            items.push((item_schema.clone(), *count));
        }
    }
    json!({"type": "array", "items": simplify_array_items(items)})
}

/// Collapse array item variants: object variants recombine, otherwise the
/// primitive type with the highest total count wins.
fn simplify_array_items(item_variations: Vec<(JsonValue, u64)>) -> JsonValue {
    if item_variations.is_empty() {
        return json!({"type": "string"});
    }

    let mut flattened = Vec::new();
    for (item, count) in item_variations {
        match item.get("oneOf").and_then(JsonValue::as_array) {
            Some(alternatives) => {
                for alternative in alternatives {
                    flattened.push((alternative.clone(), count));
                }
            }
            None => flattened.push((item, count)),
        }
    }

    let object_items: Vec<(JsonValue, u64)> = flattened
        .iter()
        .filter(|(v, _)| v.get("type").and_then(JsonValue::as_str) == Some("object"))
        .cloned()
        .collect();

    let mut simple_counts: IndexMap<String, u64> = IndexMap::new();
    for (variation, count) in &flattened {
        if let Some(t) = variation.get("type").and_then(JsonValue::as_str) {
            if t != "object" {
                *simple_counts.entry(t.to_string()).or_default() += count;
            }
        }
    }

    if !object_items.is_empty() {
        let combined = combine_variations(&object_items);
        if combined
            .get("properties")
            .and_then(JsonValue::as_object)
            .map_or(false, |p| !p.is_empty())
        {
            return combined;
        }
    }

    let mut best: Option<(String, u64)> = None;
    for (t, count) in simple_counts {
        if best.as_ref().map_or(true, |(_, c)| count > *c) {
            best = Some((t, count));
        }
    }
    match best {
        Some((t, _)) => json!({"type": t}),
        None => json!({"type": "string"}),
    }
}
