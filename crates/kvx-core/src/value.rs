//! Canonical in-memory form for store values.
//!
//! Every value fetched from the store is normalized into [`Value`], a tagged
//! variant that all downstream stages pattern-match instead of switching on
//! runtime container shape.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::fmt;

/// A store value in canonical form.
///
/// `Set` keeps the order the store returned its members in, but carries no
/// ordering guarantee. `Map` preserves field insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// True for leaf values (everything but lists, sets, and maps).
    pub fn is_scalar(&self) -> bool {
        !self.is_structured()
    }

    /// True for container values that the flattener must walk.
    pub fn is_structured(&self) -> bool {
        matches!(self, Value::List(_) | Value::Set(_) | Value::Map(_))
    }

    /// Normalize a raw string value fetched from the store.
    ///
    /// Runs of single quotes are healed into double quotes when the string
    /// contains at least two of them, to recover naively encoded JSON. A
    /// successful JSON parse is kept only when the result is structured;
    /// scalar-looking strings stay strings here so that numeric ids survive
    /// key composition. `"True"`/`"False"` become booleans, the empty string
    /// becomes `Null`.
    pub fn normalize(raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        if let Ok(parsed) = serde_json::from_str::<JsonValue>(&heal_quotes(raw)) {
            if parsed.is_array() || parsed.is_object() {
                return Value::from_json(parsed);
            }
        }
        match raw {
            "True" => Value::Bool(true),
            "False" => Value::Bool(false),
            _ => Value::Str(raw.to_string()),
        }
    }

    /// Fully coerce a raw string, scalars included.
    ///
    /// Used where a concrete type is needed rather than the raw encoding:
    /// schema leaf inference and id materialization. `"42"` becomes an
    /// integer here, while [`Value::normalize`] would keep it a string.
    pub fn coerce_scalar(raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        if let Ok(parsed) = serde_json::from_str::<JsonValue>(&heal_quotes(raw)) {
            return Value::from_json(parsed);
        }
        match raw {
            "True" => Value::Bool(true),
            "False" => Value::Bool(false),
            _ => Value::Str(raw.to_string()),
        }
    }

    /// Convert a parsed JSON document into canonical form.
    pub fn from_json(json: JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            JsonValue::String(s) => Value::Str(s),
            JsonValue::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a JSON document. Sets become arrays.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::List(items) | Value::Set(items) => {
                JsonValue::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => JsonValue::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// Replace single quotes with double quotes when the string holds at least
/// two of them. Heals `{'a': 1}`-style encodings before the JSON parse.
fn heal_quotes(raw: &str) -> Cow<'_, str> {
    if raw.matches('\'').count() >= 2 {
        Cow::Owned(raw.replace('\'', "\""))
    } else {
        Cow::Borrowed(raw)
    }
}

impl fmt::Display for Value {
    /// Textual form used when observing values for column type inference.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_normalizes_to_null() {
        assert_eq!(Value::normalize(""), Value::Null);
    }

    #[test]
    fn structured_json_is_parsed() {
        let v = Value::normalize(r#"{"city": "NYC", "zip": "10001"}"#);
        match v {
            Value::Map(m) => {
                assert_eq!(m.get("city"), Some(&Value::Str("NYC".into())));
                assert_eq!(m.get("zip"), Some(&Value::Str("10001".into())));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn single_quoted_json_is_healed() {
        let v = Value::normalize("{'a': 1, 'b': 2}");
        match v {
            Value::Map(m) => assert_eq!(m.get("a"), Some(&Value::Int(1))),
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn scalar_json_stays_a_string_under_normalize() {
        assert_eq!(Value::normalize("42"), Value::Str("42".into()));
        assert_eq!(Value::normalize("true"), Value::Str("true".into()));
    }

    #[test]
    fn capitalized_boolean_literals_normalize() {
        assert_eq!(Value::normalize("True"), Value::Bool(true));
        assert_eq!(Value::normalize("False"), Value::Bool(false));
    }

    #[test]
    fn coerce_scalar_converts_numbers_and_booleans() {
        assert_eq!(Value::coerce_scalar("42"), Value::Int(42));
        assert_eq!(Value::coerce_scalar("4.5"), Value::Float(4.5));
        assert_eq!(Value::coerce_scalar("true"), Value::Bool(true));
        assert_eq!(Value::coerce_scalar("null"), Value::Null);
        assert_eq!(Value::coerce_scalar("Alice"), Value::Str("Alice".into()));
    }

    #[test]
    fn json_round_trip_preserves_field_order() {
        let doc: JsonValue = serde_json::from_str(r#"{"z": 1, "a": [1, 2], "m": {"x": null}}"#)
            .expect("valid json");
        assert_eq!(Value::from_json(doc.clone()).to_json(), doc);
    }

    #[test]
    fn display_matches_column_observation_format() {
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Str("x".into()).to_string(), "x");
        assert_eq!(Value::Null.to_string(), "");
    }
}
