use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An unordered mapping from field names to values. `BTreeMap` is used for
/// a deterministic iteration order (stable plan hashing, easy-to-diff
/// cancellation log entries), not because ordering is semantically
/// meaningful to document stores.
pub type Document = BTreeMap<String, Value>;

/// A value drawn from the set a document store can hold: strings, arbitrary
/// precision decimals, booleans, null, nested documents and ordered lists.
///
/// `Number` is backed by `rust_decimal::Decimal` and always serializes
/// through its canonical decimal string (`rust_decimal::serde::str`), never
/// through `f64` — the engine must preserve numeric precision losslessly
/// end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Number(#[serde(with = "rust_decimal::serde::str")] Decimal),
    Bool(bool),
    Null,
    Array(Vec<Value>),
    Object(Document),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Decimal> {
        match self {
            Value::Number(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Returns the document's `id` field as a string, if present and well-typed.
///
/// Every document must carry a stable, unique `id` field (see `model::plan`);
/// callers that read it back after a store round-trip use this helper
/// instead of matching on `Value` directly.
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

/// Deep-copies a document through a lossless serialization round-trip,
/// detaching it from any adapter-owned mutable state the original instance
/// might be backed by (e.g. a connection pool's row buffer) and normalizing
/// its decimal representation.
///
/// This is an internal round-trip (not a wire format): it always succeeds
/// for values built from this module, so panics here indicate a bug in
/// `Value`'s (de)serialization impl rather than a data problem.
pub fn deep_clone_document(doc: &Document) -> Document {
    let bytes =
        serde_json::to_vec(doc).expect("in-memory Document must always serialize");
    serde_json::from_slice(&bytes).expect("just-serialized Document must always parse back")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn deep_clone_preserves_decimal_precision() {
        let mut doc = Document::new();
        doc.insert("id".into(), Value::String("D".into()));
        doc.insert(
            "amount".into(),
            Value::Number(Decimal::from_str("1.2300000000000001").unwrap()),
        );

        let cloned = deep_clone_document(&doc);
        assert_eq!(cloned.get("amount"), doc.get("amount"));
        assert_eq!(
            cloned.get("amount").unwrap().as_number().unwrap().to_string(),
            "1.2300000000000001"
        );
    }

    #[test]
    fn deep_clone_does_not_alias_nested_structures() {
        let mut doc = Document::new();
        doc.insert(
            "tags".into(),
            Value::Array(vec![Value::String("a".into()), Value::String("b".into())]),
        );

        let mut cloned = deep_clone_document(&doc);
        if let Some(Value::Array(tags)) = cloned.get_mut("tags") {
            tags.push(Value::String("c".into()));
        }

        assert_eq!(doc.get("tags"), Some(&Value::Array(vec![
            Value::String("a".into()),
            Value::String("b".into()),
        ])));
    }

    #[test]
    fn string_that_looks_numeric_round_trips_as_string() {
        let mut doc = Document::new();
        doc.insert("code".into(), Value::String("00123".into()));

        let cloned = deep_clone_document(&doc);
        assert_eq!(cloned.get("code"), Some(&Value::String("00123".into())));
    }
}
