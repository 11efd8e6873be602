use crate::value::{Document, Value};
use serde::{Deserialize, Serialize};

/// An opaque pagination cursor carried through the engine as an attribute
/// bag. The engine never inspects its contents — it only persists and
/// re-supplies it to the source store's `find`. Source adapters synthesize
/// it from whatever fields they need for resumption (a partition/sort key
/// pair, a DynamoDB-shaped `LastEvaluatedKey`, an offset, …) and are the
/// only code allowed to read individual keys back out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Cursor(Document);

impl Cursor {
    pub fn none() -> Self {
        Cursor(Document::new())
    }

    pub fn from_map(map: Document) -> Self {
        Cursor(map)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn into_map(self) -> Document {
        self.0
    }

    pub fn as_map(&self) -> &Document {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cursor_round_trips_through_bincode_shaped_bytes() {
        let cursor = Cursor::none();
        let bytes = serde_json::to_vec(&cursor).unwrap();
        let back: Cursor = serde_json::from_slice(&bytes).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn populated_cursor_preserves_keys() {
        let mut cursor = Cursor::none();
        cursor.insert("partition_key", Value::String("X".into()));
        cursor.insert("id", Value::String("X#1".into()));

        assert!(!cursor.is_none());
        assert_eq!(cursor.get("partition_key"), Some(&Value::String("X".into())));
    }
}
