use model::{Document, Value};

pub const BOOKKEEPING_FIELDS: [&str; 2] = ["is_migrated", "migrated_at"];

/// Injects the adapter's primary-key field from `id` on write, the way
/// `mongodb_client.py::_inject_id_field` injects `_id` from `id` before an
/// `insert_many`.
pub fn inject_primary_key(mut doc: Document, pk_field: &str) -> Document {
    if pk_field != "id"
        && let Some(id) = doc.get("id").cloned()
    {
        doc.insert(pk_field.to_string(), id);
    }
    doc
}

/// Strips bookkeeping fields (`is_migrated`, `migrated_at`) from a payload
/// before it is written to the destination — the destination never learns
/// about the source's migration-tracking fields.
pub fn strip_bookkeeping_fields(mut doc: Document) -> Document {
    for field in BOOKKEEPING_FIELDS {
        doc.remove(field);
    }
    doc
}

pub fn is_migrated(doc: &Document) -> bool {
    matches!(doc.get("is_migrated"), Some(Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_primary_key_copies_id_into_pk_field() {
        let mut doc = Document::new();
        doc.insert("id".into(), Value::String("X".into()));
        let doc = inject_primary_key(doc, "_id");
        assert_eq!(doc.get("_id"), Some(&Value::String("X".into())));
        assert_eq!(doc.get("id"), Some(&Value::String("X".into())));
    }

    #[test]
    fn strip_bookkeeping_fields_removes_only_those_fields() {
        let mut doc = Document::new();
        doc.insert("id".into(), Value::String("X".into()));
        doc.insert("is_migrated".into(), Value::Bool(true));
        doc.insert("migrated_at".into(), Value::String("t".into()));
        doc.insert("v".into(), Value::Number(1.into()));

        let doc = strip_bookkeeping_fields(doc);
        assert!(!doc.contains_key("is_migrated"));
        assert!(!doc.contains_key("migrated_at"));
        assert_eq!(doc.get("v"), Some(&Value::Number(1.into())));
    }
}
