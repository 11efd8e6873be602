use crate::{
    error::StoreError,
    keymodel,
    traits::{ReadResult, Store, WriteResult},
};
use async_trait::async_trait;
use model::{Cursor, Document, FieldQuery, QueryOp, Value};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use tokio::sync::RwLock;

/// In-process `Store` backed by a `BTreeMap<collection, BTreeMap<id, Document>>`.
/// Used by `engine-core`'s unit and integration tests in place of a mocking
/// framework — deterministic, inspectable from the test, and exercises the
/// real `Store` contract (pagination cursor, `is_migrated` filter,
/// partial-write cancellation) end to end.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<BTreeMap<String, BTreeMap<String, Document>>>>,
    last_cursor: Arc<Mutex<Option<Cursor>>>,
    /// When set, `batch_write` rejects ids at/after this index in the
    /// incoming batch, simulating a partial bulk-write failure.
    fail_after: Arc<Mutex<Option<usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a collection with documents, keyed by their `id` field.
    pub async fn seed(&self, collection: &str, documents: Vec<Document>) {
        let mut collections = self.collections.write().await;
        let table = collections.entry(collection.to_string()).or_default();
        for doc in documents {
            if let Some(id) = model::value::document_id(&doc) {
                table.insert(id.to_string(), doc);
            }
        }
    }

    pub async fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|t| t.get(id))
            .cloned()
    }

    pub async fn all(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes the next `batch_write` against this store accept only the
    /// first `n` documents and report the rest as cancelled.
    pub fn inject_partial_failure(&self, accept_first: usize) {
        *self.fail_after.lock().unwrap() = Some(accept_first);
    }

    fn matches(doc: &Document, query: &FieldQuery) -> bool {
        let Some(field_value) = doc.get(&query.field_name) else {
            return false;
        };
        match (field_value, &query.value, query.operation) {
            (Value::Number(a), Value::Number(b), op) => match op {
                QueryOp::Eq => a == b,
                QueryOp::Gt => a > b,
                QueryOp::Gte => a >= b,
                QueryOp::Lt => a < b,
                QueryOp::Lte => a <= b,
            },
            (Value::String(a), Value::String(b), op) => match op {
                QueryOp::Eq => a == b,
                QueryOp::Gt => a > b,
                QueryOp::Gte => a >= b,
                QueryOp::Lt => a < b,
                QueryOp::Lte => a <= b,
            },
            (a, b, QueryOp::Eq) => a == b,
            _ => false,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        queries: &[FieldQuery],
        _index_name: Option<&str>,
        batch_size: usize,
        find_all: bool,
    ) -> Result<ReadResult, StoreError> {
        let collections = self.collections.read().await;
        let table = collections.get(collection);

        let mut matched: Vec<Document> = table
            .map(|t| t.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        matched.retain(|doc| {
            queries.iter().all(|q| Self::matches(doc, q)) && (find_all || !keymodel::is_migrated(doc))
        });

        // Deterministic order for reproducible pagination in tests.
        matched.sort_by(|a, b| {
            model::value::document_id(a)
                .unwrap_or_default()
                .cmp(model::value::document_id(b).unwrap_or_default())
        });

        // Resume after the last id returned, not a count offset into the
        // filtered view: marking earlier rows `is_migrated` between batches
        // shrinks that view, so a count offset would skip unfetched rows.
        // Mirrors `DynamoStore`'s `exclusive_start_key`/`LastEvaluatedKey`.
        let last_cursor = self.last_cursor.lock().unwrap().clone();
        let last_id = last_cursor.as_ref().and_then(|c| c.get("last_id")).and_then(Value::as_str);

        let start = match last_id {
            Some(last_id) => matched.partition_point(|doc| {
                model::value::document_id(doc).unwrap_or_default() <= last_id
            }),
            None => 0,
        };

        let page: Vec<Document> = matched[start..].iter().take(batch_size).cloned().collect();
        let has_more = start + page.len() < matched.len();

        let cursor = if has_more {
            let mut c = Cursor::none();
            let last_id = model::value::document_id(page.last().unwrap()).unwrap_or_default();
            c.insert("last_id", Value::String(last_id.to_string()));
            Some(c)
        } else {
            None
        };

        *self.last_cursor.lock().unwrap() = cursor.clone();

        Ok(ReadResult {
            documents: page,
            has_more,
            cursor,
        })
    }

    async fn set_last_document(&self, cursor: Option<Cursor>) {
        *self.last_cursor.lock().unwrap() = cursor;
    }

    async fn last_fetched_key(&self) -> Option<Cursor> {
        self.last_cursor.lock().unwrap().clone()
    }

    async fn batch_write(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<WriteResult, StoreError> {
        let split = self.fail_after.lock().unwrap().take();

        let (accepted, cancelled) = match split {
            Some(n) if n < documents.len() => {
                (documents[..n].to_vec(), documents[n..].to_vec())
            }
            _ => (documents, Vec::new()),
        };

        let accepted_ids: Vec<String> = accepted
            .iter()
            .filter_map(|d| model::value::document_id(d).map(str::to_string))
            .collect();

        {
            let mut collections = self.collections.write().await;
            let table = collections.entry(collection.to_string()).or_default();
            for doc in &accepted {
                if let Some(id) = model::value::document_id(doc) {
                    table.insert(id.to_string(), doc.clone());
                }
            }
        }

        if !cancelled.is_empty() {
            return Err(StoreError::InsertionWasCancelled {
                collection: collection.to_string(),
                cancelled_documents: cancelled,
                inserted_documents: accepted,
                exception_details: "simulated partial bulk-write failure".to_string(),
            });
        }

        Ok(WriteResult {
            processed_count: accepted_ids.len(),
            accepted_ids,
        })
    }

    async fn batch_update(
        &self,
        collection: &str,
        updates: Vec<Document>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let table = collections.entry(collection.to_string()).or_default();

        for update in updates {
            let Some(id) = model::value::document_id(&update) else {
                continue;
            };
            let entry = table.entry(id.to_string()).or_default();
            for (k, v) in update {
                if k != "id" {
                    entry.insert(k, v);
                }
            }
        }

        Ok(())
    }

    async fn update(&self, collection: &str, single: Document) -> Result<(), StoreError> {
        let Some(id) = model::value::document_id(&single) else {
            return Err(StoreError::MissingRequiredConfigurationParam(
                "document is missing an id field".to_string(),
            ));
        };
        let id = id.to_string();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, single);
        Ok(())
    }

    async fn find_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.get(collection, id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        let mut d = Document::new();
        d.insert("id".into(), Value::String(id.into()));
        d
    }

    #[tokio::test]
    async fn find_excludes_migrated_rows_by_default() {
        let store = MemoryStore::new();
        let mut migrated = doc("A");
        migrated.insert("is_migrated".into(), Value::Bool(true));
        store.seed("c", vec![migrated, doc("B")]).await;

        let result = store.find("c", &[], None, 50, false).await.unwrap();
        assert_eq!(result.documents.len(), 1);
        assert_eq!(model::value::document_id(&result.documents[0]), Some("B"));
    }

    #[tokio::test]
    async fn find_all_ignores_is_migrated_filter() {
        let store = MemoryStore::new();
        let mut migrated = doc("A");
        migrated.insert("is_migrated".into(), Value::Bool(true));
        store.seed("c", vec![migrated, doc("B")]).await;

        let result = store.find("c", &[], None, 50, true).await.unwrap();
        assert_eq!(result.documents.len(), 2);
    }

    #[tokio::test]
    async fn batch_write_partial_failure_reports_cancelled_split() {
        let store = MemoryStore::new();
        store.inject_partial_failure(1);

        let err = store
            .batch_write("c", vec![doc("A"), doc("B"), doc("C")])
            .await
            .unwrap_err();

        match err {
            StoreError::InsertionWasCancelled {
                inserted_documents,
                cancelled_documents,
                ..
            } => {
                assert_eq!(inserted_documents.len(), 1);
                assert_eq!(cancelled_documents.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(store.get("c", "A").await.is_some());
        assert!(store.get("c", "B").await.is_none());
    }
}
