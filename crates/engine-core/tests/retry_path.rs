//! Covers spec §8 scenario 4: a destination that acknowledges only part of
//! a batch *without* raising `InsertionWasCancelled` (no exception, just an
//! incomplete `accepted_ids`). `MemoryStore`'s `batch_write` always either
//! accepts a whole batch or raises a cancellation, so this scenario needs a
//! dedicated double that models "accepted some, said nothing about the
//! rest" — exactly the case `BatchBuffer::reconcile_after_write` exists for.

use async_trait::async_trait;
use engine_core::{MigrationEngine, retry::NullClock};
use model::{Cursor, Document, DocumentPlan, FieldQuery, Value};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use store::{ReadResult, Store, StoreError, WriteResult};
use tokio::sync::Mutex;

fn row(id: &str) -> Document {
    let mut d = Document::new();
    d.insert("id".into(), Value::String(id.into()));
    d
}

/// Source double: returns a fixed set of rows once, then reports
/// exhaustion.
struct OneShotSource {
    rows: Mutex<Option<Vec<Document>>>,
}

#[async_trait]
impl Store for OneShotSource {
    async fn find(
        &self,
        _collection: &str,
        _queries: &[model::FieldQuery],
        _index_name: Option<&str>,
        _batch_size: usize,
        _find_all: bool,
    ) -> Result<ReadResult, StoreError> {
        let mut guard = self.rows.lock().await;
        let documents = guard.take().unwrap_or_default();
        Ok(ReadResult {
            documents,
            has_more: false,
            cursor: None,
        })
    }

    async fn set_last_document(&self, _cursor: Option<Cursor>) {}

    async fn last_fetched_key(&self) -> Option<Cursor> {
        None
    }

    async fn batch_write(&self, _collection: &str, _documents: Vec<Document>) -> Result<WriteResult, StoreError> {
        unreachable!("source store is never written to")
    }

    async fn batch_update(&self, _collection: &str, _updates: Vec<Document>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn update(&self, _collection: &str, _single: Document) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_document(&self, _collection: &str, _id: &str) -> Result<Option<Document>, StoreError> {
        Ok(None)
    }
}

/// Destination double: on the first `batch_write`, silently drops `B`
/// (accepted_ids = [A]) with no exception. On every subsequent call it
/// accepts everything it's handed.
struct FlakyDestination {
    calls: AtomicUsize,
    accepted: Mutex<Vec<Document>>,
}

#[async_trait]
impl Store for FlakyDestination {
    async fn find(
        &self,
        _collection: &str,
        _queries: &[model::FieldQuery],
        _index_name: Option<&str>,
        _batch_size: usize,
        _find_all: bool,
    ) -> Result<ReadResult, StoreError> {
        Ok(ReadResult::default())
    }

    async fn set_last_document(&self, _cursor: Option<Cursor>) {}

    async fn last_fetched_key(&self) -> Option<Cursor> {
        None
    }

    async fn batch_write(&self, _collection: &str, documents: Vec<Document>) -> Result<WriteResult, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        let accepted: Vec<Document> = if call == 0 {
            documents
                .into_iter()
                .filter(|d| model::value::document_id(d) == Some("A"))
                .collect()
        } else {
            documents
        };

        let accepted_ids: Vec<String> = accepted
            .iter()
            .filter_map(|d| model::value::document_id(d).map(str::to_string))
            .collect();

        self.accepted.lock().await.extend(accepted.into_iter());

        Ok(WriteResult {
            processed_count: accepted_ids.len(),
            accepted_ids,
        })
    }

    async fn batch_update(&self, _collection: &str, _updates: Vec<Document>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn update(&self, _collection: &str, _single: Document) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_document(&self, _collection: &str, _id: &str) -> Result<Option<Document>, StoreError> {
        Ok(None)
    }
}

#[tokio::test]
async fn retry_reconciles_an_unacknowledged_id_without_an_exception() {
    let source = Arc::new(OneShotSource {
        rows: Mutex::new(Some(vec![row("A"), row("B")])),
    });
    let destination = Arc::new(FlakyDestination {
        calls: AtomicUsize::new(0),
        accepted: Mutex::new(Vec::new()),
    });
    let internal = Arc::new(store::MemoryStore::new());

    let plan = DocumentPlan::new("t", "c", vec![] as Vec<FieldQuery>, 50);
    let mut engine = MigrationEngine::new(source, destination.clone(), internal, vec![plan])
        .with_clock(Arc::new(NullClock));

    engine.migrate(false, false).await;

    let accepted = destination.accepted.lock().await;
    let ids: Vec<&str> = accepted.iter().filter_map(|d| model::value::document_id(d)).collect();
    assert!(ids.contains(&"A"));
    assert!(ids.contains(&"B"), "B should have been accepted on the retry attempt");
    assert_eq!(destination.calls.load(Ordering::SeqCst), 2, "exactly one retry attempt was needed");
}
