use crate::error::StoreError;
use async_trait::async_trait;
use model::{Cursor, Document, FieldQuery};

/// Result of a `Store::find` call: up to `batch_size` matching documents,
/// whether a cursor remains, and the cursor itself (opaque to the caller).
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    pub documents: Vec<Document>,
    pub has_more: bool,
    pub cursor: Option<Cursor>,
}

/// Result of a `Store::batch_write` call. `accepted_ids` is the set of ids
/// the destination durably upserted or matched — canonical over any
/// adapter-reported `processed_count` when the two disagree (spec §9 open
/// question, resolved in DESIGN.md).
#[derive(Debug, Clone, Default)]
pub struct WriteResult {
    pub accepted_ids: Vec<String>,
    pub processed_count: usize,
}

/// Uniform batched I/O over a document store. One trait, three concrete
/// realizations in this crate (`dynamo`, `mongo`, `memory`) selected at
/// configuration time by a tagged `DbDriver`, not by runtime inheritance
/// (design note §9).
///
/// All three of the engine's stores (source, destination, internal) are
/// `Store`s — the same MongoDB-shaped adapter commonly backs both the
/// destination and the internal store, pointed at different
/// databases/collections, mirroring how the originating tool's internal
/// client was itself a generic document-store client.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns up to `batch_size` matching documents. When `find_all` is
    /// false, the adapter additionally constrains the result to documents
    /// whose `is_migrated` field is not `true`. When `index_name` is set,
    /// `queries` are evaluated as an index range condition; otherwise as a
    /// post-scan filter. Paginates internally until `batch_size` rows are
    /// collected or the store signals exhaustion, whichever comes first.
    async fn find(
        &self,
        collection: &str,
        queries: &[FieldQuery],
        index_name: Option<&str>,
        batch_size: usize,
        find_all: bool,
    ) -> Result<ReadResult, StoreError>;

    /// Supplies a cursor (possibly none) for the next `find` call.
    async fn set_last_document(&self, cursor: Option<Cursor>);

    /// The most recent cursor this adapter observed, if any.
    async fn last_fetched_key(&self) -> Option<Cursor>;

    /// Idempotent upsert of a batch keyed by `id`. On partial failure,
    /// returns `Err(StoreError::InsertionWasCancelled { .. })` — the split
    /// point is the adapter's best knowledge of how many writes succeeded
    /// before the remainder failed.
    async fn batch_write(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<WriteResult, StoreError>;

    /// Applies `{id, field: value, …}` updates to existing rows. Adapters
    /// that cap batch size internally partition and retry transient
    /// per-partition failures per spec §4.4.
    async fn batch_update(&self, collection: &str, updates: Vec<Document>)
    -> Result<(), StoreError>;

    /// Single-row upsert keyed by `id`/the adapter's primary-key field.
    async fn update(&self, collection: &str, single: Document) -> Result<(), StoreError>;

    /// Single-row read by primary key; `None` if absent.
    async fn find_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;
}
