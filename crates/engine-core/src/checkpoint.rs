use model::{Cursor, Document, Value};
use std::sync::Arc;
use store::{Store, StoreError};

const LAST_EVALUATED_KEY_ID: &str = "LastEvaluatedKey";

/// Persists the pagination cursor and cancellation log for each source
/// collection into the internal store. Unlike the originating tool's
/// WAL/sled-backed state store, the internal store here is just another
/// `Store` — in practice the same document-store adapter that backs the
/// destination, pointed at a different database.
pub struct CheckpointStore {
    internal: Arc<dyn Store>,
}

impl CheckpointStore {
    pub fn new(internal: Arc<dyn Store>) -> Self {
        CheckpointStore { internal }
    }

    /// Reads back the cursor document keyed `"LastEvaluatedKey"` for
    /// `collection`, stripping the synthetic `id` field.
    pub async fn load_cursor(&self, collection: &str) -> Result<Option<Cursor>, StoreError> {
        let Some(mut doc) = self
            .internal
            .find_document(collection, LAST_EVALUATED_KEY_ID)
            .await?
        else {
            return Ok(None);
        };

        doc.remove("id");
        if doc.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Cursor::from_map(doc)))
        }
    }

    /// Upserts the cursor document for `collection`.
    pub async fn save_cursor(&self, collection: &str, cursor: &Cursor) -> Result<(), StoreError> {
        let mut doc: Document = cursor.as_map().clone();
        doc.insert("id".to_string(), Value::String(LAST_EVALUATED_KEY_ID.to_string()));
        self.internal.update(collection, doc).await
    }

    /// Records documents a destination bulk write rejected. A partial
    /// failure writing the cancellation log itself is swallowed — the
    /// cancelled rows were never marked `is_migrated`, so they are
    /// re-attempted on the next run regardless (spec §7).
    pub async fn log_cancelled(
        &self,
        collection: &str,
        plan_type: &str,
        cancelled: &[Document],
        exception_details: &str,
    ) -> Result<(), StoreError> {
        if cancelled.is_empty() {
            return Ok(());
        }

        let rows: Vec<Document> = cancelled
            .iter()
            .filter_map(model::value::document_id)
            .map(|id| cancellation_row(id, plan_type, exception_details))
            .collect();

        match self.internal.batch_write(collection, rows).await {
            Ok(_) => Ok(()),
            Err(StoreError::InsertionWasCancelled { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn cancellation_row(id: &str, plan_type: &str, exception_details: &str) -> Document {
    let mut row = Document::new();
    row.insert("id".into(), Value::String(id.to_string()));
    row.insert("type".into(), Value::String(plan_type.to_string()));
    row.insert("migration_status".into(), Value::String("cancelled".to_string()));
    row.insert("exception_info".into(), Value::String(exception_details.to_string()));
    row
}
