use crate::{
    buffer::BatchBuffer,
    checkpoint::CheckpointStore,
    metrics::Metrics,
    retry::{Clock, LinearBackoff, RealClock},
    sequencer::PlanSequencer,
};
use model::{Document, DocumentPlan, Value};
use std::sync::Arc;
use store::{ReadResult, Store, StoreError};
use tracing::{error, info, warn};

/// Drives the fetch → upsert → mark → checkpoint loop over an ordered list
/// of plans. Construction takes the three stores (source, destination,
/// internal) and the plan list; `migrate` runs to completion and never
/// returns an error — partial failures degrade to "retried on the next
/// run" and are only observable through logs and the internal store's
/// cancellation log (spec §4.1, §7).
pub struct MigrationEngine {
    source: Arc<dyn Store>,
    destination: Arc<dyn Store>,
    checkpoints: CheckpointStore,
    sequencer: PlanSequencer,
    buffer: BatchBuffer,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl MigrationEngine {
    pub fn new(
        source: Arc<dyn Store>,
        destination: Arc<dyn Store>,
        internal: Arc<dyn Store>,
        plans: Vec<DocumentPlan>,
    ) -> Self {
        MigrationEngine {
            source,
            destination,
            checkpoints: CheckpointStore::new(internal),
            sequencer: PlanSequencer::new(plans),
            buffer: BatchBuffer::new(),
            clock: Arc::new(RealClock),
            metrics: Metrics::new(),
        }
    }

    /// Swaps in a test clock so retry-path tests don't sit through the
    /// literal 120s/240s/360s waits.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn plans(&self) -> &[DocumentPlan] {
        self.sequencer.plans()
    }

    fn current(&self) -> Option<&DocumentPlan> {
        self.sequencer.current()
    }

    fn current_mut(&mut self) -> Option<&mut DocumentPlan> {
        self.sequencer.current_mut()
    }

    pub async fn migrate(&mut self, reset: bool, force: bool) {
        self.fetch(reset || force).await;

        while self.current().is_some() {
            if reset {
                info!("initiating reset of migration");
                self.reset_current_plan().await;
                self.fetch(true).await;
            } else {
                info!("initiating migration operation");
                self.insert_fetch_update_cycle(force).await;
            }
        }
    }

    async fn insert_fetch_update_cycle(&mut self, force: bool) {
        if self.buffer.has_data() {
            // Captured before `fetch`: on a plan's final non-empty batch,
            // `fetch` advances the sequencer past this plan as soon as it
            // sees `all_fetched` already set. Marking must still land on
            // *this* plan's source collection, not whatever the sequencer
            // points at afterwards (mirrors `migration_controller.py`
            // capturing `curr_collection_name` before the equivalent
            // fetch call).
            let Some(plan) = self.current().cloned() else {
                return;
            };
            let plan_index = self.sequencer.current_index();

            let accepted_ids = self.insert().await;

            // Fetch is kept synchronous with mark: overlapping the next
            // fetch with this cycle's mark would let a just-marked row
            // fall out of the `is_migrated ≠ true` filter mid-page and
            // invalidate the cursor (spec §4.1, §9).
            self.fetch(force).await;
            self.mark_migrated(&plan.source_collection_name, plan_index, &accepted_ids)
                .await;
        } else if self.current().is_some() {
            self.fetch(force).await;
        }
    }

    /// Promotes buffered documents to transit, writes them to the
    /// destination, and retries unacknowledged ids. Returns the ids the
    /// destination ultimately accepted.
    async fn insert(&mut self) -> Vec<String> {
        let Some(plan) = self.current().cloned() else {
            return Vec::new();
        };

        self.buffer.promote();
        let transit = self.buffer.transit().to_vec();

        match self
            .destination
            .batch_write(&plan.destination_collection_name, transit)
            .await
        {
            Ok(result) => {
                self.buffer.reconcile_after_write(&result.accepted_ids);
                self.retry_insert(&plan).await;
                result.accepted_ids
            }
            Err(StoreError::InsertionWasCancelled {
                cancelled_documents,
                inserted_documents,
                exception_details,
                ..
            }) => {
                if let Err(err) = self
                    .checkpoints
                    .log_cancelled(
                        &plan.collection_name,
                        &plan.plan_type,
                        &cancelled_documents,
                        &exception_details,
                    )
                    .await
                {
                    error!(collection = %plan.collection_name, error = %err, "failed to write cancellation log");
                }
                self.buffer.empty();
                inserted_documents
                    .iter()
                    .filter_map(model::value::document_id)
                    .map(str::to_string)
                    .collect()
            }
            Err(err) => {
                error!(collection = %plan.destination_collection_name, error = %err, "destination batch_write failed");
                self.buffer.empty();
                Vec::new()
            }
        }
    }

    async fn retry_insert(&mut self, plan: &DocumentPlan) {
        let backoff = LinearBackoff::WRITE;
        let mut attempt = 1;

        while self.buffer.needs_retry() && attempt <= backoff.max_attempts {
            info!(
                items = self.buffer.retry_bucket().len(),
                attempt, "retrying destination write"
            );
            self.clock.sleep(backoff.delay_for_attempt(attempt)).await;

            let retry_batch = self.buffer.retry_bucket().to_vec();
            match self
                .destination
                .batch_write(&plan.destination_collection_name, retry_batch)
                .await
            {
                Ok(result) => self.buffer.reconcile_after_retry(&result.accepted_ids),
                Err(StoreError::InsertionWasCancelled {
                    inserted_documents, ..
                }) => {
                    let accepted: Vec<String> = inserted_documents
                        .iter()
                        .filter_map(model::value::document_id)
                        .map(str::to_string)
                        .collect();
                    self.buffer.reconcile_after_retry(&accepted);
                }
                Err(err) => {
                    warn!(error = %err, attempt, "retry write attempt failed");
                }
            }

            attempt += 1;
        }
    }

    async fn mark_migrated(
        &mut self,
        source_collection_name: &str,
        plan_index: Option<usize>,
        accepted_ids: &[String],
    ) {
        if accepted_ids.is_empty() {
            return;
        }

        let updates = accepted_ids.iter().map(|id| migration_mark(id, true)).collect();
        match self.source.batch_update(source_collection_name, updates).await {
            Ok(()) => {
                if let Some(plan) = plan_index.and_then(|index| self.sequencer.plan_mut(index)) {
                    plan.num_migrated += accepted_ids.len() as u64;
                }
            }
            Err(err) => {
                error!(collection = %source_collection_name, error = %err, "failed to mark source rows migrated");
            }
        }
    }

    /// Reset mode: marks every buffered row `is_migrated=false` on the
    /// source and skips the destination write entirely.
    async fn reset_current_plan(&mut self) {
        let Some(plan) = self.current().cloned() else {
            return;
        };

        self.buffer.promote();
        let id_list: Vec<String> = self
            .buffer
            .transit()
            .iter()
            .filter_map(model::value::document_id)
            .map(str::to_string)
            .collect();
        self.buffer.empty();

        if id_list.is_empty() {
            return;
        }

        let updates = id_list.iter().map(|id| migration_mark(id, false)).collect();
        if let Err(err) = self.source.batch_update(&plan.source_collection_name, updates).await {
            error!(collection = %plan.source_collection_name, error = %err, "failed to reset source migration marks");
        }
    }

    /// Fetches one batch for the current plan. Advances to the next plan
    /// when the current one was already marked `all_fetched`; persists the
    /// returned cursor; retries transient fetch errors per §4.4.
    async fn fetch(&mut self, find_all: bool) {
        if self.current().map(|p| p.all_fetched).unwrap_or(false) {
            self.sequencer.advance();
        }

        let Some(plan) = self.current().cloned() else {
            return;
        };

        if self.source.last_fetched_key().await.is_none() && !plan.all_fetched {
            match self.checkpoints.load_cursor(&plan.collection_name).await {
                Ok(Some(cursor)) => self.source.set_last_document(Some(cursor)).await,
                Ok(None) => {}
                Err(err) => {
                    warn!(collection = %plan.collection_name, error = %err, "failed to load checkpoint cursor");
                }
            }
        }

        let result = match self.find_current(&plan, find_all).await {
            Ok(result) => result,
            Err(StoreError::RetryableFetching { .. }) => match self.retry_fetch(&plan, find_all).await {
                Some(result) => result,
                None => {
                    warn!(collection = %plan.source_collection_name, "fetching terminated after exhausting retries, skipping plan");
                    if let Some(current) = self.current_mut() {
                        current.all_fetched = true;
                    }
                    return;
                }
            },
            Err(err) => {
                error!(collection = %plan.source_collection_name, error = %err, "fetch failed, skipping plan");
                if let Some(current) = self.current_mut() {
                    current.all_fetched = true;
                }
                return;
            }
        };

        self.metrics.increment_records(result.documents.len() as u64).await;
        self.buffer.add(result.documents);

        if let Some(current) = self.current_mut() {
            current.all_fetched = !result.has_more;
        }

        if let Some(cursor) = &result.cursor
            && let Err(err) = self.checkpoints.save_cursor(&plan.collection_name, cursor).await
        {
            error!(collection = %plan.collection_name, error = %err, "failed to persist checkpoint cursor");
        }
    }

    async fn find_current(
        &self,
        plan: &DocumentPlan,
        find_all: bool,
    ) -> Result<ReadResult, StoreError> {
        self.source
            .find(
                &plan.source_collection_name,
                &plan.queries,
                plan.query_index_name.as_deref(),
                plan.batch_size,
                find_all,
            )
            .await
    }

    async fn retry_fetch(&self, plan: &DocumentPlan, find_all: bool) -> Option<ReadResult> {
        let backoff = LinearBackoff::FETCH;
        for attempt in 1..=backoff.max_attempts {
            info!(attempt, "retrying fetch operation with delay");
            self.clock.sleep(backoff.delay_for_attempt(attempt)).await;

            match self.find_current(plan, find_all).await {
                Ok(result) => return Some(result),
                Err(StoreError::RetryableFetching { .. }) => continue,
                Err(_) => return None,
            }
        }
        None
    }
}

fn migration_mark(id: &str, is_migrated: bool) -> Document {
    let mut row = Document::new();
    row.insert("id".into(), Value::String(id.to_string()));
    row.insert("is_migrated".into(), Value::Bool(is_migrated));
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::NullClock;
    use model::{FieldQuery, Value};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use store::MemoryStore;

    fn engine(
        source: Arc<MemoryStore>,
        destination: Arc<MemoryStore>,
        internal: Arc<MemoryStore>,
        plans: Vec<DocumentPlan>,
    ) -> MigrationEngine {
        MigrationEngine::new(source, destination, internal, plans).with_clock(Arc::new(NullClock))
    }

    fn row(id: &str, v: i64) -> Document {
        let mut d = Document::new();
        d.insert("id".into(), Value::String(id.into()));
        d.insert("v".into(), Value::Number(Decimal::from(v)));
        d
    }

    #[tokio::test]
    async fn single_batch_happy_path_marks_source_and_writes_destination() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        let internal = Arc::new(MemoryStore::new());
        source.seed("c", vec![row("X", 1)]).await;

        let plan = DocumentPlan::new("t", "c", vec![FieldQuery::eq("id", Value::String("X".into()))], 50);
        let mut engine = engine(source.clone(), destination.clone(), internal, vec![plan]);

        engine.migrate(false, false).await;

        let written = destination.get("c", "X").await.unwrap();
        assert_eq!(written.get("v").and_then(Value::as_number).copied(), Some(Decimal::from(1)));

        let source_row = source.get("c", "X").await.unwrap();
        assert_eq!(source_row.get("is_migrated"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn decimal_preservation_round_trips_exact_value() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        let internal = Arc::new(MemoryStore::new());

        let mut doc = Document::new();
        doc.insert("id".into(), Value::String("D".into()));
        doc.insert(
            "amount".into(),
            Value::Number(Decimal::from_str("1.2300000000000001").unwrap()),
        );
        source.seed("c", vec![doc]).await;

        let plan = DocumentPlan::new("t", "c", vec![FieldQuery::eq("id", Value::String("D".into()))], 50);
        let mut engine = engine(source, destination.clone(), internal, vec![plan]);
        engine.migrate(false, false).await;

        let written = destination.get("c", "D").await.unwrap();
        assert_eq!(
            written.get("amount").and_then(Value::as_number).unwrap().to_string(),
            "1.2300000000000001"
        );
    }

    #[tokio::test]
    async fn partial_failure_marks_only_accepted_ids_and_logs_cancellation() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        let internal = Arc::new(MemoryStore::new());
        source.seed("c", vec![row("A", 1), row("B", 2), row("C", 3)]).await;
        destination.inject_partial_failure(1);

        let plan = DocumentPlan::new("t", "c", vec![], 50);
        let mut engine = engine(source.clone(), destination.clone(), internal.clone(), vec![plan]);
        engine.migrate(false, false).await;

        assert!(destination.get("c", "A").await.is_some());
        assert!(destination.get("c", "B").await.is_none());

        let source_a = source.get("c", "A").await.unwrap();
        assert_eq!(source_a.get("is_migrated"), Some(&Value::Bool(true)));
        let source_b = source.get("c", "B").await.unwrap();
        assert_ne!(source_b.get("is_migrated"), Some(&Value::Bool(true)));

        let cancelled = internal.all("c").await;
        assert_eq!(cancelled.len(), 2);
    }

    #[tokio::test]
    async fn reset_mode_clears_migrated_flag_without_writing_destination() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        let internal = Arc::new(MemoryStore::new());
        let mut migrated = row("X", 1);
        migrated.insert("is_migrated".into(), Value::Bool(true));
        source.seed("c", vec![migrated]).await;

        let plan = DocumentPlan::new("t", "c", vec![], 50);
        let mut engine = engine(source.clone(), destination.clone(), internal, vec![plan]);
        engine.migrate(true, false).await;

        assert!(destination.get("c", "X").await.is_none());
        let source_row = source.get("c", "X").await.unwrap();
        assert_eq!(source_row.get("is_migrated"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn second_run_with_no_source_changes_writes_nothing() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        let internal = Arc::new(MemoryStore::new());
        source.seed("c", vec![row("X", 1)]).await;

        let plan = DocumentPlan::new("t", "c", vec![], 50);
        let mut engine = engine(source.clone(), destination.clone(), internal.clone(), vec![plan.clone()]);
        engine.migrate(false, false).await;

        let mut engine2 = engine(source.clone(), destination.clone(), internal, vec![plan]);
        engine2.migrate(false, false).await;

        assert_eq!(destination.all("c").await.len(), 1);
    }

    #[tokio::test]
    async fn multi_plan_sequencing_does_not_fetch_second_plan_before_first_exhausted() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        let internal = Arc::new(MemoryStore::new());

        let p1_rows: Vec<Document> = (0..120).map(|i| row(&format!("p1-{i:03}"), i)).collect();
        source.seed("c1", p1_rows).await;
        source.seed("c2", vec![row("p2-0", 0)]).await;

        let plan1 = DocumentPlan::new("t", "c1", vec![], 50);
        let plan2 = DocumentPlan::new("t", "c2", vec![], 50);
        let mut engine = engine(source.clone(), destination.clone(), internal, vec![plan1, plan2]);
        engine.migrate(false, false).await;

        assert_eq!(destination.all("c1").await.len(), 120);
        assert_eq!(destination.all("c2").await.len(), 1);
    }

    #[tokio::test]
    async fn empty_plan_queue_completes_immediately() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        let internal = Arc::new(MemoryStore::new());
        let mut engine = engine(source, destination, internal, vec![]);
        engine.migrate(false, false).await;
    }
}
