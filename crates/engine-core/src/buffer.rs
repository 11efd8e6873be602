use model::{Document, value};

/// Three-stage document buffer: documents arrive into `primary`, get
/// promoted to `transit` for a destination write, and unacknowledged ids
/// fall through to `retry`. Mirrors `ContainerManager` in the originating
/// tool, with `reconcile_after_retry` checked against the retry bucket
/// itself rather than the (by-then-emptied) transit bucket.
#[derive(Debug, Clone, Default)]
pub struct BatchBuffer {
    primary: Vec<Document>,
    transit: Vec<Document>,
    retry: Vec<Document>,
    new_arrival: bool,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep-copies every document through a lossless serialization
    /// round-trip before buffering it, detaching it from whatever
    /// adapter-owned state it arrived in.
    pub fn add(&mut self, documents: Vec<Document>) {
        self.new_arrival = !documents.is_empty();
        self.primary
            .extend(documents.iter().map(value::deep_clone_document));
    }

    pub fn promote(&mut self) {
        self.transit.append(&mut self.primary);
    }

    pub fn transit(&self) -> &[Document] {
        &self.transit
    }

    pub fn retry_bucket(&self) -> &[Document] {
        &self.retry
    }

    pub fn reconcile_after_write(&mut self, accepted_ids: &[String]) {
        self.retry = std::mem::take(&mut self.transit)
            .into_iter()
            .filter(|doc| !id_in(doc, accepted_ids))
            .collect();
    }

    pub fn reconcile_after_retry(&mut self, accepted_ids: &[String]) {
        self.retry.retain(|doc| !id_in(doc, accepted_ids));
    }

    pub fn empty(&mut self) {
        self.primary.clear();
        self.transit.clear();
        self.retry.clear();
    }

    pub fn has_data(&self) -> bool {
        !self.primary.is_empty()
    }

    pub fn needs_retry(&self) -> bool {
        !self.retry.is_empty()
    }

    pub fn new_arrival(&self) -> bool {
        self.new_arrival
    }

    /// No document's id may appear in more than one bucket at once. Checked
    /// in tests, not on every mutation — the transitions above are the only
    /// way ids move between buckets and each preserves it by construction.
    #[cfg(test)]
    fn disjoint_by_id(&self) -> bool {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for doc in self.primary.iter().chain(&self.transit).chain(&self.retry) {
            if let Some(id) = value::document_id(doc)
                && !seen.insert(id)
            {
                return false;
            }
        }
        true
    }
}

fn id_in(doc: &Document, ids: &[String]) -> bool {
    value::document_id(doc)
        .map(|id| ids.iter().any(|a| a == id))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::Value;

    fn doc(id: &str) -> Document {
        let mut d = Document::new();
        d.insert("id".into(), Value::String(id.into()));
        d
    }

    #[test]
    fn add_then_promote_moves_everything_to_transit() {
        let mut buf = BatchBuffer::new();
        buf.add(vec![doc("A"), doc("B")]);
        assert!(buf.has_data());
        assert!(buf.new_arrival());

        buf.promote();
        assert!(!buf.has_data());
        assert_eq!(buf.transit().len(), 2);
        assert!(buf.disjoint_by_id());
    }

    #[test]
    fn reconcile_after_write_moves_unacknowledged_ids_to_retry() {
        let mut buf = BatchBuffer::new();
        buf.add(vec![doc("A"), doc("B"), doc("C")]);
        buf.promote();

        buf.reconcile_after_write(&["A".to_string()]);

        assert!(buf.transit().is_empty());
        assert_eq!(buf.retry_bucket().len(), 2);
        assert!(buf.needs_retry());
        assert!(buf.disjoint_by_id());
    }

    #[test]
    fn reconcile_after_retry_drains_accepted_ids_from_retry_bucket() {
        let mut buf = BatchBuffer::new();
        buf.add(vec![doc("A"), doc("B")]);
        buf.promote();
        buf.reconcile_after_write(&[]);
        assert_eq!(buf.retry_bucket().len(), 2);

        buf.reconcile_after_retry(&["A".to_string()]);
        assert_eq!(buf.retry_bucket().len(), 1);
        assert_eq!(value::document_id(&buf.retry_bucket()[0]), Some("B"));

        buf.reconcile_after_retry(&["B".to_string()]);
        assert!(!buf.needs_retry());
    }

    #[test]
    fn empty_clears_every_bucket() {
        let mut buf = BatchBuffer::new();
        buf.add(vec![doc("A")]);
        buf.promote();
        buf.reconcile_after_write(&[]);
        buf.empty();
        assert!(!buf.has_data());
        assert!(!buf.needs_retry());
        assert!(buf.transit().is_empty());
    }
}
