use crate::query::FieldQuery;
use serde::{Deserialize, Serialize};

/// Declares that a plan depends on another plan having already run. Used
/// only for ordering at configuration-expansion time; the engine never
/// joins against it at runtime (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedDocument {
    pub doc_type: String,
    pub relation_field: String,
}

/// One migration unit: a source collection, the queries that select its
/// rows, the destination collection they land in, and the plan's mutable
/// progress within the current run.
///
/// `DocumentPlan`s are produced upstream by a configuration expander (out
/// of scope here, per spec §1) as an already-ordered list; the engine only
/// ever advances through them in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPlan {
    pub plan_type: String,
    /// Logical collection name, undecorated.
    pub collection_name: String,
    pub source_collection_name: String,
    pub destination_collection_name: String,
    pub queries: Vec<FieldQuery>,
    pub query_index_name: Option<String>,
    pub related_document: Option<RelatedDocument>,
    pub batch_size: usize,

    pub all_fetched: bool,
    pub all_inserted: bool,
    pub num_migrated: u64,
}

impl DocumentPlan {
    pub fn new(
        plan_type: impl Into<String>,
        collection_name: impl Into<String>,
        queries: Vec<FieldQuery>,
        batch_size: usize,
    ) -> Self {
        let collection_name = collection_name.into();
        DocumentPlan {
            plan_type: plan_type.into(),
            source_collection_name: collection_name.clone(),
            destination_collection_name: collection_name.clone(),
            collection_name,
            queries,
            query_index_name: None,
            related_document: None,
            batch_size,
            all_fetched: false,
            all_inserted: true,
            num_migrated: 0,
        }
    }

    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.query_index_name = Some(index_name.into());
        self
    }

    pub fn with_collection_names(
        mut self,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        self.source_collection_name = source.into();
        self.destination_collection_name = destination.into();
        self
    }

    pub fn with_related_document(mut self, related: RelatedDocument) -> Self {
        self.related_document = Some(related);
        self
    }

    /// A plan that selects exactly one document by primary key.
    pub fn find_one(&self) -> bool {
        self.queries.len() == 1 && self.queries[0].field_name == "id"
    }
}

/// Decorates a logical collection name with a per-direction prefix/suffix,
/// e.g. turning `"users"` into `"legacy_users"` for the source side and
/// `"users_v2"` for the destination side. Configuration expanders call this
/// when building `DocumentPlan::source_collection_name` /
/// `destination_collection_name`; the engine itself never decorates names.
pub fn decorate_collection_name(name: &str, prefix: &str, suffix: &str) -> String {
    format!("{prefix}{name}{suffix}")
}
