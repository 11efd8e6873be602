use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Comparison operator for a single `FieldQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A single AND-combined predicate: `field_name <operation> value`. A
/// `DocumentPlan`'s `queries` list is evaluated as an index condition when
/// `query_index_name` is set, or as a post-scan filter otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    pub field_name: String,
    pub operation: QueryOp,
    pub value: Value,
}

impl FieldQuery {
    pub fn eq(field_name: impl Into<String>, value: Value) -> Self {
        FieldQuery {
            field_name: field_name.into(),
            operation: QueryOp::Eq,
            value,
        }
    }
}
