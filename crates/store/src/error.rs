use model::Document;
use thiserror::Error;

/// Whether a caught error should be retried or treated as fatal for the
/// current operation. Store adapters classify their own errors through
/// `StoreError::disposition`; the retry policy in `engine-core` never
/// inspects adapter internals to make this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Error taxonomy a `Store` adapter must produce (spec §4.2, §7).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient network/throttling error on a read. Retried by the engine
    /// up to three times with linear backoff before escalating to
    /// `FetchingTerminated`.
    #[error("retryable fetch error on {collection}: {message}")]
    RetryableFetching { collection: String, message: String },

    /// Non-retryable, or retries on a fetch were exhausted.
    #[error("fetching terminated on {collection}: {message}")]
    FetchingTerminated { collection: String, message: String },

    /// A bulk write accepted some documents and rejected others. The split
    /// point is the adapter's best knowledge of how many writes succeeded
    /// before the remainder failed.
    #[error("insertion cancelled on {collection}: {} accepted, {} cancelled ({exception_details})", inserted_documents.len(), cancelled_documents.len())]
    InsertionWasCancelled {
        collection: String,
        cancelled_documents: Vec<Document>,
        inserted_documents: Vec<Document>,
        exception_details: String,
    },

    /// A transactional batch update failed for a reason that is not a
    /// validation error — retried per spec §4.4, logged on exhaustion.
    #[error("transactional update failed on {collection}: {message}")]
    TransactionalUpdate { collection: String, message: String },

    /// A transactional batch update failed validation — fatal for the
    /// partition, never retried.
    #[error("transactional update rejected on {collection}: {message}")]
    ValidationFailed { collection: String, message: String },

    /// The requested database/driver combination is not supported.
    #[error("unknown database driver: {0}")]
    UnknownDatabase(String),

    /// A required configuration parameter (connection string, database
    /// name, …) was missing at adapter-construction time.
    #[error("missing required configuration parameter: {0}")]
    MissingRequiredConfigurationParam(String),
}

impl StoreError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            StoreError::RetryableFetching { .. } => RetryDisposition::Retry,
            StoreError::TransactionalUpdate { .. } => RetryDisposition::Retry,
            StoreError::FetchingTerminated { .. }
            | StoreError::InsertionWasCancelled { .. }
            | StoreError::ValidationFailed { .. }
            | StoreError::UnknownDatabase(_)
            | StoreError::MissingRequiredConfigurationParam(_) => RetryDisposition::Stop,
        }
    }

    pub fn collection(&self) -> Option<&str> {
        match self {
            StoreError::RetryableFetching { collection, .. }
            | StoreError::FetchingTerminated { collection, .. }
            | StoreError::InsertionWasCancelled { collection, .. }
            | StoreError::TransactionalUpdate { collection, .. }
            | StoreError::ValidationFailed { collection, .. } => Some(collection),
            StoreError::UnknownDatabase(_) | StoreError::MissingRequiredConfigurationParam(_) => {
                None
            }
        }
    }
}
