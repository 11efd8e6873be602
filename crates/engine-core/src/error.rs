use thiserror::Error;

/// Fatal, pre-run errors — client construction and configuration problems.
/// Nothing from inside the migration loop surfaces through this type: once
/// the three stores are constructed, `MigrationEngine::migrate` degrades
/// every failure to a log line and, where relevant, a cancellation-log
/// entry (spec §7).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown database driver: {0}")]
    UnknownDatabase(String),

    #[error("missing required configuration parameter: {0}")]
    MissingRequiredConfigurationParam(String),

    #[error("failed to construct store client: {0}")]
    ClientConstruction(String),
}

impl From<store::StoreError> for EngineError {
    fn from(err: store::StoreError) -> Self {
        match err {
            store::StoreError::UnknownDatabase(msg) => EngineError::UnknownDatabase(msg),
            store::StoreError::MissingRequiredConfigurationParam(msg) => {
                EngineError::MissingRequiredConfigurationParam(msg)
            }
            other => EngineError::ClientConstruction(other.to_string()),
        }
    }
}
