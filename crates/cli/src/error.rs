use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to serialize report to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("engine error: {0}")]
    Engine(#[from] engine_core::EngineError),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}
