use crate::error::CliError;
use model::{DbConfig, DbDriver};
use std::sync::Arc;
use store::{MemoryStore, Store};

/// Resolves a `DbConfig`'s tagged driver into a concrete `Store`
/// (design note §9: a tagged-variant selector at configuration time, not
/// runtime inheritance). `Memory` is the in-process test/dry-run adapter;
/// the CLI never constructs it against a real connection string.
pub async fn connect(config: &DbConfig) -> Result<Arc<dyn Store>, CliError> {
    match config.driver {
        DbDriver::DynamoDb => {
            let region = config.region.as_deref();
            let client = store::dynamo::connect(region).await;
            Ok(store::dynamo::store(client))
        }
        DbDriver::MongoDb => {
            let database = config.database_name.clone().ok_or_else(|| {
                CliError::Config("mongodb driver requires database_name".to_string())
            })?;
            let client = store::mongo::connect(&config.connection_string).await?;
            Ok(store::mongo::store(client, database))
        }
        DbDriver::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
