use crate::plan::DocumentPlan;
use serde::{Deserialize, Serialize};

/// Which concrete store adapter a `DbConfig` should be resolved to. A
/// tagged-variant selector, not runtime inheritance — the CLI matches on
/// this to construct the right adapter (design note §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbDriver {
    DynamoDb,
    MongoDb,
    /// In-process store used for tests and dry runs.
    Memory,
}

/// Connection configuration for one of the three stores (source,
/// destination, internal). Configuration loading itself is out of scope
/// (spec §1); this is the static input structure the engine's caller
/// constructs from environment variables and flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub driver: DbDriver,
    pub connection_string: String,
    pub database_name: Option<String>,
    /// DynamoDB-shaped adapters read this as the AWS region; ignored by
    /// other drivers.
    pub region: Option<String>,
    pub batch_size: usize,
}

impl DbConfig {
    pub fn new(driver: DbDriver, connection_string: impl Into<String>, batch_size: usize) -> Self {
        DbConfig {
            driver,
            connection_string: connection_string.into(),
            database_name: None,
            region: None,
            batch_size,
        }
    }

    pub fn with_database(mut self, database_name: impl Into<String>) -> Self {
        self.database_name = Some(database_name.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// The pre-expanded input the engine consumes at startup (spec §1: "the
/// engine consumes a pre-expanded ordered list of `DocumentPlan`s").
/// Configuration loading itself — hierarchical/flat enumeration, the
/// `PROJECT_ID` templating of collection names — happens upstream; this
/// struct is the already-validated result the CLI deserializes from a
/// config file and patches with environment-provided connection strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub source: DbConfig,
    pub destination: DbConfig,
    pub internal: DbConfig,
    pub plans: Vec<DocumentPlan>,
}

impl MigrationConfig {
    /// Overrides each store's connection string with the corresponding
    /// environment value when one is present, matching spec §6's
    /// `DEST_CONN_STR`/`INT_CONN_STR` (plus the supplemented
    /// `SRC_CONN_STR`) taking precedence over whatever the config file
    /// shipped with.
    pub fn apply_env_overrides(
        &mut self,
        src_conn_str: Option<&str>,
        dest_conn_str: Option<&str>,
        int_conn_str: Option<&str>,
    ) {
        if let Some(v) = src_conn_str {
            self.source.connection_string = v.to_string();
        }
        if let Some(v) = dest_conn_str {
            self.destination.connection_string = v.to_string();
        }
        if let Some(v) = int_conn_str {
            self.internal.connection_string = v.to_string();
        }
    }
}
