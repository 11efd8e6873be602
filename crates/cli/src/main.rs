mod env;
mod error;
mod id_list;
mod output;
mod shutdown;
mod store_factory;

use clap::Parser;
use error::CliError;
use model::MigrationConfig;
use shutdown::{ExitCode, ShutdownCoordinator};
use std::path::PathBuf;
use tracing::{error, info};

/// Migrates a configured set of collections from a source document store
/// to a destination document store, recording per-document migration
/// marks back on the source and checkpointing pagination progress into a
/// third internal store (spec §1).
#[derive(Debug, Parser)]
#[command(name = "migration-engine", version)]
struct Cli {
    /// Path to the pre-expanded migration configuration (source/
    /// destination/internal `DbConfig` plus the ordered `DocumentPlan`
    /// list). Configuration expansion itself happens upstream of this
    /// binary (spec §1); this file is its already-validated output.
    #[arg(long)]
    config: PathBuf,

    /// Re-arm a previously completed migration: fetch without the
    /// `is_migrated ≠ true` filter and flip matched rows back to
    /// `is_migrated=false` without writing to the destination (spec §4.1).
    #[arg(long)]
    reset: bool,

    /// Fetch without the `is_migrated ≠ true` filter but otherwise behave
    /// like a default run, re-writing rows already marked migrated
    /// (spec §4.1).
    #[arg(long)]
    force: bool,

    /// Path to a newline-separated file of source primary-key ids. When
    /// given, replaces the configured plan list with one `find_one` plan
    /// per id (spec §6). Requires `--id-list-type` and
    /// `--id-list-collection`.
    #[arg(long)]
    id_list_path: Option<PathBuf>,

    #[arg(long, requires = "id_list_path")]
    id_list_type: Option<String>,

    #[arg(long, requires = "id_list_path")]
    id_list_collection: Option<String>,

    #[arg(long, default_value_t = 50)]
    id_list_batch_size: usize,

    /// Optional `KEY=VALUE` file loaded on top of the process environment;
    /// file values take precedence (`cli::env::EnvManager`).
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// When set, the end-of-run metrics report is written here as JSON
    /// instead of printed to stdout.
    #[arg(long)]
    report_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            error!(error = %err, "migration run failed to start");
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let mut env = env::EnvManager::new();
    if let Some(path) = &cli.env_file {
        env.load_from_file(path)?;
    }

    let content = tokio::fs::read_to_string(&cli.config)
        .await
        .map_err(|e| CliError::Config(format!("failed to read config {}: {e}", cli.config.display())))?;
    let mut config: MigrationConfig = serde_json::from_str(&content)?;

    config.apply_env_overrides(
        env.get("SRC_CONN_STR"),
        env.get("DEST_CONN_STR"),
        env.get("INT_CONN_STR"),
    );

    if let Some(project_id) = env.get("PROJECT_ID") {
        info!(project_id, "running with project id template token");
    }

    if let Some(id_list_path) = &cli.id_list_path {
        let plan_type = cli
            .id_list_type
            .as_deref()
            .ok_or_else(|| CliError::Config("--id-list-path requires --id-list-type".to_string()))?;
        let collection_name = cli
            .id_list_collection
            .as_deref()
            .ok_or_else(|| CliError::Config("--id-list-path requires --id-list-collection".to_string()))?;
        config.plans = id_list::expand(id_list_path, plan_type, collection_name, cli.id_list_batch_size).await?;
    }

    let source = store_factory::connect(&config.source).await?;
    let destination = store_factory::connect(&config.destination).await?;
    let internal = store_factory::connect(&config.internal).await?;

    let mut engine = engine_core::MigrationEngine::new(source, destination, internal, config.plans);

    let shutdown = ShutdownCoordinator::new();
    shutdown.register_handlers();

    info!(reset = cli.reset, force = cli.force, plans = engine.plans().len(), "starting migration run");
    engine.migrate(cli.reset, cli.force).await;

    let snapshot = engine.metrics().snapshot();
    match &cli.report_path {
        Some(path) => output::write_report(&snapshot, &path.to_string_lossy()).await?,
        None => output::print_report(&snapshot)?,
    }

    if shutdown.is_shutdown_requested() {
        info!("run stopped by shutdown signal; next invocation resumes from the last persisted checkpoint");
        Ok(ExitCode::ShutdownRequested)
    } else {
        Ok(ExitCode::Success)
    }
}
