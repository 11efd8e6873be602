use crate::error::CliError;
use engine_core::MetricsSnapshot;

fn report_json(snapshot: &MetricsSnapshot) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

pub async fn write_report(snapshot: &MetricsSnapshot, path: &str) -> Result<(), CliError> {
    let json = report_json(snapshot)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub fn print_report(snapshot: &MetricsSnapshot) -> Result<(), CliError> {
    println!("{}", report_json(snapshot)?);
    Ok(())
}
