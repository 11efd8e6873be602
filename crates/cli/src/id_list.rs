use crate::error::CliError;
use model::{DocumentPlan, FieldQuery, Value};
use std::path::Path;

/// Minimal upstream "configuration expander" for `--id_list_path` (spec
/// §6): reads a newline-separated file of source primary-key ids and turns
/// each into a `find_one` plan (`queries = [{id, eq, <id>}]`). The engine
/// itself never parses this file — per spec §1 configuration expansion is
/// an external collaborator — but a runnable binary needs something that
/// does, and `original_source` treats this step as part of the outer tool
/// rather than the migration controller.
pub async fn expand(
    path: impl AsRef<Path>,
    plan_type: &str,
    collection_name: &str,
    batch_size: usize,
) -> Result<Vec<DocumentPlan>, CliError> {
    let content = tokio::fs::read_to_string(path.as_ref())
        .await
        .map_err(|e| CliError::Config(format!("failed to read id list {}: {e}", path.as_ref().display())))?;

    let plans = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|id| {
            DocumentPlan::new(
                plan_type,
                collection_name,
                vec![FieldQuery::eq("id", Value::String(id.to_string()))],
                batch_size,
            )
        })
        .collect();

    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn expands_one_find_one_plan_per_nonblank_line() {
        let mut file = NamedTempFile::new().unwrap();
        tokio::fs::File::from_std(file.reopen().unwrap())
            .write_all(b"X\nY\n\nZ\n")
            .await
            .unwrap();
        file.flush().unwrap();

        let plans = expand(file.path(), "t", "c", 50).await.unwrap();
        assert_eq!(plans.len(), 3);
        assert!(plans[0].find_one());
        assert_eq!(plans[0].queries[0].value, Value::String("X".to_string()));
        assert_eq!(plans[2].queries[0].value, Value::String("Z".to_string()));
    }

    #[tokio::test]
    async fn missing_file_is_a_config_error() {
        let result = expand("/nonexistent/path/ids.txt", "t", "c", 50).await;
        assert!(result.is_err());
    }
}
