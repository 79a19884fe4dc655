use std::path::Path;
use std::path::PathBuf;

use crate::error::StoreError;
use crate::error::StoreResult;
use pipeflow_protocol::JobId;
use pipeflow_protocol::WorkflowId;

const DATA_ROOT_ENV: &str = "PIPEFLOW_DATA_DIR";

/// Root directory for all persisted state: `<data_root>/workflows/`,
/// `<data_root>/jobs/`, and `<data_root>/artifacts/`.
pub fn data_root() -> PathBuf {
    if let Ok(path) = std::env::var(DATA_ROOT_ENV) {
        PathBuf::from(path)
    } else {
        PathBuf::from(".pipeflow").join("data")
    }
}

pub fn workflows_dir() -> PathBuf {
    data_root().join("workflows")
}

pub fn jobs_dir() -> PathBuf {
    data_root().join("jobs")
}

pub fn artifacts_dir() -> PathBuf {
    data_root().join("artifacts")
}

pub fn workflow_file(workflow_id: &WorkflowId) -> PathBuf {
    workflows_dir().join(format!("{}.json", workflow_id.as_str()))
}

pub fn job_file(job_id: &JobId) -> PathBuf {
    jobs_dir().join(format!("{}.json", job_id.as_str()))
}

pub fn workflow_artifact_dir(workflow_id: &WorkflowId) -> PathBuf {
    artifacts_dir().join(workflow_id.as_str())
}

pub async fn ensure_dir(dir: &Path) -> StoreResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StoreError::io(dir.display().to_string(), e))
}

/// Resolves `file_name` against `dir`, rejecting any path component that
/// would escape `dir` (`..`, absolute paths, embedded separators).
pub fn resolve_within(dir: &Path, file_name: &str) -> StoreResult<PathBuf> {
    let candidate = Path::new(file_name);
    let is_safe = candidate
        .components()
        .all(|c| matches!(c, std::path::Component::Normal(_)));
    if !is_safe {
        return Err(StoreError::PathEscape);
    }
    Ok(dir.join(candidate))
}
