use pipeflow_protocol::JobId;
use pipeflow_protocol::StepName;
use pipeflow_protocol::WorkflowId;

/// Failure modes shared by the workflow, job, and artifact stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("step {step:?} requires {dependency:?} to be completed first")]
    StepPrecondition {
        step: StepName,
        dependency: StepName,
    },

    #[error("step {0:?} is already running")]
    StepAlreadyRunning(StepName),

    #[error("step {0:?} is already completed; force-restart it to re-run")]
    StepAlreadyCompleted(StepName),

    #[error("artifact path escapes the workflow's artifact directory")]
    PathEscape,

    #[error("artifact not found at {0}")]
    ArtifactNotFound(String),

    #[error("source is unreachable: {0}")]
    SourceUnreachable(String),

    #[error("source is {actual} bytes, exceeding the {limit} byte limit")]
    SourceTooLarge { limit: u64, actual: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error(
        "persisted schema version {found} is newer than the {supported} this build understands"
    )]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("no migration path from schema version {0}")]
    NoMigrationPath(u32),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize store record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("artifact download failed: {0}")]
    Download(#[from] reqwest::Error),
}

impl StoreError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
