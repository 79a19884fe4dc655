use pipeflow_collab::CollabError;
use pipeflow_protocol::ErrorCode;
use pipeflow_protocol::ErrorDetail;
use pipeflow_protocol::JobError;
use pipeflow_store::StoreError;

/// A handler-level failure, already classified into the `spec.md` §7
/// taxonomy, carrying both the workflow step's [`ErrorDetail`] and the
/// job's [`JobError`] view of the same failure.
#[derive(Debug)]
pub struct HandlerError {
    pub detail: ErrorDetail,
    pub job_error: JobError,
    /// Set when this error originated from a step that was already
    /// `running`/`completed` at submit time: the HTTP layer reports this as
    /// `409` rather than the `400` that `ErrorCode::StepPrecondition`
    /// otherwise maps to for a dependency that simply hasn't completed yet.
    pub conflict: bool,
}

impl HandlerError {
    fn transient(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            detail: ErrorDetail::new(code, message.clone()),
            job_error: JobError::transient(code, message),
            conflict: false,
        }
    }

    fn permanent(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            detail: ErrorDetail::new(code, message.clone()),
            job_error: JobError::permanent(code, message),
            conflict: false,
        }
    }

    pub fn cancelled() -> Self {
        Self::permanent(ErrorCode::Cancelled, "operation cancelled")
    }

    pub fn timeout() -> Self {
        Self::transient(ErrorCode::Timeout, "operation exceeded its time budget")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::permanent(ErrorCode::Internal, message)
    }

    /// The `extract_audio` step has no stored `audio_url` to work from —
    /// it was never run, or failed, for this workflow.
    pub fn no_audio_reference(message: impl Into<String>) -> Self {
        Self::permanent(ErrorCode::NoAudioReference, message)
    }

    /// `extract_audio` produced an `audio_url`, but the file it points to
    /// is no longer on disk (e.g. cleaned up between steps).
    pub fn audio_file_not_found(message: impl Into<String>) -> Self {
        Self::permanent(ErrorCode::AudioFileNotFound, message)
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WorkflowNotFound(_) => {
                Self::permanent(ErrorCode::WorkflowNotFound, err.to_string())
            }
            StoreError::JobNotFound(_) => Self::permanent(ErrorCode::JobNotFound, err.to_string()),
            StoreError::StepPrecondition { .. } => {
                Self::permanent(ErrorCode::StepPrecondition, err.to_string())
            }
            StoreError::StepAlreadyCompleted(_) | StoreError::StepAlreadyRunning(_) => Self {
                conflict: true,
                ..Self::permanent(ErrorCode::StepPrecondition, err.to_string())
            },
            StoreError::SourceUnreachable(_) => {
                Self::transient(ErrorCode::SourceUnreachable, err.to_string())
            }
            StoreError::SourceTooLarge { .. } => {
                Self::permanent(ErrorCode::SourceTooLarge, err.to_string())
            }
            StoreError::ArtifactNotFound(_) => Self::internal(err.to_string()),
            StoreError::Cancelled => Self::cancelled(),
            StoreError::Download(_) => {
                Self::transient(ErrorCode::SourceUnreachable, err.to_string())
            }
            StoreError::PathEscape
            | StoreError::SchemaTooNew { .. }
            | StoreError::NoMigrationPath(_)
            | StoreError::Io { .. }
            | StoreError::Serde(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<CollabError> for HandlerError {
    fn from(err: CollabError) -> Self {
        match err {
            CollabError::Demux(_) | CollabError::ProcessExit(_) => {
                Self::transient(ErrorCode::TranscriptionFailed, err.to_string())
            }
            CollabError::Transcription(_) => {
                Self::transient(ErrorCode::TranscriptionFailed, err.to_string())
            }
            CollabError::Enhancement(_) => Self::transient(ErrorCode::Internal, err.to_string()),
            CollabError::Timeout => Self::timeout(),
            CollabError::Io(_) | CollabError::Http(_) => {
                Self::transient(ErrorCode::SourceUnreachable, err.to_string())
            }
        }
    }
}
