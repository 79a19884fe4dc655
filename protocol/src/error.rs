use serde::Deserialize;
use serde::Serialize;

/// The closed error code taxonomy from `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    WorkflowNotFound,
    JobNotFound,
    StepPrecondition,
    SourceUnreachable,
    SourceTooLarge,
    NoAudioReference,
    AudioFileNotFound,
    TranscriptionFailed,
    NoTextToEnhance,
    Cancelled,
    Timeout,
    RestartInterrupted,
    Internal,
}

impl ErrorCode {
    /// HTTP status for errors an endpoint returns directly (validation,
    /// not-found, precondition, internal), per `spec.md` §6. Codes that
    /// normally surface inside a job's `error` field (e.g.
    /// `SOURCE_UNREACHABLE`, `TIMEOUT`) are given a reasonable default here
    /// but are not expected to reach this conversion in practice; the
    /// step-already-running conflict reuses `StepPrecondition` with an
    /// explicit 409 chosen by the handler rather than by this mapping.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::StepPrecondition
            | ErrorCode::NoAudioReference
            | ErrorCode::NoTextToEnhance => 400,
            ErrorCode::WorkflowNotFound | ErrorCode::JobNotFound => 404,
            ErrorCode::SourceUnreachable
            | ErrorCode::SourceTooLarge
            | ErrorCode::AudioFileNotFound
            | ErrorCode::TranscriptionFailed
            | ErrorCode::Cancelled
            | ErrorCode::Timeout
            | ErrorCode::RestartInterrupted => 422,
            ErrorCode::Internal => 500,
        }
    }
}

/// Embedded in a workflow step's `error` field: `{message, code, details}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }
}

/// A job's terminal error, carrying the retry hints from `spec.md` §4.D/§7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl JobError {
    pub fn transient(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: true,
            retry_after_secs: Some(60),
        }
    }

    pub fn permanent(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: false,
            retry_after_secs: None,
        }
    }

    pub fn as_error_detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code,
            message: self.message.clone(),
            details: None,
        }
    }
}
