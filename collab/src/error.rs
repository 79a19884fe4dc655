/// Failure modes surfaced by collaborator implementations. The executor
/// maps these onto `pipeflow_protocol::ErrorCode` when recording a job's
/// terminal error.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("audio extraction failed: {0}")]
    Demux(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("enhancement failed: {0}")]
    Enhancement(String),

    #[error("collaborator process exited with {0}")]
    ProcessExit(String),

    #[error("collaborator request timed out")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type CollabResult<T> = Result<T, CollabError>;
