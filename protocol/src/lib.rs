//! Wire and persisted DTOs shared between the store, executor, and HTTP
//! surface crates: opaque ids, the closed step/job state machines, the
//! error code taxonomy, and request/response bodies.

pub mod error;
pub mod ids;
pub mod job;
pub mod requests;
pub mod responses;
pub mod step;

pub use error::ErrorCode;
pub use error::ErrorDetail;
pub use error::JobError;
pub use ids::JobId;
pub use ids::WorkflowId;
pub use job::JobRecord;
pub use job::JobStatus;
pub use job::Operation;
pub use step::StepName;
pub use step::StepRecord;
pub use step::StepResult;
pub use step::StepStatus;
pub use step::TranscriptSegment;
pub use step::TranscriptionQuality;
