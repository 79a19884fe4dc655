use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::error::ErrorDetail;
use crate::error::JobError;
use crate::ids::JobId;
use crate::ids::WorkflowId;
use crate::job::JobRecord;
use crate::job::JobStatus;
use crate::step::StepResult;

/// `202 Accepted` body for every job-based endpoint, per `spec.md` §6.
#[derive(Debug, Clone, Serialize)]
pub struct JobAcceptedResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub workflow_id: WorkflowId,
    pub next_action: &'static str,
}

impl From<&JobRecord> for JobAcceptedResponse {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            workflow_id: job.workflow_id.clone(),
            next_action: job.next_action(),
        }
    }
}

/// Body for `GET /jobs/{job_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub next_action: &'static str,
}

impl From<&JobRecord> for JobStatusResponse {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            estimated_completion: job.estimated_completion,
            result: job.result.clone(),
            error: job.error.clone(),
            next_action: job.next_action(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateWorkflowResponse {
    pub workflow_id: WorkflowId,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub architecture: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub in_flight_jobs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub workflow_id: WorkflowId,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyPointsResponse {
    pub key_points: Vec<String>,
    pub workflow_id: WorkflowId,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentResponse {
    pub sentiment: String,
    pub confidence: f64,
    pub workflow_id: WorkflowId,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicsResponse {
    pub topics: Vec<String>,
    pub workflow_id: WorkflowId,
}

/// Uniform error envelope for every `4xx`/`5xx` the HTTP surface returns.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub next_action: &'static str,
}

impl ErrorResponse {
    pub fn new(error: ErrorDetail, next_action: &'static str) -> Self {
        Self { error, next_action }
    }
}
