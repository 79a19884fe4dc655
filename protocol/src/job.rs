use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::JobError;
use crate::ids::JobId;
use crate::ids::WorkflowId;
use crate::step::StepName;
use crate::step::StepResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// The long-running stage names a job may be created for; a strict subset
/// of `StepName`, per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    UploadVideo,
    ExtractAudio,
    TranscribeAudio,
    EnhanceTranscription,
}

impl Operation {
    pub fn as_step(self) -> StepName {
        match self {
            Operation::UploadVideo => StepName::UploadVideo,
            Operation::ExtractAudio => StepName::ExtractAudio,
            Operation::TranscribeAudio => StepName::TranscribeAudio,
            Operation::EnhanceTranscription => StepName::EnhanceTranscription,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub workflow_id: WorkflowId,
    pub operation: Operation,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    pub input_params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobRecord {
    pub fn new(workflow_id: WorkflowId, operation: Operation, input_params: serde_json::Value) -> Self {
        Self {
            job_id: JobId::new(),
            workflow_id,
            operation,
            status: JobStatus::Queued,
            progress: 0,
            message: "waiting for executor slot".to_string(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancel_reason: None,
            estimated_completion: None,
            input_params,
            result: None,
            error: None,
        }
    }

    /// `true` if this job may transition to `cancelled` right now.
    pub fn is_cancellable(&self) -> bool {
        matches!(self.status, JobStatus::Queued | JobStatus::Running)
    }

    pub fn next_action(&self) -> &'static str {
        match self.status {
            JobStatus::Queued | JobStatus::Running => "poll_job",
            JobStatus::Completed => "proceed_to_next_stage",
            JobStatus::Failed => "retry_or_contact_support",
            JobStatus::Cancelled => "resubmit_if_desired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_job_starts_queued_with_zero_progress() {
        let job = JobRecord::new(WorkflowId::new(), Operation::UploadVideo, json!({}));
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.is_cancellable());
    }

    #[test]
    fn terminal_statuses_are_not_cancellable() {
        let mut job = JobRecord::new(WorkflowId::new(), Operation::UploadVideo, json!({}));
        job.status = JobStatus::Completed;
        assert!(!job.is_cancellable());
    }
}
