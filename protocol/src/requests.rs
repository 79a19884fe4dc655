use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorCode;
use crate::ids::WorkflowId;
use crate::step::TranscriptionQuality;

/// A request failed validation before touching any store, per `spec.md`
/// §7's "Validation" taxonomy entry.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        ErrorCode::ValidationError
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadVideoRequest {
    pub source_url: String,
    pub workflow_id: String,
    /// Re-run this step even if it already has a `completed` result,
    /// cascading a reset to every step downstream of it.
    #[serde(default)]
    pub force_restart: bool,
}

impl UploadVideoRequest {
    pub fn validate(&self) -> Result<WorkflowId, ValidationError> {
        require_non_empty("source_url", &self.source_url)?;
        WorkflowId::parse(&self.workflow_id)
            .ok_or_else(|| ValidationError::new("workflow_id must not be empty"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowScopedRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub force_restart: bool,
}

impl WorkflowScopedRequest {
    pub fn validate(&self) -> Result<WorkflowId, ValidationError> {
        WorkflowId::parse(&self.workflow_id)
            .ok_or_else(|| ValidationError::new("workflow_id must not be empty"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscribeAudioRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub use_azure: Option<bool>,
    #[serde(default)]
    pub force_restart: bool,
}

impl TranscribeAudioRequest {
    pub fn validate(&self) -> Result<(WorkflowId, TranscriptionQuality), ValidationError> {
        let workflow_id = WorkflowId::parse(&self.workflow_id)
            .ok_or_else(|| ValidationError::new("workflow_id must not be empty"))?;
        let quality = match self.quality.as_deref() {
            None => TranscriptionQuality::Balanced,
            Some("fast") => TranscriptionQuality::Fast,
            Some("balanced") => TranscriptionQuality::Balanced,
            Some("accurate") => TranscriptionQuality::Accurate,
            Some("best") => TranscriptionQuality::Best,
            Some(other) => {
                return Err(ValidationError::new(format!(
                    "quality must be one of fast, balanced, accurate, best; got {other}"
                )));
            }
        };
        Ok((workflow_id, quality))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhanceTranscriptionRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub force_restart: bool,
}

impl EnhanceTranscriptionRequest {
    pub fn validate(&self) -> Result<WorkflowId, ValidationError> {
        WorkflowId::parse(&self.workflow_id)
            .ok_or_else(|| ValidationError::new("workflow_id must not be empty"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextAnalysisRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl TextAnalysisRequest {
    pub fn validate(&self) -> Result<WorkflowId, ValidationError> {
        WorkflowId::parse(&self.workflow_id)
            .ok_or_else(|| ValidationError::new("workflow_id must not be empty"))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CancelJobRequest {
    #[serde(default)]
    pub reason: Option<String>,
}
