use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorDetail;

/// The closed set of pipeline steps a workflow tracks, per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    UploadVideo,
    ExtractAudio,
    TranscribeAudio,
    EnhanceTranscription,
    SummarizeContent,
    ExtractKeyPoints,
    AnalyzeSentiment,
    IdentifyTopics,
}

impl StepName {
    pub const ALL: [StepName; 8] = [
        StepName::UploadVideo,
        StepName::ExtractAudio,
        StepName::TranscribeAudio,
        StepName::EnhanceTranscription,
        StepName::SummarizeContent,
        StepName::ExtractKeyPoints,
        StepName::AnalyzeSentiment,
        StepName::IdentifyTopics,
    ];

    /// The step whose `completed` status must hold before this step may
    /// enter `running`, per `spec.md` §3's precondition chain. `UploadVideo`
    /// has no dependency.
    pub fn dependency(self) -> Option<StepName> {
        match self {
            StepName::UploadVideo => None,
            StepName::ExtractAudio => Some(StepName::UploadVideo),
            StepName::TranscribeAudio => Some(StepName::ExtractAudio),
            StepName::EnhanceTranscription
            | StepName::SummarizeContent
            | StepName::ExtractKeyPoints
            | StepName::AnalyzeSentiment
            | StepName::IdentifyTopics => Some(StepName::TranscribeAudio),
        }
    }

    /// Whether this step is driven by a job (background, polled) or is an
    /// immediate endpoint, per `spec.md` §4.E.
    pub fn is_job_based(self) -> bool {
        matches!(
            self,
            StepName::UploadVideo
                | StepName::ExtractAudio
                | StepName::TranscribeAudio
                | StepName::EnhanceTranscription
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,
}

impl StepRecord {
    pub fn pending() -> Self {
        Self {
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            failed_at: None,
            error: None,
            result: None,
        }
    }
}

/// Step-specific result payloads. A closed, tagged set instead of an
/// untyped JSON result map (see `spec.md` §9 "Dynamic result payloads").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepResult {
    Upload {
        video_url: String,
        size: u64,
        format: String,
        source_url: String,
    },
    ExtractAudio {
        audio_url: String,
        audio_size: u64,
        video_cleaned: bool,
        extraction_time_ms: u64,
    },
    Transcribe {
        raw_text: String,
        segments: Vec<TranscriptSegment>,
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        duration_ms: u64,
        service_used: String,
        quality_used: String,
        audio_cleaned: bool,
    },
    Enhance {
        enhanced_text: String,
        summary: String,
        key_points: Vec<String>,
        topics: Vec<String>,
        sentiment: String,
        model_used: String,
    },
    Summary {
        summary: String,
    },
    KeyPoints {
        key_points: Vec<String>,
    },
    Sentiment {
        sentiment: String,
        confidence: f64,
    },
    Topics {
        topics: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionQuality {
    Fast,
    Balanced,
    Accurate,
    Best,
}

impl TranscriptionQuality {
    /// quality -> model-size mapping from `spec.md` §4.E.
    pub fn model_size(self) -> &'static str {
        match self {
            TranscriptionQuality::Fast => "tiny",
            TranscriptionQuality::Balanced => "base",
            TranscriptionQuality::Accurate => "medium",
            TranscriptionQuality::Best => "large",
        }
    }
}
