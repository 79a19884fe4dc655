use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use pipeflow_protocol::ErrorCode;
use pipeflow_protocol::JobId;
use pipeflow_protocol::Operation;
use pipeflow_protocol::requests::CancelJobRequest;
use pipeflow_protocol::requests::EnhanceTranscriptionRequest;
use pipeflow_protocol::requests::TranscribeAudioRequest;
use pipeflow_protocol::requests::UploadVideoRequest;
use pipeflow_protocol::requests::WorkflowScopedRequest;
use pipeflow_protocol::responses::CancelJobResponse;
use pipeflow_protocol::responses::JobAcceptedResponse;
use pipeflow_protocol::responses::JobStatusResponse;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn upload_video(
    State(state): State<AppState>,
    Json(req): Json<UploadVideoRequest>,
) -> Result<Json<JobAcceptedResponse>, ApiError> {
    let workflow_id = req.validate().map_err(ApiError::validation)?;
    let input_params = json!({
        "source_url": req.source_url,
        "workflow_id": req.workflow_id,
    });
    let job = state
        .executor()
        .submit(
            workflow_id,
            Operation::UploadVideo,
            input_params,
            req.force_restart,
        )
        .await
        .map_err(ApiError::from_handler)?;
    Ok(Json(JobAcceptedResponse::from(&job)))
}

pub async fn extract_audio(
    State(state): State<AppState>,
    Json(req): Json<WorkflowScopedRequest>,
) -> Result<Json<JobAcceptedResponse>, ApiError> {
    let workflow_id = req.validate().map_err(ApiError::validation)?;
    let job = state
        .executor()
        .submit(
            workflow_id,
            Operation::ExtractAudio,
            json!({}),
            req.force_restart,
        )
        .await
        .map_err(ApiError::from_handler)?;
    Ok(Json(JobAcceptedResponse::from(&job)))
}

pub async fn transcribe_audio(
    State(state): State<AppState>,
    Json(req): Json<TranscribeAudioRequest>,
) -> Result<Json<JobAcceptedResponse>, ApiError> {
    let (workflow_id, quality) = req.validate().map_err(ApiError::validation)?;
    let input_params = json!({
        "quality": quality_key(quality),
        "language": req.language,
        "use_azure": req.use_azure.unwrap_or(false),
    });
    let job = state
        .executor()
        .submit(
            workflow_id,
            Operation::TranscribeAudio,
            input_params,
            req.force_restart,
        )
        .await
        .map_err(ApiError::from_handler)?;
    Ok(Json(JobAcceptedResponse::from(&job)))
}

fn quality_key(quality: pipeflow_protocol::TranscriptionQuality) -> &'static str {
    use pipeflow_protocol::TranscriptionQuality as Q;
    match quality {
        Q::Fast => "fast",
        Q::Balanced => "balanced",
        Q::Accurate => "accurate",
        Q::Best => "best",
    }
}

pub async fn enhance_transcription(
    State(state): State<AppState>,
    Json(req): Json<EnhanceTranscriptionRequest>,
) -> Result<Json<JobAcceptedResponse>, ApiError> {
    let workflow_id = req.validate().map_err(ApiError::validation)?;
    let input_params = json!({ "raw_text": req.raw_text });
    let job = state
        .executor()
        .submit(
            workflow_id,
            Operation::EnhanceTranscription,
            input_params,
            req.force_restart,
        )
        .await
        .map_err(ApiError::from_handler)?;
    Ok(Json(JobAcceptedResponse::from(&job)))
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::parse(raw).ok_or_else(|| {
        ApiError::bad_request(
            ErrorCode::ValidationError,
            format!("job_id {raw:?} does not match job_<uuid> format"),
        )
    })
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.jobs().get(&job_id).await.map_err(ApiError::from_store)?;
    Ok(Json(JobStatusResponse::from(&job)))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<CancelJobRequest>,
) -> Result<Json<CancelJobResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let before = state.jobs().get(&job_id).await.map_err(ApiError::from_store)?;
    if !before.is_cancellable() {
        return Err(ApiError::conflict(
            ErrorCode::StepPrecondition,
            format!("job {job_id} is already {:?} and cannot be cancelled", before.status),
        ));
    }
    let updated = state
        .jobs()
        .cancel(&job_id, req.reason)
        .await
        .map_err(ApiError::from_store)?;
    Ok(Json(CancelJobResponse {
        job_id: updated.job_id,
        status: updated.status,
        cancel_reason: updated.cancel_reason,
    }))
}
