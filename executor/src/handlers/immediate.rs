use pipeflow_protocol::ErrorCode;
use pipeflow_protocol::ErrorDetail;
use pipeflow_protocol::JobError;
use pipeflow_protocol::StepName;
use pipeflow_protocol::StepResult;
use pipeflow_protocol::WorkflowId;

use crate::error::HandlerError;
use crate::handlers::Deps;

/// Prefers a request-supplied `text` override, then `enhance_transcription`'s
/// `enhanced_text`, then `transcribe_audio`'s `raw_text`, per `spec.md`
/// §4.E's analysis-endpoint precedence.
async fn resolve_text(
    deps: &Deps,
    workflow_id: &WorkflowId,
    override_text: Option<&str>,
) -> Result<String, HandlerError> {
    if let Some(text) = override_text.filter(|s| !s.trim().is_empty()) {
        return Ok(text.to_string());
    }

    if let Some(StepResult::Enhance { enhanced_text, .. }) = deps
        .workflows
        .get_step_result(workflow_id, StepName::EnhanceTranscription)
        .await?
        && !enhanced_text.trim().is_empty()
    {
        return Ok(enhanced_text);
    }

    if let Some(StepResult::Transcribe { raw_text, .. }) = deps
        .workflows
        .get_step_result(workflow_id, StepName::TranscribeAudio)
        .await?
        && !raw_text.trim().is_empty()
    {
        return Ok(raw_text);
    }

    Err(no_text_error())
}

fn no_text_error() -> HandlerError {
    HandlerError {
        detail: ErrorDetail::new(
            ErrorCode::NoTextToEnhance,
            "no text override, enhanced transcript, or raw transcript available",
        ),
        job_error: JobError::permanent(
            ErrorCode::NoTextToEnhance,
            "no text override, enhanced transcript, or raw transcript available",
        ),
        conflict: false,
    }
}

pub async fn summarize(
    deps: &Deps,
    workflow_id: &WorkflowId,
    override_text: Option<&str>,
) -> Result<String, HandlerError> {
    let text = resolve_text(deps, workflow_id, override_text).await?;
    let enhancement = deps.enhancer.enhance(&text).await?;
    deps.workflows
        .record_immediate_result(
            workflow_id,
            StepName::SummarizeContent,
            StepResult::Summary {
                summary: enhancement.summary.clone(),
            },
        )
        .await?;
    Ok(enhancement.summary)
}

pub async fn extract_key_points(
    deps: &Deps,
    workflow_id: &WorkflowId,
    override_text: Option<&str>,
) -> Result<Vec<String>, HandlerError> {
    let text = resolve_text(deps, workflow_id, override_text).await?;
    let enhancement = deps.enhancer.enhance(&text).await?;
    deps.workflows
        .record_immediate_result(
            workflow_id,
            StepName::ExtractKeyPoints,
            StepResult::KeyPoints {
                key_points: enhancement.key_points.clone(),
            },
        )
        .await?;
    Ok(enhancement.key_points)
}

pub async fn analyze_sentiment(
    deps: &Deps,
    workflow_id: &WorkflowId,
    override_text: Option<&str>,
) -> Result<(String, f64), HandlerError> {
    let text = resolve_text(deps, workflow_id, override_text).await?;
    let enhancement = deps.enhancer.enhance(&text).await?;
    // The enhancer contract doesn't carry a numeric confidence for
    // sentiment; a fixed midpoint stands in until a collaborator that
    // reports one is wired up.
    let confidence = 0.75;
    deps.workflows
        .record_immediate_result(
            workflow_id,
            StepName::AnalyzeSentiment,
            StepResult::Sentiment {
                sentiment: enhancement.sentiment.clone(),
                confidence,
            },
        )
        .await?;
    Ok((enhancement.sentiment, confidence))
}

pub async fn identify_topics(
    deps: &Deps,
    workflow_id: &WorkflowId,
    override_text: Option<&str>,
) -> Result<Vec<String>, HandlerError> {
    let text = resolve_text(deps, workflow_id, override_text).await?;
    let enhancement = deps.enhancer.enhance(&text).await?;
    deps.workflows
        .record_immediate_result(
            workflow_id,
            StepName::IdentifyTopics,
            StepResult::Topics {
                topics: enhancement.topics.clone(),
            },
        )
        .await?;
    Ok(enhancement.topics)
}
