use pipeflow_protocol::ErrorCode;
use pipeflow_protocol::JobRecord;
use pipeflow_protocol::StepName;
use pipeflow_protocol::StepResult;
use tracing::instrument;

use crate::error::HandlerError;
use crate::handlers::Deps;
use crate::handlers::JobCtx;

#[instrument(skip(deps, ctx, job), fields(workflow_id = %ctx.workflow_id))]
pub async fn run(deps: &Deps, ctx: &JobCtx, job: &JobRecord) -> Result<StepResult, HandlerError> {
    let raw_text = resolve_text(deps, &ctx.workflow_id, job).await?;

    ctx.cancelled()?;
    deps.jobs
        .update_progress(&ctx.job_id, 30, "enhancing transcript")
        .await?;

    let enhancement = deps.enhancer.enhance(&raw_text).await?;

    Ok(StepResult::Enhance {
        enhanced_text: enhancement.enhanced_text,
        summary: enhancement.summary,
        key_points: enhancement.key_points,
        topics: enhancement.topics,
        sentiment: enhancement.sentiment,
        model_used: enhancement.model_used,
    })
}

/// Shared by the job-based `EnhanceTranscription` handler and the four
/// immediate analysis handlers: prefer a request-supplied `text`/`raw_text`
/// override the client passed on this call, otherwise pull the last-known
/// `transcribe_audio` output.
pub async fn resolve_text(
    deps: &Deps,
    workflow_id: &pipeflow_protocol::WorkflowId,
    job: &JobRecord,
) -> Result<String, HandlerError> {
    if let Some(text) = job
        .input_params
        .get("raw_text")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
    {
        return Ok(text.to_string());
    }
    let transcript = deps
        .workflows
        .get_step_result(workflow_id, StepName::TranscribeAudio)
        .await?;
    match transcript {
        Some(StepResult::Transcribe { raw_text, .. }) if !raw_text.trim().is_empty() => {
            Ok(raw_text)
        }
        _ => Err(HandlerError {
            detail: pipeflow_protocol::ErrorDetail::new(
                ErrorCode::NoTextToEnhance,
                "no raw_text supplied and no completed transcription to fall back on",
            ),
            job_error: pipeflow_protocol::JobError::permanent(
                ErrorCode::NoTextToEnhance,
                "no raw_text supplied and no completed transcription to fall back on",
            ),
            conflict: false,
        }),
    }
}
