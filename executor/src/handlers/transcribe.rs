use std::sync::Arc;
use std::time::Instant;

use pipeflow_collab::FallbackRecognizer;
use pipeflow_collab::Recognizer;
use pipeflow_protocol::JobRecord;
use pipeflow_protocol::StepName;
use pipeflow_protocol::StepResult;
use pipeflow_protocol::TranscriptionQuality;
use tracing::instrument;

use crate::error::HandlerError;
use crate::handlers::Deps;
use crate::handlers::JobCtx;

#[instrument(skip(deps, ctx, job), fields(workflow_id = %ctx.workflow_id))]
pub async fn run(deps: &Deps, ctx: &JobCtx, job: &JobRecord) -> Result<StepResult, HandlerError> {
    let audio_result = deps
        .workflows
        .get_step_result(&ctx.workflow_id, StepName::ExtractAudio)
        .await?;
    let Some(StepResult::ExtractAudio { audio_url, .. }) = audio_result else {
        return Err(HandlerError::no_audio_reference(
            "extract_audio result missing audio_url",
        ));
    };

    let quality = job
        .input_params
        .get("quality")
        .and_then(|v| v.as_str())
        .and_then(parse_quality)
        .unwrap_or(TranscriptionQuality::Balanced);
    let language = job
        .input_params
        .get("language")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let use_azure = job
        .input_params
        .get("use_azure")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    ctx.cancelled()?;
    deps.jobs
        .update_progress(&ctx.job_id, 15, "preparing audio")
        .await?;

    let audio_path = deps.artifacts.resolve(&ctx.workflow_id, &audio_url)?;
    if tokio::fs::metadata(&audio_path).await.is_err() {
        return Err(HandlerError::audio_file_not_found(format!(
            "audio file referenced by extract_audio is missing: {}",
            audio_path.display()
        )));
    }

    deps.jobs
        .update_progress(&ctx.job_id, 30, "transcribing")
        .await?;
    let start = Instant::now();

    let recognizer: Arc<dyn Recognizer> = if use_azure {
        deps.cloud_recognizer.clone()
    } else {
        Arc::new(FallbackRecognizer::new(
            clone_boxed(&deps.local_recognizer),
            clone_boxed(&deps.cloud_recognizer),
        ))
    };
    let transcript = recognizer
        .transcribe(&audio_path, quality, language.as_deref())
        .await?;

    ctx.cancelled()?;
    deps.jobs
        .update_progress(&ctx.job_id, 90, "cleaning up audio artifact")
        .await?;
    deps.artifacts.cleanup(&ctx.workflow_id, &audio_url).await?;

    Ok(StepResult::Transcribe {
        raw_text: transcript.raw_text,
        segments: transcript.segments,
        language: transcript.language,
        confidence: transcript.confidence,
        duration_ms: start.elapsed().as_millis() as u64,
        service_used: transcript.service_used,
        quality_used: quality.model_size().to_string(),
        audio_cleaned: true,
    })
}

fn parse_quality(raw: &str) -> Option<TranscriptionQuality> {
    match raw {
        "fast" => Some(TranscriptionQuality::Fast),
        "balanced" => Some(TranscriptionQuality::Balanced),
        "accurate" => Some(TranscriptionQuality::Accurate),
        "best" => Some(TranscriptionQuality::Best),
        _ => None,
    }
}

/// `Recognizer` trait objects aren't `Clone`; `FallbackRecognizer` owns its
/// two legs, so each transcription builds a fresh wrapper around `Arc`
/// clones of the shared recognizers rather than cloning the recognizers
/// themselves.
fn clone_boxed(recognizer: &Arc<dyn Recognizer>) -> Box<dyn Recognizer> {
    Box::new(ArcRecognizer(recognizer.clone()))
}

struct ArcRecognizer(Arc<dyn Recognizer>);

#[async_trait::async_trait]
impl Recognizer for ArcRecognizer {
    async fn transcribe(
        &self,
        audio_path: &std::path::Path,
        quality: TranscriptionQuality,
        language: Option<&str>,
    ) -> pipeflow_collab::CollabResult<pipeflow_collab::Transcript> {
        self.0.transcribe(audio_path, quality, language).await
    }
}
