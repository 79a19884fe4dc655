use std::time::Instant;

use pipeflow_protocol::JobRecord;
use pipeflow_protocol::StepName;
use pipeflow_protocol::StepResult;
use tracing::instrument;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::handlers::Deps;
use crate::handlers::JobCtx;

#[instrument(skip(deps, ctx, _job), fields(workflow_id = %ctx.workflow_id))]
pub async fn run(deps: &Deps, ctx: &JobCtx, _job: &JobRecord) -> Result<StepResult, HandlerError> {
    let upload_result = deps
        .workflows
        .get_step_result(&ctx.workflow_id, StepName::UploadVideo)
        .await?;
    let Some(StepResult::Upload { video_url, .. }) = upload_result else {
        return Err(HandlerError::internal(
            "upload_video result missing video_url",
        ));
    };

    ctx.cancelled()?;
    deps.jobs
        .update_progress(&ctx.job_id, 10, "locating source video")
        .await?;

    let video_path = deps.artifacts.resolve(&ctx.workflow_id, &video_url)?;
    let tmp_audio = std::env::temp_dir().join(format!("{}.wav", Uuid::new_v4()));

    let start = Instant::now();
    deps.demuxer.extract_audio(&video_path, &tmp_audio).await?;
    ctx.cancelled()?;
    deps.jobs
        .update_progress(&ctx.job_id, 70, "storing extracted audio")
        .await?;

    let (audio_url, info) = deps
        .artifacts
        .store_from_path(&ctx.workflow_id, &tmp_audio, "wav")
        .await?;
    let _ = tokio::fs::remove_file(&tmp_audio).await;

    deps.artifacts.cleanup(&ctx.workflow_id, &video_url).await?;

    Ok(StepResult::ExtractAudio {
        audio_url,
        audio_size: info.size,
        video_cleaned: true,
        extraction_time_ms: start.elapsed().as_millis() as u64,
    })
}
