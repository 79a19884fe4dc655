use pipeflow_protocol::JobRecord;
use pipeflow_protocol::StepResult;
use tracing::instrument;

use crate::error::HandlerError;
use crate::handlers::Deps;
use crate::handlers::JobCtx;

#[instrument(skip(deps, ctx, job), fields(workflow_id = %ctx.workflow_id))]
pub async fn run(deps: &Deps, ctx: &JobCtx, job: &JobRecord) -> Result<StepResult, HandlerError> {
    let source_url = job
        .input_params
        .get("source_url")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| HandlerError::internal("missing source_url in job input"))?;

    ctx.cancelled()?;

    let (url, info) = if source_url.starts_with("http://") || source_url.starts_with("https://") {
        let jobs = deps.jobs.clone();
        let job_id = ctx.job_id.clone();
        deps.artifacts
            .store_from_url(
                &ctx.workflow_id,
                &source_url,
                deps.config.max_download_bytes,
                &ctx.cancel,
                move |downloaded, total| {
                    let percent = total
                        .filter(|&t| t > 0)
                        .map(|t| ((downloaded.saturating_mul(100)) / t).min(99) as u8)
                        .unwrap_or(0);
                    let jobs = jobs.clone();
                    let job_id = job_id.clone();
                    tokio::spawn(async move {
                        let _ = jobs.update_progress(&job_id, percent, "downloading").await;
                    });
                },
            )
            .await?
    } else {
        deps.jobs
            .update_progress(&ctx.job_id, 20, "copying local source")
            .await?;
        deps.artifacts
            .store_from_path(&ctx.workflow_id, std::path::Path::new(&source_url), "mp4")
            .await?
    };

    ctx.cancelled()?;

    Ok(StepResult::Upload {
        video_url: url,
        size: info.size,
        format: info.format,
        source_url,
    })
}
