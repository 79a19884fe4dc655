use std::sync::Arc;

use pipeflow_protocol::JobRecord;
use pipeflow_protocol::Operation;
use pipeflow_protocol::StepName;
use pipeflow_protocol::StepResult;
use pipeflow_protocol::WorkflowId;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::error;
use tracing::instrument;

use crate::config::ExecutorConfig;
use crate::error::HandlerError;
use crate::handlers;
use crate::handlers::Deps;
use crate::handlers::JobCtx;

/// Dispatches job-based operations to their handlers under a
/// per-operation-kind `Semaphore`: one gate per resource class rather than a
/// single global concurrency limit, so a slow transcription backlog can't
/// starve uploads.
pub struct Executor {
    deps: Arc<Deps>,
    upload: Arc<Semaphore>,
    extract_audio: Arc<Semaphore>,
    transcribe: Arc<Semaphore>,
    enhance: Arc<Semaphore>,
}

impl Executor {
    pub fn new(deps: Deps) -> Self {
        let config: ExecutorConfig = deps.config;
        Self {
            deps: Arc::new(deps),
            upload: Arc::new(Semaphore::new(config.upload_concurrency)),
            extract_audio: Arc::new(Semaphore::new(config.extract_audio_concurrency)),
            transcribe: Arc::new(Semaphore::new(config.transcribe_concurrency)),
            enhance: Arc::new(Semaphore::new(config.enhance_concurrency)),
        }
    }

    /// Exposes the shared collaborator/store handles for the four
    /// immediate analysis endpoints, which bypass job scheduling entirely.
    pub fn deps(&self) -> &Deps {
        &self.deps
    }

    fn semaphore_for(&self, operation: Operation) -> Arc<Semaphore> {
        match operation {
            Operation::UploadVideo => self.upload.clone(),
            Operation::ExtractAudio => self.extract_audio.clone(),
            Operation::TranscribeAudio => self.transcribe.clone(),
            Operation::EnhanceTranscription => self.enhance.clone(),
        }
    }

    /// Validates the step precondition and creates the job synchronously,
    /// then hands the actual work to a background task. A second submit for
    /// a step that is already `running` fails here, before any job record
    /// exists, per the "second call while running returns 409 without
    /// creating a job" invariant. A second submit for a `completed` step
    /// also fails unless `force` is set, in which case the step and every
    /// step downstream of it are reset and the step is re-run.
    #[instrument(skip(self, input_params), fields(workflow_id = %workflow_id, operation = ?operation, force))]
    pub async fn submit(
        &self,
        workflow_id: WorkflowId,
        operation: Operation,
        input_params: Value,
        force: bool,
    ) -> Result<JobRecord, HandlerError> {
        let step = operation.as_step();
        self.deps
            .workflows
            .start_step(&workflow_id, step, force)
            .await?;

        let job = match self
            .deps
            .jobs
            .create_job(workflow_id.clone(), operation, input_params)
            .await
        {
            Ok(job) => job,
            Err(err) => {
                let handler_err = HandlerError::from(err);
                if let Err(revert_err) = self
                    .deps
                    .workflows
                    .fail_step(&workflow_id, step, handler_err.detail.clone())
                    .await
                {
                    error!(error = %revert_err, "failed to revert step after job creation failure");
                }
                return Err(handler_err);
            }
        };

        if operation == Operation::UploadVideo {
            let _ = self
                .deps
                .workflows
                .update_original(&workflow_id, Some(job.input_params.clone()), None)
                .await;
        }

        self.spawn(job.clone(), step);
        Ok(job)
    }

    fn spawn(&self, job: JobRecord, step: StepName) {
        let deps = self.deps.clone();
        let semaphore = self.semaphore_for(job.operation);
        let cancel = deps.jobs.cancellation_token(&job.job_id);
        let timeout = deps.config.operation_timeout;

        tokio::spawn(async move {
            let Ok(permit) = semaphore.acquire_owned().await else {
                return;
            };
            let ctx = JobCtx {
                workflow_id: job.workflow_id.clone(),
                job_id: job.job_id.clone(),
                cancel,
            };

            if let Err(err) = deps.jobs.mark_running(&ctx.job_id).await {
                error!(error = %err, "failed to mark job running");
            }

            let outcome = tokio::time::timeout(timeout, dispatch(&deps, &ctx, &job)).await;
            drop(permit);

            let result = match outcome {
                Ok(inner) => inner,
                Err(_) => Err(HandlerError::timeout()),
            };

            // B-before-C: the workflow step result is always persisted
            // before the job result, so a client polling only the job and
            // then GETting the workflow is guaranteed to see the step
            // reflect a completed job.
            match result {
                Ok(step_result) => {
                    if let Err(err) = deps
                        .workflows
                        .complete_step(&job.workflow_id, step, step_result.clone())
                        .await
                    {
                        error!(error = %err, "failed to persist completed step");
                    }
                    if let Err(err) = deps.jobs.set_result(&job.job_id, step_result).await {
                        error!(error = %err, "failed to persist job result");
                    }
                }
                Err(handler_err) => {
                    if let Err(err) = deps
                        .workflows
                        .fail_step(&job.workflow_id, step, handler_err.detail.clone())
                        .await
                    {
                        error!(error = %err, "failed to persist failed step");
                    }
                    if let Err(err) = deps.jobs.set_error(&job.job_id, handler_err.job_error).await
                    {
                        error!(error = %err, "failed to persist job error");
                    }
                }
            }
        });
    }
}

async fn dispatch(deps: &Deps, ctx: &JobCtx, job: &JobRecord) -> Result<StepResult, HandlerError> {
    match job.operation {
        Operation::UploadVideo => handlers::upload::run(deps, ctx, job).await,
        Operation::ExtractAudio => handlers::extract_audio::run(deps, ctx, job).await,
        Operation::TranscribeAudio => handlers::transcribe::run(deps, ctx, job).await,
        Operation::EnhanceTranscription => handlers::enhance::run(deps, ctx, job).await,
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use pipeflow_collab::CollabResult;
    use pipeflow_collab::MockDemuxer;
    use pipeflow_collab::MockEnhancer;
    use pipeflow_collab::Recognizer;
    use pipeflow_collab::Transcript;
    use pipeflow_protocol::JobStatus;
    use pipeflow_protocol::StepStatus;
    use pipeflow_protocol::TranscriptionQuality;
    use pipeflow_store::ArtifactStore;
    use pipeflow_store::JobStateStore;
    use pipeflow_store::WorkflowStateStore;
    use serde_json::json;

    use super::*;

    struct DataDirGuard {
        prev: Option<String>,
    }

    impl DataDirGuard {
        fn set(dir: &Path) -> Self {
            let prev = env::var("PIPEFLOW_DATA_DIR").ok();
            unsafe {
                env::set_var("PIPEFLOW_DATA_DIR", dir);
            }
            Self { prev }
        }
    }

    impl Drop for DataDirGuard {
        fn drop(&mut self) {
            unsafe {
                match &self.prev {
                    Some(value) => env::set_var("PIPEFLOW_DATA_DIR", value),
                    None => env::remove_var("PIPEFLOW_DATA_DIR"),
                }
            }
        }
    }

    /// Sleeps long enough for a concurrent `cancel()` to land before
    /// returning, so the test can deterministically race the two writes.
    struct SlowRecognizer;

    #[async_trait]
    impl Recognizer for SlowRecognizer {
        async fn transcribe(
            &self,
            _audio_path: &std::path::Path,
            _quality: TranscriptionQuality,
            _language: Option<&str>,
        ) -> CollabResult<Transcript> {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(Transcript {
                raw_text: "slow transcript".to_string(),
                segments: Vec::new(),
                language: "en".to_string(),
                confidence: Some(1.0),
                service_used: "slow-mock".to_string(),
            })
        }
    }

    fn build_executor(artifacts: Arc<ArtifactStore>) -> (Executor, Arc<WorkflowStateStore>, Arc<JobStateStore>) {
        let workflows = Arc::new(WorkflowStateStore::new());
        let jobs = Arc::new(JobStateStore::new());
        let deps = Deps {
            workflows: workflows.clone(),
            jobs: jobs.clone(),
            artifacts,
            demuxer: Arc::new(MockDemuxer),
            local_recognizer: Arc::new(SlowRecognizer),
            cloud_recognizer: Arc::new(SlowRecognizer),
            enhancer: Arc::new(MockEnhancer),
            config: ExecutorConfig::default(),
        };
        (Executor::new(deps), workflows, jobs)
    }

    /// Exercises the cancel-vs-`fail_step`/`set_error` race directly: a
    /// `cancel()` lands while `transcribe`'s handler is still awaiting the
    /// (slow) recognizer. The handler's own post-await cancellation check
    /// then fails the step, but the job must stay `cancelled` rather than
    /// being overwritten back to `failed` by the handler's `set_error`.
    #[tokio::test]
    #[serial_test::serial]
    async fn cancel_mid_handler_wins_over_handlers_own_failure() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let _guard = DataDirGuard::set(tmp.path());

        let artifacts = Arc::new(ArtifactStore::new());
        let (executor, workflows, jobs) = build_executor(artifacts.clone());

        let wf = workflows.create_workflow().await.expect("create workflow");
        workflows
            .start_step(&wf.workflow_id, StepName::UploadVideo, false)
            .await
            .expect("start upload");
        workflows
            .complete_step(
                &wf.workflow_id,
                StepName::UploadVideo,
                StepResult::Upload {
                    video_url: "file:///tmp/v.mp4".to_string(),
                    size: 1,
                    format: "mp4".to_string(),
                    source_url: "https://example.com/v.mp4".to_string(),
                },
            )
            .await
            .expect("complete upload");

        let (audio_url, _info) = artifacts
            .store_bytes(&wf.workflow_id, b"fake audio bytes", "wav")
            .await
            .expect("store audio bytes");
        workflows
            .start_step(&wf.workflow_id, StepName::ExtractAudio, false)
            .await
            .expect("start extract");
        workflows
            .complete_step(
                &wf.workflow_id,
                StepName::ExtractAudio,
                StepResult::ExtractAudio {
                    audio_url,
                    audio_size: 17,
                    video_cleaned: false,
                    extraction_time_ms: 1,
                },
            )
            .await
            .expect("complete extract");

        let job = executor
            .submit(
                wf.workflow_id.clone(),
                Operation::TranscribeAudio,
                json!({ "use_azure": true }),
                false,
            )
            .await
            .expect("submit transcribe");

        // Give the background task time to pass its first cancellation
        // check and enter the (150ms) recognizer call before cancelling.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let cancelled = jobs
            .cancel(&job.job_id, Some("user requested".to_string()))
            .await
            .expect("cancel");
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        // Poll until the handler's background task finishes persisting.
        let mut final_job = jobs.get(&job.job_id).await.expect("get job");
        for _ in 0..100 {
            if final_job.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            final_job = jobs.get(&job.job_id).await.expect("get job");
        }

        assert_eq!(
            final_job.status,
            JobStatus::Cancelled,
            "a handler failure arriving after cancel() must not overwrite the job's cancelled status"
        );

        let workflow = workflows.get(&wf.workflow_id).await.expect("get workflow");
        let step = &workflow.steps[&StepName::TranscribeAudio];
        assert_eq!(step.status, StepStatus::Failed);
        let error = step.error.as_ref().expect("step should carry an error");
        assert_eq!(error.code, pipeflow_protocol::ErrorCode::Cancelled);
    }
}
