use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::Utc;
use pipeflow_protocol::JobError;
use pipeflow_protocol::JobId;
use pipeflow_protocol::JobRecord;
use pipeflow_protocol::JobStatus;
use pipeflow_protocol::Operation;
use pipeflow_protocol::StepResult;
use pipeflow_protocol::WorkflowId;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::StoreError;
use crate::error::StoreResult;
use crate::paths;

/// Persists [`JobRecord`]s under `<data_root>/jobs/` and holds the
/// in-memory [`CancellationToken`] table that lets `POST /jobs/{id}/cancel`
/// interrupt a job's executor task without a shared global interrupt flag.
pub struct JobStateStore {
    locks: StdMutex<HashMap<JobId, Arc<AsyncMutex<()>>>>,
    tokens: StdMutex<HashMap<JobId, CancellationToken>>,
}

impl Default for JobStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStateStore {
    pub fn new() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
            tokens: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, job_id: &JobId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poison| poison.into_inner());
        locks
            .entry(job_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn create_job(
        &self,
        workflow_id: WorkflowId,
        operation: Operation,
        input_params: Value,
    ) -> StoreResult<JobRecord> {
        let record = JobRecord::new(workflow_id, operation, input_params);
        let lock = self.lock_for(&record.job_id);
        let _guard = lock.lock().await;
        self.tokens
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(record.job_id.clone(), CancellationToken::new());
        persist(&record).await?;
        Ok(record)
    }

    pub async fn get(&self, job_id: &JobId) -> StoreResult<JobRecord> {
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;
        load(job_id).await
    }

    pub async fn list_by_workflow(&self, workflow_id: &WorkflowId) -> StoreResult<Vec<JobRecord>> {
        let dir = paths::jobs_dir();
        paths::ensure_dir(&dir).await?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::io(dir.display().to_string(), e))?;
        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            if let Ok(job) = serde_json::from_str::<JobRecord>(&raw)
                && &job.workflow_id == workflow_id
            {
                jobs.push(job);
            }
        }
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    pub async fn mark_running(&self, job_id: &JobId) -> StoreResult<()> {
        self.update(job_id, |job| {
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Running;
            job.started_at.get_or_insert(Utc::now());
            job.message = "processing".to_string();
        })
        .await
    }

    /// Clamps to `max(current, new)`: progress ticks are reported from
    /// concurrently-spawned tasks with no ordering guarantee between them,
    /// so a late-arriving stale tick must not regress `job.progress`.
    pub async fn update_progress(
        &self,
        job_id: &JobId,
        progress: u8,
        message: impl Into<String>,
    ) -> StoreResult<()> {
        let message = message.into();
        self.update(job_id, |job| {
            if job.status.is_terminal() {
                return;
            }
            job.progress = progress.min(100).max(job.progress);
            job.message = message.clone();
        })
        .await
    }

    /// No-op once the job is already terminal: a cancellation that lands
    /// while the executor task is still running a handler must win over
    /// whatever that task later tries to write.
    pub async fn set_result(&self, job_id: &JobId, result: StepResult) -> StoreResult<()> {
        self.update(job_id, |job| {
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.message = "completed".to_string();
            job.completed_at = Some(Utc::now());
            job.result = Some(result.clone());
        })
        .await
    }

    /// No-op once the job is already terminal, for the same reason as
    /// [`Self::set_result`].
    pub async fn set_error(&self, job_id: &JobId, error: JobError) -> StoreResult<()> {
        self.update(job_id, |job| {
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.message = error.message.clone();
            job.error = Some(error.clone());
        })
        .await
    }

    /// Requests cancellation. The job transitions to `cancelled` once the
    /// executor task observes the token at its next suspension point; this
    /// only flips `cancel_reason`/timestamp and fires the token immediately.
    pub async fn cancel(&self, job_id: &JobId, reason: Option<String>) -> StoreResult<JobRecord> {
        if let Some(token) = self
            .tokens
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(job_id)
        {
            token.cancel();
        }
        let mut updated = None;
        self.update(job_id, |job| {
            job.cancelled_at = Some(Utc::now());
            job.cancel_reason = reason.clone();
            if !job.status.is_terminal() {
                job.status = JobStatus::Cancelled;
                job.message = "cancelled".to_string();
                job.completed_at = Some(Utc::now());
            }
            updated = Some(job.clone());
        })
        .await?;
        updated.ok_or_else(|| StoreError::JobNotFound(job_id.clone()))
    }

    pub fn cancellation_token(&self, job_id: &JobId) -> CancellationToken {
        self.tokens
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .entry(job_id.clone())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    async fn list_ids(&self) -> StoreResult<Vec<JobId>> {
        let dir = paths::jobs_dir();
        paths::ensure_dir(&dir).await?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::io(dir.display().to_string(), e))?;
        let mut job_ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Some(id) = JobId::parse(stem)
            {
                job_ids.push(id);
            }
        }
        Ok(job_ids)
    }

    /// Count of jobs currently `queued` or `running`, for `/health`'s
    /// `in_flight_jobs`.
    pub async fn count_active(&self) -> StoreResult<usize> {
        let mut active = 0usize;
        for job_id in self.list_ids().await? {
            if !self.get(&job_id).await?.status.is_terminal() {
                active += 1;
            }
        }
        Ok(active)
    }

    /// Deletes terminal job records older than `ttl`, per `spec.md` §4.C's
    /// `sweep()` contract and §9's "choose a configurable default" Open
    /// Question (resolved as 24h in [`crate::JOB_TTL_DEFAULT`]).
    pub async fn purge_expired(&self, ttl: std::time::Duration) -> StoreResult<usize> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let mut purged = 0usize;
        for job_id in self.list_ids().await? {
            let lock = self.lock_for(&job_id);
            let _guard = lock.lock().await;
            let job = match load(&job_id).await {
                Ok(job) => job,
                Err(StoreError::JobNotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            let Some(completed_at) = job.completed_at else {
                continue;
            };
            if job.status.is_terminal() && Utc::now() - completed_at > ttl {
                let path = paths::job_file(&job_id);
                if tokio::fs::remove_file(&path).await.is_ok() {
                    purged += 1;
                }
            }
        }
        Ok(purged)
    }

    /// Marks every job still `queued`/`running` at process start as
    /// `failed` with a retryable `RESTART_INTERRUPTED` error, mirroring
    /// [`crate::workflow_store::WorkflowStateStore::sweep_interrupted`].
    pub async fn sweep_interrupted(&self) -> StoreResult<usize> {
        use pipeflow_protocol::ErrorCode;

        let mut swept = 0usize;
        for job_id in self.list_ids().await? {
            let job = self.get(&job_id).await?;
            if !job.status.is_terminal() {
                warn!(job_id = %job_id, "sweeping interrupted job");
                self.set_error(
                    &job_id,
                    JobError::transient(
                        ErrorCode::RestartInterrupted,
                        "process restarted while this job was in flight",
                    ),
                )
                .await?;
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn update(
        &self,
        job_id: &JobId,
        mutate: impl FnOnce(&mut JobRecord),
    ) -> StoreResult<()> {
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;
        let mut job = load(job_id).await?;
        mutate(&mut job);
        persist(&job).await
    }
}

async fn load(job_id: &JobId) -> StoreResult<JobRecord> {
    let path = paths::job_file(job_id);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| StoreError::JobNotFound(job_id.clone()))?;
    Ok(serde_json::from_str(&raw)?)
}

async fn persist(job: &JobRecord) -> StoreResult<()> {
    let path = paths::job_file(&job.job_id);
    if let Some(dir) = path.parent() {
        paths::ensure_dir(dir).await?;
    }
    let json = serde_json::to_string_pretty(job)? + "\n";
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| StoreError::io(tmp_path.display().to_string(), e))?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| StoreError::io(path.display().to_string(), e))?;
    Ok(())
}
