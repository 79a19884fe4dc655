use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::DateTime;
use chrono::Utc;
use pipeflow_protocol::ErrorDetail;
use pipeflow_protocol::StepName;
use pipeflow_protocol::StepRecord;
use pipeflow_protocol::StepResult;
use pipeflow_protocol::StepStatus;
use pipeflow_protocol::WorkflowId;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::dependency;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::migrations;
use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub schema_version: u32,
    pub workflow_id: WorkflowId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The initial user-supplied source reference, preserved verbatim for
    /// resume (`spec.md` §3); populated once `upload_video` is submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_options: Option<serde_json::Value>,
    pub steps: HashMap<StepName, StepRecord>,
}

impl WorkflowRecord {
    fn new(workflow_id: WorkflowId) -> Self {
        let now = Utc::now();
        let steps = StepName::ALL
            .into_iter()
            .map(|name| (name, StepRecord::pending()))
            .collect();
        Self {
            schema_version: migrations::CURRENT_SCHEMA_VERSION,
            workflow_id,
            created_at: now,
            updated_at: now,
            original_input: None,
            original_options: None,
            steps,
        }
    }

    /// `spec.md` §3's downstream invalidation rule for a forced restart: a
    /// step being re-run resets every step whose precondition chain passes
    /// through it back to `pending`, discarding their stored results.
    fn cascade_reset(&mut self, from: StepName) {
        for name in StepName::ALL {
            if depends_transitively_on(name, from) {
                self.steps.insert(name, StepRecord::pending());
            }
        }
    }
}

fn depends_transitively_on(step: StepName, ancestor: StepName) -> bool {
    let mut current = step.dependency();
    while let Some(dep) = current {
        if dep == ancestor {
            return true;
        }
        current = dep.dependency();
    }
    false
}

/// Persists [`WorkflowRecord`]s under `<data_root>/workflows/`, serializing
/// concurrent writers to the same workflow with a per-id keyed lock rather
/// than the single global run lock a one-workflow-at-a-time tool can get
/// away with.
pub struct WorkflowStateStore {
    locks: StdMutex<HashMap<WorkflowId, Arc<AsyncMutex<()>>>>,
}

impl Default for WorkflowStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStateStore {
    pub fn new() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, workflow_id: &WorkflowId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poison| poison.into_inner());
        locks
            .entry(workflow_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn create_workflow(&self) -> StoreResult<WorkflowRecord> {
        let record = WorkflowRecord::new(WorkflowId::new());
        let lock = self.lock_for(&record.workflow_id);
        let _guard = lock.lock().await;
        persist(&record).await?;
        Ok(record)
    }

    pub async fn get(&self, workflow_id: &WorkflowId) -> StoreResult<WorkflowRecord> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        load(workflow_id).await
    }

    /// Merges the top-level `original_input`/`original_options` fields,
    /// per `spec.md` §4.B's `update(workflow_id, partial)`. Either field
    /// left `None` is left untouched.
    pub async fn update_original(
        &self,
        workflow_id: &WorkflowId,
        original_input: Option<serde_json::Value>,
        original_options: Option<serde_json::Value>,
    ) -> StoreResult<()> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut record = load(workflow_id).await?;
        if let Some(input) = original_input {
            record.original_input = Some(input);
        }
        if let Some(options) = original_options {
            record.original_options = Some(options);
        }
        record.updated_at = Utc::now();
        persist(&record).await
    }

    pub async fn get_step_result(
        &self,
        workflow_id: &WorkflowId,
        step: StepName,
    ) -> StoreResult<Option<StepResult>> {
        let record = self.get(workflow_id).await?;
        Ok(record.steps.get(&step).and_then(|s| s.result.clone()))
    }

    /// Checks the precondition chain and transitions `step` to `running`.
    /// Returns [`StoreError::StepAlreadyRunning`] if the step is mid-flight
    /// (the HTTP surface maps this to a `409`), and
    /// [`StoreError::StepPrecondition`] if its dependency has not completed.
    ///
    /// `force` allows re-running an already-`completed` step (`spec.md`
    /// §4.B's "completed-but-being-force-restarted" precondition): every
    /// step downstream of `step` is cascaded back to `pending` first, per
    /// `spec.md` §9's forced-restart resolution, discarding results that
    /// were computed from the now-stale upstream output.
    pub async fn start_step(
        &self,
        workflow_id: &WorkflowId,
        step: StepName,
        force: bool,
    ) -> StoreResult<()> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut record = load(workflow_id).await?;

        if let Some(existing) = record.steps.get(&step) {
            match existing.status {
                StepStatus::Running => return Err(StoreError::StepAlreadyRunning(step)),
                StepStatus::Completed if !force => {
                    return Err(StoreError::StepAlreadyCompleted(step));
                }
                StepStatus::Completed => record.cascade_reset(step),
                StepStatus::Pending | StepStatus::Failed | StepStatus::Skipped => {}
            }
        }
        dependency::check_precondition(&record.steps, step)?;

        record.steps.insert(
            step,
            StepRecord {
                status: StepStatus::Running,
                started_at: Some(Utc::now()),
                completed_at: None,
                failed_at: None,
                error: None,
                result: None,
            },
        );
        record.updated_at = Utc::now();
        persist(&record).await
    }

    pub async fn complete_step(
        &self,
        workflow_id: &WorkflowId,
        step: StepName,
        result: StepResult,
    ) -> StoreResult<()> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut record = load(workflow_id).await?;
        let started_at = record.steps.get(&step).and_then(|s| s.started_at);
        record.steps.insert(
            step,
            StepRecord {
                status: StepStatus::Completed,
                started_at,
                completed_at: Some(Utc::now()),
                failed_at: None,
                error: None,
                result: Some(result),
            },
        );
        record.updated_at = Utc::now();
        persist(&record).await
    }

    /// Records the outcome of one of the four immediate analysis steps
    /// (`summarize_content`, `extract_key_points`, `analyze_sentiment`,
    /// `identify_topics`). Unlike [`Self::start_step`]/[`Self::complete_step`],
    /// this overwrites the step unconditionally once its dependency is
    /// satisfied: an immediate endpoint is a stateless re-computation over
    /// already-completed upstream text, not a resumable long-running stage,
    /// so repeat calls simply refresh the stored result.
    pub async fn record_immediate_result(
        &self,
        workflow_id: &WorkflowId,
        step: StepName,
        result: StepResult,
    ) -> StoreResult<()> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut record = load(workflow_id).await?;
        dependency::check_precondition(&record.steps, step)?;
        let now = Utc::now();
        record.steps.insert(
            step,
            StepRecord {
                status: StepStatus::Completed,
                started_at: Some(now),
                completed_at: Some(now),
                failed_at: None,
                error: None,
                result: Some(result),
            },
        );
        record.updated_at = now;
        persist(&record).await
    }

    pub async fn fail_step(
        &self,
        workflow_id: &WorkflowId,
        step: StepName,
        error: ErrorDetail,
    ) -> StoreResult<()> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut record = load(workflow_id).await?;
        let started_at = record.steps.get(&step).and_then(|s| s.started_at);
        record.steps.insert(
            step,
            StepRecord {
                status: StepStatus::Failed,
                started_at,
                completed_at: None,
                failed_at: Some(Utc::now()),
                error: Some(error),
                result: None,
            },
        );
        record.updated_at = Utc::now();
        persist(&record).await
    }

    /// Marks every step still `running` at process start as `failed` with
    /// a `RESTART_INTERRUPTED` error, per `spec.md` §9's restart-recovery
    /// resolution: an interrupted step is never silently resumed from
    /// mid-flight, it must be explicitly re-run by the caller. `running →
    /// skipped` is not a legal transition, so this lands on `failed` the
    /// same as any other aborted step.
    pub async fn sweep_interrupted(&self, workflow_id: &WorkflowId) -> StoreResult<usize> {
        use pipeflow_protocol::ErrorCode;

        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut record = load(workflow_id).await?;
        let mut swept = 0usize;
        for name in StepName::ALL {
            if let Some(existing) = record.steps.get(&name)
                && existing.status == StepStatus::Running
            {
                warn!(workflow_id = %workflow_id, step = ?name, "sweeping interrupted step");
                record.steps.insert(
                    name,
                    StepRecord {
                        status: StepStatus::Failed,
                        started_at: existing.started_at,
                        completed_at: None,
                        failed_at: Some(Utc::now()),
                        error: Some(ErrorDetail::new(
                            ErrorCode::RestartInterrupted,
                            "process restarted while this step was running",
                        )),
                        result: None,
                    },
                );
                swept += 1;
            }
        }
        if swept > 0 {
            record.updated_at = Utc::now();
            persist(&record).await?;
        }
        Ok(swept)
    }

    /// Lists all workflow ids with a persisted record, used by the
    /// executor at startup to sweep interrupted steps after a crash.
    pub async fn list_ids(&self) -> StoreResult<Vec<WorkflowId>> {
        let dir = paths::workflows_dir();
        paths::ensure_dir(&dir).await?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::io(dir.display().to_string(), e))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Some(id) = WorkflowId::parse(stem)
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

async fn load(workflow_id: &WorkflowId) -> StoreResult<WorkflowRecord> {
    let path = paths::workflow_file(workflow_id);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| StoreError::WorkflowNotFound(workflow_id.clone()))?;
    let (value, migrated) = match migrations::upgrade(&raw) {
        Ok(result) => result,
        Err(err) => {
            backup_corrupt_file(&path).await?;
            return Err(err);
        }
    };
    let mut record: WorkflowRecord = serde_json::from_value(value)?;
    record.schema_version = migrations::CURRENT_SCHEMA_VERSION;
    if migrated {
        persist(&record).await?;
    }
    Ok(record)
}

async fn persist(record: &WorkflowRecord) -> StoreResult<()> {
    let path = paths::workflow_file(&record.workflow_id);
    if let Some(dir) = path.parent() {
        paths::ensure_dir(dir).await?;
    }
    let json = serde_json::to_string_pretty(record)? + "\n";
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| StoreError::io(tmp_path.display().to_string(), e))?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| StoreError::io(path.display().to_string(), e))?;
    Ok(())
}

async fn backup_corrupt_file(path: &Path) -> StoreResult<Option<PathBuf>> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let backup_path = path.with_extension(format!("json.corrupt-{timestamp}"));
        tokio::fs::rename(path, &backup_path)
            .await
            .map_err(|e| StoreError::io(path.display().to_string(), e))?;
        Ok(Some(backup_path))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeflow_protocol::ErrorCode;
    use std::env;

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

    #[tokio::test]
    #[serial_test::serial]
    async fn create_then_get_round_trips() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let _guard = DataDirGuard::set(tmp.path());
        let store = WorkflowStateStore::new();
        let created = store.create_workflow().await.expect("create");
        let fetched = store.get(&created.workflow_id).await.expect("get");
        assert_eq!(fetched.workflow_id, created.workflow_id);
        assert_eq!(
            fetched.steps[&StepName::UploadVideo].status,
            StepStatus::Pending
        );
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn step_requires_dependency_completed() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let _guard = DataDirGuard::set(tmp.path());
        let store = WorkflowStateStore::new();
        let wf = store.create_workflow().await.expect("create");

        let err = store
            .start_step(&wf.workflow_id, StepName::ExtractAudio, false)
            .await
            .expect_err("should reject out-of-order step");
        assert!(matches!(err, StoreError::StepPrecondition { .. }));

        store
            .start_step(&wf.workflow_id, StepName::UploadVideo, false)
            .await
            .expect("start upload");
        store
            .complete_step(
                &wf.workflow_id,
                StepName::UploadVideo,
                StepResult::Upload {
                    video_url: "file:///tmp/video.mp4".to_string(),
                    size: 1024,
                    format: "mp4".to_string(),
                    source_url: "https://example.com/video.mp4".to_string(),
                },
            )
            .await
            .expect("complete upload");

        store
            .start_step(&wf.workflow_id, StepName::ExtractAudio, false)
            .await
            .expect("extract-audio should now be allowed");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn starting_a_running_step_twice_conflicts() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let _guard = DataDirGuard::set(tmp.path());
        let store = WorkflowStateStore::new();
        let wf = store.create_workflow().await.expect("create");
        store
            .start_step(&wf.workflow_id, StepName::UploadVideo, false)
            .await
            .expect("first start");
        let err = store
            .start_step(&wf.workflow_id, StepName::UploadVideo, false)
            .await
            .expect_err("second start should conflict");
        assert!(matches!(err, StoreError::StepAlreadyRunning(_)));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn sweep_interrupted_marks_running_steps_failed() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let _guard = DataDirGuard::set(tmp.path());
        let store = WorkflowStateStore::new();
        let wf = store.create_workflow().await.expect("create");
        store
            .start_step(&wf.workflow_id, StepName::UploadVideo, false)
            .await
            .expect("start");

        let swept = store
            .sweep_interrupted(&wf.workflow_id)
            .await
            .expect("sweep");
        assert_eq!(swept, 1);

        let record = store.get(&wf.workflow_id).await.expect("get");
        let upload = &record.steps[&StepName::UploadVideo];
        assert_eq!(upload.status, StepStatus::Failed);
        assert_eq!(upload.error.as_ref().map(|e| e.code), Some(ErrorCode::RestartInterrupted));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn force_restart_cascades_to_downstream_steps() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let _guard = DataDirGuard::set(tmp.path());
        let store = WorkflowStateStore::new();
        let wf = store.create_workflow().await.expect("create");

        store
            .start_step(&wf.workflow_id, StepName::UploadVideo, false)
            .await
            .expect("start upload");
        store
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
        store
            .start_step(&wf.workflow_id, StepName::ExtractAudio, false)
            .await
            .expect("start extract");
        store
            .complete_step(
                &wf.workflow_id,
                StepName::ExtractAudio,
                StepResult::ExtractAudio {
                    audio_url: "file:///tmp/a.wav".to_string(),
                    audio_size: 1,
                    video_cleaned: false,
                    extraction_time_ms: 1,
                },
            )
            .await
            .expect("complete extract");

        let err = store
            .start_step(&wf.workflow_id, StepName::UploadVideo, false)
            .await
            .expect_err("re-running a completed step without force should conflict");
        assert!(matches!(err, StoreError::StepAlreadyCompleted(_)));

        store
            .start_step(&wf.workflow_id, StepName::UploadVideo, true)
            .await
            .expect("force restart");

        let record = store.get(&wf.workflow_id).await.expect("get");
        assert_eq!(
            record.steps[&StepName::UploadVideo].status,
            StepStatus::Running
        );
        assert_eq!(
            record.steps[&StepName::ExtractAudio].status,
            StepStatus::Pending
        );
    }
}
