use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use pipeflow_executor::Executor;
use pipeflow_store::JobStateStore;
use pipeflow_store::WorkflowStateStore;

/// Shared axum `State`: the two persisted stores (needed directly by
/// read-only routes) plus the executor that owns the handler dispatch and
/// concurrency limits.
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    workflows: Arc<WorkflowStateStore>,
    jobs: Arc<JobStateStore>,
    executor: Executor,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        workflows: Arc<WorkflowStateStore>,
        jobs: Arc<JobStateStore>,
        executor: Executor,
    ) -> Self {
        Self(Arc::new(Inner {
            workflows,
            jobs,
            executor,
            started_at: Utc::now(),
        }))
    }

    pub fn workflows(&self) -> &WorkflowStateStore {
        &self.0.workflows
    }

    pub fn jobs(&self) -> &JobStateStore {
        &self.0.jobs
    }

    pub fn executor(&self) -> &Executor {
        &self.0.executor
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.0.started_at).num_seconds().max(0) as u64
    }
}
