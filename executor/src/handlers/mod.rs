pub mod enhance;
pub mod extract_audio;
pub mod immediate;
pub mod transcribe;
pub mod upload;

use std::sync::Arc;

use pipeflow_collab::Demuxer;
use pipeflow_collab::Enhancer;
use pipeflow_collab::Recognizer;
use pipeflow_protocol::JobId;
use pipeflow_protocol::WorkflowId;
use pipeflow_store::ArtifactStore;
use pipeflow_store::JobStateStore;
use pipeflow_store::WorkflowStateStore;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;

/// Shared handles every handler needs: the three stores and the three
/// collaborator traits, plus the tunables from [`ExecutorConfig`].
pub struct Deps {
    pub workflows: Arc<WorkflowStateStore>,
    pub jobs: Arc<JobStateStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub demuxer: Arc<dyn Demuxer>,
    pub local_recognizer: Arc<dyn Recognizer>,
    pub cloud_recognizer: Arc<dyn Recognizer>,
    pub enhancer: Arc<dyn Enhancer>,
    pub config: ExecutorConfig,
}

/// Per-job context threaded through a job-based handler.
pub struct JobCtx {
    pub workflow_id: WorkflowId,
    pub job_id: JobId,
    pub cancel: CancellationToken,
}

impl JobCtx {
    pub fn cancelled(&self) -> Result<(), crate::error::HandlerError> {
        if self.cancel.is_cancelled() {
            Err(crate::error::HandlerError::cancelled())
        } else {
            Ok(())
        }
    }
}
