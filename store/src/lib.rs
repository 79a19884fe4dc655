//! Persistence for workflows, jobs, and artifacts: the A/B/C components of
//! `spec.md` §4.

pub mod artifact;
pub mod dependency;
pub mod error;
pub mod job_store;
pub mod migrations;
pub mod paths;
pub mod workflow_store;

pub use artifact::ArtifactInfo;
pub use artifact::ArtifactStore;
pub use error::StoreError;
pub use error::StoreResult;
pub use job_store::JobStateStore;
pub use workflow_store::WorkflowRecord;
pub use workflow_store::WorkflowStateStore;

/// Default retention for terminal job records before [`JobStateStore::purge_expired`]
/// deletes them, per `spec.md` §9's "choose a configurable default (e.g. 24h)".
pub const JOB_TTL_DEFAULT: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);
