use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Opaque, server-chosen workflow identifier. Never parsed, only compared
/// and used as a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn new() -> Self {
        Self(format!("wf_{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept any non-empty opaque string, e.g. one round-tripped through a
    /// client. `spec.md` only requires that workflow ids are non-empty.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `job_<uuid>` in `8-4-4-4-12` hex form, per `spec.md` §6.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

const JOB_ID_PREFIX: &str = "job_";

impl JobId {
    pub fn new() -> Self {
        Self(format!("{JOB_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let uuid_part = raw.strip_prefix(JOB_ID_PREFIX)?;
        Uuid::parse_str(uuid_part).ok()?;
        Some(Self(raw.to_string()))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
