use std::collections::HashMap;

use pipeflow_protocol::StepName;
use pipeflow_protocol::StepRecord;
use pipeflow_protocol::StepStatus;

use crate::error::StoreError;
use crate::error::StoreResult;

/// Checks that `step`'s dependency, if any, has completed — per `spec.md`
/// §3's precondition chain (`ExtractAudio` needs `UploadVideo` completed,
/// and so on).
pub fn check_precondition(
    steps: &HashMap<StepName, StepRecord>,
    step: StepName,
) -> StoreResult<()> {
    let Some(dependency) = step.dependency() else {
        return Ok(());
    };
    let satisfied = steps
        .get(&dependency)
        .is_some_and(|record| record.status == StepStatus::Completed);
    if satisfied {
        Ok(())
    } else {
        Err(StoreError::StepPrecondition { step, dependency })
    }
}
