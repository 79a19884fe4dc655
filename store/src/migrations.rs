use serde_json::Value;

use crate::error::StoreError;
use crate::error::StoreResult;

/// Current on-disk schema version for both workflow and job records.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Upgrades a freshly-deserialized record to [`CURRENT_SCHEMA_VERSION`] in
/// place, returning whether a migration actually ran (callers use this to
/// decide whether to rewrite the file back to disk).
pub fn upgrade(raw: &str) -> StoreResult<(Value, bool)> {
    let mut value: Value = serde_json::from_str(raw)?;
    let version = value
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok((value, false));
    }

    // No migrations exist yet: CURRENT_SCHEMA_VERSION is the first version
    // this store has ever written. A future bump adds a `version => { ... }`
    // arm here, mirroring the match in the version loop this replaced.
    Err(StoreError::NoMigrationPath(version))
}
