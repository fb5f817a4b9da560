pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStateStore;
pub use memory::InMemoryStateStore;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};
use crate::reconcile::UnitRecord;

pub type PersistenceResult<T> = Result<T, CoreError>;

pub const UNIT_RECORD_SCHEMA_VERSION: u32 = 1;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Durable home for unit records, keyed by unit name.
pub trait StateStore: Send + Sync {
    fn load_unit(&self, unit: &str) -> PersistenceResult<Option<UnitRecord>>;

    fn save_unit(&self, unit: &str, record: &UnitRecord) -> PersistenceResult<()>;

    /// Removing an unknown unit is not an error.
    fn remove_unit(&self, unit: &str) -> PersistenceResult<()>;

    /// Stored unit names, sorted.
    fn list_units(&self) -> PersistenceResult<Vec<String>>;
}

#[derive(Serialize)]
struct UnitEnvelopeRef<'a> {
    schema_version: u32,
    unit: &'a str,
    record: &'a UnitRecord,
}

#[derive(Deserialize)]
struct UnitEnvelope {
    schema_version: u32,
    unit: String,
    record: serde_json::Value,
}

pub(crate) fn encode_unit(unit: &str, record: &UnitRecord) -> PersistenceResult<String> {
    let envelope = UnitEnvelopeRef {
        schema_version: UNIT_RECORD_SCHEMA_VERSION,
        unit,
        record,
    };
    serde_json::to_string_pretty(&envelope)
        .map_err(|error| storage_error("encode_unit", format!("{unit}: {error}")))
}

pub(crate) fn decode_unit(unit: &str, raw: &str) -> PersistenceResult<UnitRecord> {
    let envelope: UnitEnvelope = serde_json::from_str(raw)
        .map_err(|error| storage_error("decode_unit", format!("{unit}: {error}")))?;

    if envelope.schema_version != UNIT_RECORD_SCHEMA_VERSION {
        return Err(storage_error(
            "decode_unit",
            format!(
                "{unit}: unsupported schema version {} (expected {UNIT_RECORD_SCHEMA_VERSION})",
                envelope.schema_version
            ),
        ));
    }

    if envelope.unit != unit {
        return Err(storage_error(
            "decode_unit",
            format!("record for unit {} stored under {unit}", envelope.unit),
        ));
    }

    serde_json::from_value(envelope.record)
        .map_err(|error| storage_error("decode_unit", format!("{unit}: {error}")))
}

pub(crate) fn storage_error(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("{operation}: {}", message.as_ref()),
    )
}

#[cfg(test)]
mod tests {
    use super::{decode_unit, encode_unit};
    use crate::models::{CoreErrorKind, PackageManagerId};
    use crate::reconcile::{DesiredSet, InternalState, ResourceIdentity, UnitRecord};

    fn record() -> UnitRecord {
        UnitRecord {
            manager: PackageManagerId::Snap,
            identity: ResourceIdentity::from_names(&["core", "hello"]),
            declared: DesiredSet::new(["hello", "core"]),
            internal: InternalState {
                pre_installed: [("core", true), ("hello", false)].into_iter().collect(),
            },
        }
    }

    #[test]
    fn envelope_carries_schema_version_and_internal_state_shape() {
        let raw = encode_unit("tools", &record()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["record"]["identity"], "core|hello");
        assert_eq!(
            value["record"]["internal"],
            serde_json::json!({"pre_installed": {"core": true, "hello": false}})
        );
        assert_eq!(decode_unit("tools", &raw).unwrap(), record());
    }

    #[test]
    fn unknown_schema_versions_are_rejected() {
        let raw = encode_unit("tools", &record())
            .unwrap()
            .replace("\"schema_version\": 1", "\"schema_version\": 9");

        let error = decode_unit("tools", &raw).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::StorageFailure);
        assert!(error.message.contains("unsupported schema version 9"));
    }

    #[test]
    fn records_stored_under_another_name_are_rejected() {
        let raw = encode_unit("tools", &record()).unwrap();
        let error = decode_unit("other", &raw).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::StorageFailure);
    }
}
