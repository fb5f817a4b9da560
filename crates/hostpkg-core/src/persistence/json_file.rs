use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::models::{CoreError, CoreErrorKind};
use crate::persistence::{PersistenceResult, StateStore, decode_unit, encode_unit, storage_error};
use crate::reconcile::UnitRecord;

const RECORD_EXTENSION: &str = "json";

/// One `<unit>.json` file per unit inside a directory.
pub struct JsonFileStateStore {
    directory: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn unit_path(&self, unit: &str) -> PersistenceResult<PathBuf> {
        validate_unit_name(unit)?;
        Ok(self.directory.join(format!("{unit}.{RECORD_EXTENSION}")))
    }
}

impl StateStore for JsonFileStateStore {
    fn load_unit(&self, unit: &str) -> PersistenceResult<Option<UnitRecord>> {
        let path = self.unit_path(unit)?;
        match fs::read_to_string(&path) {
            Ok(raw) => decode_unit(unit, &raw).map(Some),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(storage_error(
                "load_unit",
                format!("{}: {error}", path.display()),
            )),
        }
    }

    fn save_unit(&self, unit: &str, record: &UnitRecord) -> PersistenceResult<()> {
        let path = self.unit_path(unit)?;
        let encoded = encode_unit(unit, record)?;

        fs::create_dir_all(&self.directory).map_err(|error| {
            storage_error(
                "save_unit",
                format!("{}: {error}", self.directory.display()),
            )
        })?;

        // Write a sibling and rename so readers never see a partial record.
        let staging = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
        fs::write(&staging, encoded)
            .map_err(|error| storage_error("save_unit", format!("{}: {error}", staging.display())))?;
        fs::rename(&staging, &path)
            .map_err(|error| storage_error("save_unit", format!("{}: {error}", path.display())))
    }

    fn remove_unit(&self, unit: &str) -> PersistenceResult<()> {
        let path = self.unit_path(unit)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(storage_error(
                "remove_unit",
                format!("{}: {error}", path.display()),
            )),
        }
    }

    fn list_units(&self) -> PersistenceResult<Vec<String>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(storage_error(
                    "list_units",
                    format!("{}: {error}", self.directory.display()),
                ));
            }
        };

        let mut units = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| storage_error("list_units", error.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
                && validate_unit_name(stem).is_ok()
            {
                units.push(stem.to_owned());
            }
        }

        units.sort();
        Ok(units)
    }
}

fn validate_unit_name(unit: &str) -> PersistenceResult<()> {
    let valid = !unit.is_empty()
        && unit != "."
        && unit != ".."
        && unit
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("unit name {unit:?} must be non-empty and use only [A-Za-z0-9._-]"),
        ))
    }
}
