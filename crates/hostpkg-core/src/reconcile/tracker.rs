use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind, PackageState};

/// Per package: was it already installed right before it was first managed?
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreInstalledRecord(BTreeMap<String, bool>);

impl PreInstalledRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Records the first observation for `name`. Returns false when the
    /// package was already tracked; its value is left untouched.
    pub fn remember(&mut self, name: &str, was_installed: bool) -> bool {
        if self.0.contains_key(name) {
            return false;
        }
        self.0.insert(name.to_owned(), was_installed);
        true
    }

    pub fn forget(&mut self, name: &str) -> Option<bool> {
        self.0.remove(name)
    }

    /// State that gives back what the host had before management began.
    pub fn restore_state(&self, name: &str) -> PackageState {
        match self.get(name) {
            Some(true) => PackageState::Installed,
            _ => PackageState::NotInstalled,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for PreInstalledRecord {
    fn from_iter<T: IntoIterator<Item = (S, bool)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}

/// Side-car state persisted with each managed unit.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct InternalState {
    #[serde(default, skip_serializing_if = "PreInstalledRecord::is_empty")]
    pub pre_installed: PreInstalledRecord,
}

impl InternalState {
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(|error| {
            CoreError::new(
                CoreErrorKind::StorageFailure,
                format!("failed to encode internal state: {error}"),
            )
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::StorageFailure,
                format!("failed to decode internal state: {error}"),
            )
        })
    }
}
