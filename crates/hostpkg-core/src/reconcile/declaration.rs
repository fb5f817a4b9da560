use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::adapters::validate_package_name;
use crate::models::{CoreError, CoreErrorKind, Package, PackageManagerId};
use crate::reconcile::ReconcileResult;

pub const IDENTITY_DELIMITER: char = '|';

/// Package names declared for one managed unit, in declaration order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredSet {
    names: Vec<String>,
}

impl DesiredSet {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name-keyed packages for `manager`. Empty, unquotable or duplicate
    /// names are rejected.
    pub fn expand(&self, manager: PackageManagerId) -> ReconcileResult<BTreeMap<String, Package>> {
        let mut packages = BTreeMap::new();

        for name in &self.names {
            validate_package_name(name).map_err(|error| scoped(error, manager))?;

            if name.contains(IDENTITY_DELIMITER) {
                return Err(invalid(
                    manager,
                    format!("package name {name} must not contain '{IDENTITY_DELIMITER}'"),
                ));
            }

            if packages.contains_key(name) {
                return Err(invalid(manager, format!("duplicate package name {name}")));
            }

            packages.insert(name.clone(), Package::installed(manager, name.as_str()));
        }

        Ok(packages)
    }
}

impl<S: Into<String>> FromIterator<S> for DesiredSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Stable identity of a managed unit: its desired names, sorted and joined
/// with `|`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIdentity(String);

impl ResourceIdentity {
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut sorted: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();
        Self(sorted.join(&IDENTITY_DELIMITER.to_string()))
    }

    pub fn parse(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names recovered from the identity. The empty identity has none.
    pub fn names(&self) -> Vec<String> {
        self.0
            .split(IDENTITY_DELIMITER)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

impl Display for ResourceIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn invalid(manager: PackageManagerId, message: String) -> CoreError {
    CoreError {
        manager: Some(manager),
        action: None,
        kind: CoreErrorKind::InvalidInput,
        message,
    }
}

fn scoped(mut error: CoreError, manager: PackageManagerId) -> CoreError {
    error.manager.get_or_insert(manager);
    error
}
