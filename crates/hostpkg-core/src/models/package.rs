use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::PackageManagerId;

/// Version information for a package. An empty string means unknown or not
/// applicable.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PackageVersion {
    #[serde(default)]
    pub installed: String,
    #[serde(default)]
    pub available: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    Installed,
    NotInstalled,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Package {
    pub manager: PackageManagerId,
    pub name: String,
    #[serde(default)]
    pub version: PackageVersion,
    pub state: PackageState,
}

impl Package {
    pub fn installed(manager: PackageManagerId, name: impl Into<String>) -> Self {
        Self::with_state(manager, name, PackageState::Installed)
    }

    pub fn not_installed(manager: PackageManagerId, name: impl Into<String>) -> Self {
        Self::with_state(manager, name, PackageState::NotInstalled)
    }

    pub fn with_state(
        manager: PackageManagerId,
        name: impl Into<String>,
        state: PackageState,
    ) -> Self {
        Self {
            manager,
            name: name.into(),
            version: PackageVersion::default(),
            state,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.state == PackageState::Installed
    }
}

/// Ordered sequence of packages.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageCollection {
    packages: Vec<Package>,
}

impl PackageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, package: Package) {
        self.packages.push(package);
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Package> {
        self.packages.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Package> {
        self.packages.iter_mut()
    }

    pub fn as_slice(&self) -> &[Package] {
        &self.packages
    }

    pub fn filter(&self, predicate: impl Fn(&Package) -> bool) -> Self {
        self.packages
            .iter()
            .filter(|package| predicate(package))
            .cloned()
            .collect()
    }

    pub fn filter_names<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let wanted: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
        self.filter(|package| wanted.contains(package.name.as_str()))
    }

    pub fn filter_state(&self, state: PackageState) -> Self {
        self.filter(|package| package.state == state)
    }

    /// Stable sort by name; packages with equal names keep their relative order.
    pub fn sort_by_name(&mut self) {
        self.packages.sort_by(|left, right| left.name.cmp(&right.name));
    }

    pub fn sorted_by_name(mut self) -> Self {
        self.sort_by_name();
        self
    }

    /// Name-keyed projection. Later duplicates overwrite earlier entries.
    pub fn to_map(&self) -> BTreeMap<String, Package> {
        self.packages
            .iter()
            .map(|package| (package.name.clone(), package.clone()))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.packages
            .iter()
            .map(|package| package.name.clone())
            .collect()
    }
}

impl FromIterator<Package> for PackageCollection {
    fn from_iter<T: IntoIterator<Item = Package>>(iter: T) -> Self {
        Self {
            packages: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Package>> for PackageCollection {
    fn from(packages: Vec<Package>) -> Self {
        Self { packages }
    }
}

impl IntoIterator for PackageCollection {
    type Item = Package;
    type IntoIter = std::vec::IntoIter<Package>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.into_iter()
    }
}

impl<'a> IntoIterator for &'a PackageCollection {
    type Item = &'a Package;
    type IntoIter = std::slice::Iter<'a, Package>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter()
    }
}
