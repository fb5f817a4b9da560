use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageManagerId {
    Snap,
    Flatpak,
}

impl PackageManagerId {
    pub const ALL: [PackageManagerId; 2] = [Self::Snap, Self::Flatpak];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snap => "snap",
            Self::Flatpak => "flatpak",
        }
    }
}

impl Display for PackageManagerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PackageManagerId {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "snap" => Ok(Self::Snap),
            "flatpak" => Ok(Self::Flatpak),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ManagerAction {
    ListInstalled,
    Install,
    Uninstall,
}

impl ManagerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListInstalled => "list_installed",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PackageManagerId;

    #[test]
    fn manager_ids_round_trip_through_their_string_form() {
        for id in PackageManagerId::ALL {
            assert_eq!(id.as_str().parse::<PackageManagerId>(), Ok(id));
        }
        assert!("apt".parse::<PackageManagerId>().is_err());
    }

    #[test]
    fn manager_ids_serialize_as_snake_case() {
        let raw = serde_json::to_string(&PackageManagerId::Flatpak).unwrap();
        assert_eq!(raw, "\"flatpak\"");
    }
}
