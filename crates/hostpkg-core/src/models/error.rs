use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::models::{ManagerAction, PackageManagerId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    /// The probe found no manager binary on the target.
    ManagerNotAvailable,
    /// The manager ran and exited non-zero.
    ManagerError,
    /// The shell protocol contract was violated.
    UnexpectedError,
    Transport,
    Timeout,
    Cancelled,
    InvalidInput,
    StorageFailure,
    Internal,
}

impl CoreErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManagerNotAvailable => "manager not available",
            Self::ManagerError => "manager error",
            Self::UnexpectedError => "unexpected error",
            Self::Transport => "transport error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::InvalidInput => "invalid input",
            Self::StorageFailure => "storage failure",
            Self::Internal => "internal error",
        }
    }
}

impl Display for CoreErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{}{}: {}", scope_prefix(.manager), .kind, .message)]
pub struct CoreError {
    pub manager: Option<PackageManagerId>,
    pub action: Option<ManagerAction>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            manager: None,
            action: None,
            kind,
            message: message.into(),
        }
    }

    /// Attributes the error to a manager operation, keeping any attribution
    /// that is already present.
    pub fn attributed(mut self, manager: PackageManagerId, action: ManagerAction) -> Self {
        self.manager.get_or_insert(manager);
        self.action.get_or_insert(action);
        self
    }
}

fn scope_prefix(manager: &Option<PackageManagerId>) -> String {
    match manager {
        Some(manager) => format!("{manager} package resource: "),
        None => String::new(),
    }
}
