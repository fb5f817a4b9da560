pub mod error;
pub mod manager;
pub mod package;

pub use error::{CoreError, CoreErrorKind};
pub use manager::{ManagerAction, PackageManagerId};
pub use package::{Package, PackageCollection, PackageState, PackageVersion};
