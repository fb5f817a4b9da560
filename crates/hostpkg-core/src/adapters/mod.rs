pub mod client;
pub mod flatpak;
pub mod protocol;
pub mod snap;

pub use client::{ClientFuture, ClientResult, PackageManagerClient, ShellPackageClient};
pub use flatpak::FLATPAK_SYNTAX;
pub use protocol::{ManagerSyntax, parse_inventory, validate_package_name};
pub use snap::SNAP_SYNTAX;
