use crate::adapters::protocol::ManagerSyntax;
use crate::models::PackageManagerId;

pub const SNAP_SYNTAX: ManagerSyntax = ManagerSyntax {
    manager: PackageManagerId::Snap,
    tool: "snap",
    list_command: "snap list",
    install_command: "snap install",
    remove_command: "snap remove",
};
