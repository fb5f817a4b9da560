use crate::adapters::protocol::ManagerSyntax;
use crate::models::PackageManagerId;

// `flatpak list` prints no title row when stdout is not a terminal; the header
// line the inventory format expects is printed explicitly.
pub const FLATPAK_SYNTAX: ManagerSyntax = ManagerSyntax {
    manager: PackageManagerId::Flatpak,
    tool: "flatpak",
    list_command: r"printf 'Application\tVersion\n'; flatpak list --app --columns=application,version",
    install_command: "flatpak install --noninteractive -y",
    remove_command: "flatpak uninstall --noninteractive -y",
};
