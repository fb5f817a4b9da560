//! Probe-before-act shell protocol shared by every manager variant.
//!
//! Each generated snippet first checks for the manager binary. When it is
//! missing the snippet prints `which_<tool>_rc=<code>` on stdout and exits
//! successfully instead of running the manager.

use crate::execution::{RemoteCommand, shell_quote};
use crate::models::{CoreError, CoreErrorKind, Package, PackageCollection, PackageManagerId};

const LIST_TEMPLATE: &str = r#"_do() { which %TOOL% >/dev/null 2>&1; which_%TOOL%_rc=$?; if [ $which_%TOOL%_rc -eq 0 ]; then %COMMAND%; else echo "which_%TOOL%_rc=${which_%TOOL%_rc}"; fi }; _do;"#;

const MUTATION_TEMPLATE: &str = r#"_do() { which %TOOL% >/dev/null 2>&1; which_%TOOL%_rc=$?; if [ $which_%TOOL%_rc -ne 0 ]; then echo "which_%TOOL%_rc=${which_%TOOL%_rc}"; return 0; fi; %COMMAND%; }; _do;"#;

/// Native command templates for one package manager.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ManagerSyntax {
    pub manager: PackageManagerId,
    /// Binary probed with `which`; also names the sentinel line.
    pub tool: &'static str,
    /// Prints a header line followed by `<name> <version> ...` rows.
    pub list_command: &'static str,
    pub install_command: &'static str,
    pub remove_command: &'static str,
}

impl ManagerSyntax {
    pub fn for_manager(manager: PackageManagerId) -> &'static ManagerSyntax {
        match manager {
            PackageManagerId::Snap => &crate::adapters::snap::SNAP_SYNTAX,
            PackageManagerId::Flatpak => &crate::adapters::flatpak::FLATPAK_SYNTAX,
        }
    }

    pub fn sentinel_prefix(&self) -> String {
        format!("which_{}_rc=", self.tool)
    }

    pub fn list_snippet(&self) -> RemoteCommand {
        RemoteCommand::new(render(LIST_TEMPLATE, self.tool, self.list_command))
    }

    pub fn install_snippet(&self, package_name: &str) -> RemoteCommand {
        self.mutation_snippet(self.install_command, package_name)
    }

    pub fn remove_snippet(&self, package_name: &str) -> RemoteCommand {
        self.mutation_snippet(self.remove_command, package_name)
    }

    fn mutation_snippet(&self, command: &str, package_name: &str) -> RemoteCommand {
        let command = format!("{command} {}", shell_quote(package_name));
        RemoteCommand::new(render(MUTATION_TEMPLATE, self.tool, &command))
    }

    /// Returns the probe exit code when stdout starts with this manager's
    /// sentinel line.
    pub fn sentinel_code<'a>(&self, stdout: &'a str) -> Option<&'a str> {
        let first_line = stdout.lines().next()?;
        let code = first_line.strip_prefix(self.sentinel_prefix().as_str())?;
        Some(code.trim())
    }

    /// True when the sentinel reports a missing binary, regardless of the
    /// command's exit code.
    pub fn reports_missing_manager(&self, stdout: &str) -> bool {
        self.sentinel_code(stdout).is_some_and(|code| code != "0")
    }
}

fn render(template: &str, tool: &str, command: &str) -> String {
    template.replace("%TOOL%", tool).replace("%COMMAND%", command)
}

/// Parses tabular inventory output. The first line is a header and is always
/// discarded; output without any line violates the protocol.
pub fn parse_inventory(
    manager: PackageManagerId,
    output: &str,
) -> Result<PackageCollection, CoreError> {
    let mut lines = output.lines();

    if lines.next().is_none() {
        return Err(CoreError::new(
            CoreErrorKind::UnexpectedError,
            "package listing produced no output; expected at least a header line",
        ));
    }

    let mut packages = PackageCollection::new();

    for line in lines.map(str::trim).filter(|line| !line.is_empty()) {
        let mut fields = line.split_whitespace();
        let (Some(name), Some(version)) = (fields.next(), fields.next()) else {
            continue;
        };

        let mut package = Package::installed(manager, name);
        package.version.installed = version.to_owned();
        packages.push(package);
    }

    packages.sort_by_name();
    Ok(packages)
}

/// Names are interpolated into shell snippets, so they must be non-empty and
/// free of control characters. Everything else is handled by quoting.
pub fn validate_package_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            "empty package name not allowed",
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("package name {name:?} contains control characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ManagerSyntax, parse_inventory, validate_package_name};
    use crate::models::{CoreErrorKind, PackageManagerId, PackageState};

    #[test]
    fn every_manager_has_matching_syntax() {
        for manager in PackageManagerId::ALL {
            let syntax = ManagerSyntax::for_manager(manager);
            assert_eq!(syntax.manager, manager);
            assert!(!syntax.tool.is_empty());
        }
    }

    #[test]
    fn list_snippet_probes_before_listing() {
        for manager in PackageManagerId::ALL {
            let syntax = ManagerSyntax::for_manager(manager);
            let snippet = syntax.list_snippet();
            let text = snippet.snippet();

            let probe = text
                .find(&format!("which {} >/dev/null", syntax.tool))
                .expect("probe present");
            let list = text.find(syntax.list_command).expect("list present");
            assert!(probe < list);
            assert!(text.contains(&format!(
                "echo \"which_{tool}_rc=${{which_{tool}_rc}}\"",
                tool = syntax.tool
            )));
        }
    }

    #[test]
    fn mutation_snippets_quote_package_names_and_return_success_on_missing_tool() {
        let syntax = ManagerSyntax::for_manager(PackageManagerId::Snap);

        let install = syntax.install_snippet("it's");
        assert!(install.snippet().contains("snap install 'it'\\''s';"));
        assert!(install.snippet().contains("return 0; fi;"));

        let remove = syntax.remove_snippet("hello");
        assert!(remove.snippet().contains("snap remove 'hello';"));
    }

    #[test]
    fn sentinel_with_nonzero_code_reports_missing_manager() {
        let syntax = ManagerSyntax::for_manager(PackageManagerId::Snap);

        assert_eq!(syntax.sentinel_code("which_snap_rc=1\n"), Some("1"));
        assert!(syntax.reports_missing_manager("which_snap_rc=1\n"));
        assert!(syntax.reports_missing_manager("which_snap_rc=127"));
        assert!(!syntax.reports_missing_manager("which_snap_rc=0\n"));
        assert!(!syntax.reports_missing_manager("Name  Version\n"));
        assert!(!syntax.reports_missing_manager("which_flatpak_rc=1\n"));
        assert!(!syntax.reports_missing_manager(""));
    }

    #[test]
    fn inventory_without_any_line_is_a_protocol_violation() {
        let error = parse_inventory(PackageManagerId::Snap, "").unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::UnexpectedError);
    }

    #[test]
    fn inventory_skips_header_blank_and_short_lines() {
        let output = "Name Version Rev\nzeta 2.0 10 latest/stable\n\nlonely\nalpha 1.0\n";

        let packages = parse_inventory(PackageManagerId::Snap, output).unwrap();

        assert_eq!(packages.names(), vec!["alpha", "zeta"]);
        assert!(packages.iter().all(|p| p.state == PackageState::Installed));
        assert!(packages.iter().all(|p| p.version.available.is_empty()));
        assert_eq!(packages.as_slice()[1].version.installed, "2.0");
    }

    #[test]
    fn header_only_inventory_is_empty() {
        let packages = parse_inventory(PackageManagerId::Snap, "Name Version\n").unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn package_names_must_be_non_empty_without_control_characters() {
        assert!(validate_package_name("hello").is_ok());
        assert!(validate_package_name("odd name's").is_ok());
        assert_eq!(
            validate_package_name("").unwrap_err().kind,
            CoreErrorKind::InvalidInput
        );
        assert_eq!(
            validate_package_name("a\nb").unwrap_err().kind,
            CoreErrorKind::InvalidInput
        );
    }
}
