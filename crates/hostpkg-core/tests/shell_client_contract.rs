#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hostpkg_core::adapters::{PackageManagerClient, ShellPackageClient};
use hostpkg_core::execution::{
    ExecuteFuture, ExecutionContext, RemoteCommand, RemoteExecutor, ShellExecutor, ShellTarget,
    TokioProcessExecutor, shell_quote,
};
use hostpkg_core::models::{CoreErrorKind, Package, PackageCollection, PackageManagerId};

/// Runs snippets on the local shell with a directory of stand-in manager
/// binaries ahead of the real `PATH`.
struct StubbedHost {
    shell: ShellExecutor,
    bin_dir: PathBuf,
}

impl RemoteExecutor for StubbedHost {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        command: &'a RemoteCommand,
    ) -> ExecuteFuture<'a> {
        let wrapped = RemoteCommand::new(format!(
            "PATH={}:\"$PATH\"; {}",
            shell_quote(&self.bin_dir.to_string_lossy()),
            command.snippet()
        ));
        Box::pin(async move { self.shell.execute(ctx, &wrapped).await })
    }
}

fn fixture(manager: PackageManagerId) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(manager.as_str())
        .join("list.txt")
}

fn temp_dir(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("hostpkg-{test_name}-{nanos}"));
    fs::create_dir_all(&dir).expect("temp dir should be created");
    dir
}

/// Installs a stand-in for the manager binary. `list` prints what the real
/// tool prints when stdout is a pipe; every other call is appended to `calls`.
fn stub_manager(bin_dir: &Path, manager: PackageManagerId, calls: &Path) {
    let listing = match manager {
        // snap prints its own title row.
        PackageManagerId::Snap => format!("cat '{}'", fixture(manager).display()),
        // flatpak prints rows only.
        PackageManagerId::Flatpak => format!("tail -n +2 '{}'", fixture(manager).display()),
    };
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = list ]; then {listing}; else echo \"$*\" >> '{}'; fi\n",
        calls.display()
    );

    let path = bin_dir.join(manager.as_str());
    fs::write(&path, script).expect("stub should be written");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("stub should be executable");
}

fn client(bin_dir: PathBuf, manager: PackageManagerId) -> ShellPackageClient {
    let shell = ShellExecutor::new(Arc::new(TokioProcessExecutor), ShellTarget::local());
    ShellPackageClient::new(Arc::new(StubbedHost { shell, bin_dir }), manager)
}

#[tokio::test]
async fn get_reads_every_row_for_each_manager() {
    for manager in PackageManagerId::ALL {
        let dir = temp_dir(&format!("{manager}-get"));
        stub_manager(&dir, manager, &dir.join("calls.log"));

        let packages = client(dir, manager)
            .get(&ExecutionContext::new())
            .await
            .unwrap();

        let expected = match manager {
            PackageManagerId::Snap => vec!["bare", "core22", "hello", "lxd", "snapd"],
            PackageManagerId::Flatpak => vec![
                "com.valvesoftware.Steam",
                "org.gnome.Calculator",
                "org.mozilla.firefox",
            ],
        };
        assert_eq!(packages.names(), expected, "{manager}");
    }
}

#[tokio::test]
async fn apply_invokes_the_manager_once_per_package() {
    for manager in PackageManagerId::ALL {
        let dir = temp_dir(&format!("{manager}-apply"));
        let calls = dir.join("calls.log");
        stub_manager(&dir, manager, &calls);

        let desired: PackageCollection = vec![
            Package::not_installed(manager, "old.pkg"),
            Package::installed(manager, "new.pkg"),
        ]
        .into();

        client(dir, manager)
            .apply(&ExecutionContext::new(), &desired)
            .await
            .unwrap();

        let log = fs::read_to_string(&calls).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        let expected = match manager {
            PackageManagerId::Snap => vec!["remove old.pkg", "install new.pkg"],
            PackageManagerId::Flatpak => vec![
                "uninstall --noninteractive -y old.pkg",
                "install --noninteractive -y new.pkg",
            ],
        };
        assert_eq!(lines, expected, "{manager}");
    }
}

#[tokio::test]
async fn listing_cut_short_by_a_lingering_child_is_not_an_inventory() {
    let dir = temp_dir("snap-linger");
    let script = format!(
        "#!/bin/sh\ncat '{}'; (sleep 3 &); exit 0\n",
        fixture(PackageManagerId::Snap).display()
    );
    let path = dir.join("snap");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

    let error = client(dir, PackageManagerId::Snap)
        .get(&ExecutionContext::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Transport);
    assert_eq!(error.manager, Some(PackageManagerId::Snap));
}
