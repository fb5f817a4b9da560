use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::adapters::protocol::{ManagerSyntax, parse_inventory, validate_package_name};
use crate::execution::{CommandResult, ExecutionContext, RemoteCommand, RemoteExecutor};
use crate::models::{
    CoreError, CoreErrorKind, ManagerAction, Package, PackageCollection, PackageManagerId,
    PackageState,
};

pub type ClientResult<T> = Result<T, CoreError>;

pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = ClientResult<T>> + Send + 'a>>;

/// Inventory and apply operations for one package manager on one target.
pub trait PackageManagerClient: Send + Sync {
    fn manager(&self) -> PackageManagerId;

    /// Every installed package, sorted by name.
    fn get<'a>(&'a self, ctx: &'a ExecutionContext) -> ClientFuture<'a, PackageCollection>;

    /// Applies each package's requested state, one command per package, in
    /// the given order. Stops at the first failure; earlier packages stay
    /// applied.
    fn apply<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        desired: &'a PackageCollection,
    ) -> ClientFuture<'a, ()>;
}

/// Client that drives a manager through the probe-before-act shell protocol.
pub struct ShellPackageClient {
    executor: Arc<dyn RemoteExecutor>,
    syntax: &'static ManagerSyntax,
}

impl ShellPackageClient {
    pub fn new(executor: Arc<dyn RemoteExecutor>, manager: PackageManagerId) -> Self {
        Self {
            executor,
            syntax: ManagerSyntax::for_manager(manager),
        }
    }

    pub fn syntax(&self) -> &'static ManagerSyntax {
        self.syntax
    }

    async fn run(
        &self,
        ctx: &ExecutionContext,
        action: ManagerAction,
        command: &RemoteCommand,
    ) -> ClientResult<CommandResult> {
        self.executor
            .execute(ctx, command)
            .await
            .map_err(|error| error.attributed(self.syntax.manager, action))
    }

    async fn list_installed(&self, ctx: &ExecutionContext) -> ClientResult<PackageCollection> {
        let action = ManagerAction::ListInstalled;
        let result = self.run(ctx, action, &self.syntax.list_snippet()).await?;
        let stdout = result.stdout_text();

        if self.syntax.reports_missing_manager(&stdout) {
            return Err(self.not_available(action, &stdout));
        }

        if result.exit_code != 0 {
            return Err(self.error(
                CoreErrorKind::UnexpectedError,
                action,
                format!(
                    "{} exited with code {}: {}",
                    self.syntax.list_command,
                    result.exit_code,
                    result.stderr_text().trim()
                ),
            ));
        }

        let packages = parse_inventory(self.syntax.manager, &stdout)
            .map_err(|error| error.attributed(self.syntax.manager, action))?;

        tracing::debug!(
            manager = ?self.syntax.manager,
            count = packages.len(),
            "read package inventory"
        );

        Ok(packages)
    }

    async fn apply_states(
        &self,
        ctx: &ExecutionContext,
        desired: &PackageCollection,
    ) -> ClientResult<()> {
        if desired.is_empty() {
            return Ok(());
        }

        for package in desired {
            self.validate(package)?;
        }

        for package in desired {
            let (action, command) = match package.state {
                PackageState::Installed => (
                    ManagerAction::Install,
                    self.syntax.install_snippet(&package.name),
                ),
                PackageState::NotInstalled => (
                    ManagerAction::Uninstall,
                    self.syntax.remove_snippet(&package.name),
                ),
            };

            tracing::info!(
                manager = ?self.syntax.manager,
                package = %package.name,
                action = action.as_str(),
                "applying package state"
            );

            let result = self.run(ctx, action, &command).await?;
            let stdout = result.stdout_text();

            if self.syntax.reports_missing_manager(&stdout) {
                return Err(self.not_available(action, &stdout));
            }

            if result.exit_code != 0 {
                return Err(self.error(
                    CoreErrorKind::ManagerError,
                    action,
                    format!(
                        "{} {} failed with exit code {}: {}",
                        self.syntax.tool,
                        action.as_str(),
                        result.exit_code,
                        result.stderr_text().trim()
                    ),
                ));
            }
        }

        Ok(())
    }

    fn validate(&self, package: &Package) -> ClientResult<()> {
        let action = match package.state {
            PackageState::Installed => ManagerAction::Install,
            PackageState::NotInstalled => ManagerAction::Uninstall,
        };

        if package.manager != self.syntax.manager {
            return Err(self.error(
                CoreErrorKind::InvalidInput,
                action,
                format!(
                    "package {} belongs to {} and cannot be applied with {}",
                    package.name, package.manager, self.syntax.manager
                ),
            ));
        }

        validate_package_name(&package.name)
            .map_err(|error| error.attributed(self.syntax.manager, action))
    }

    fn not_available(&self, action: ManagerAction, stdout: &str) -> CoreError {
        let code = self.syntax.sentinel_code(stdout).unwrap_or_default();
        self.error(
            CoreErrorKind::ManagerNotAvailable,
            action,
            format!(
                "{} not available on target (which exit code {code})",
                self.syntax.tool
            ),
        )
    }

    fn error(&self, kind: CoreErrorKind, action: ManagerAction, message: String) -> CoreError {
        CoreError {
            manager: Some(self.syntax.manager),
            action: Some(action),
            kind,
            message,
        }
    }
}

impl PackageManagerClient for ShellPackageClient {
    fn manager(&self) -> PackageManagerId {
        self.syntax.manager
    }

    fn get<'a>(&'a self, ctx: &'a ExecutionContext) -> ClientFuture<'a, PackageCollection> {
        Box::pin(self.list_installed(ctx))
    }

    fn apply<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        desired: &'a PackageCollection,
    ) -> ClientFuture<'a, ()> {
        Box::pin(self.apply_states(ctx, desired))
    }
}
