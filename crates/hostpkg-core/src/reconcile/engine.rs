use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::PackageManagerClient;
use crate::execution::ExecutionContext;
use crate::models::{
    CoreError, CoreErrorKind, Package, PackageCollection, PackageManagerId, PackageState,
};
use crate::reconcile::{
    DesiredSet, InternalState, PreInstalledRecord, ReconcileResult, ResourceIdentity,
};

/// Everything persisted for one managed unit between triggers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub manager: PackageManagerId,
    pub identity: ResourceIdentity,
    pub declared: DesiredSet,
    #[serde(default)]
    pub internal: InternalState,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReconcileOutcome {
    pub record: UnitRecord,
    pub observed: PackageCollection,
}

/// Diff/apply/restore state machine for one package group.
pub struct ReconciliationEngine {
    client: Arc<dyn PackageManagerClient>,
}

impl ReconciliationEngine {
    pub fn new(client: Arc<dyn PackageManagerClient>) -> Self {
        Self { client }
    }

    pub fn manager(&self) -> PackageManagerId {
        self.client.manager()
    }

    /// Current packages as `Installed`, packages only in `previous` as
    /// `NotInstalled`, sorted by name.
    pub fn plan(
        &self,
        current: &DesiredSet,
        previous: Option<&DesiredSet>,
    ) -> ReconcileResult<PackageCollection> {
        let manager = self.manager();
        let current = current.expand(manager)?;
        let previous = match previous {
            Some(previous) => previous.expand(manager)?,
            None => BTreeMap::new(),
        };

        let mut plan: PackageCollection = current.values().cloned().collect();

        for (name, package) in previous {
            if !current.contains_key(&name) {
                plan.push(Package {
                    state: PackageState::NotInstalled,
                    ..package
                });
            }
        }

        plan.sort_by_name();

        tracing::debug!(
            manager = ?manager,
            install = plan.iter().filter(|p| p.is_installed()).count(),
            remove = plan.iter().filter(|p| !p.is_installed()).count(),
            "computed apply plan"
        );

        Ok(plan)
    }

    pub async fn create(
        &self,
        ctx: &ExecutionContext,
        desired: &DesiredSet,
    ) -> ReconcileResult<UnitRecord> {
        self.converge(ctx, desired, None, InternalState::default())
            .await
    }

    pub async fn update(
        &self,
        ctx: &ExecutionContext,
        previous: &UnitRecord,
        desired: &DesiredSet,
    ) -> ReconcileResult<UnitRecord> {
        self.ensure_same_manager(previous)?;
        self.converge(
            ctx,
            desired,
            Some(&previous.declared),
            previous.internal.clone(),
        )
        .await
    }

    /// Observed state: installed packages named by `identity`, sorted.
    pub async fn read(
        &self,
        ctx: &ExecutionContext,
        identity: &ResourceIdentity,
    ) -> ReconcileResult<PackageCollection> {
        let inventory = self.client.get(ctx).await?;
        Ok(inventory
            .filter_names(&identity.names())
            .filter_state(PackageState::Installed)
            .sorted_by_name())
    }

    /// Removes the declared packages, except those that were installed before
    /// management began, which are left installed.
    pub async fn delete(&self, ctx: &ExecutionContext, record: &UnitRecord) -> ReconcileResult<()> {
        let plan = self.teardown_plan(record)?;

        tracing::info!(
            manager = ?self.manager(),
            identity = %record.identity,
            restored = plan.iter().filter(|p| p.is_installed()).count(),
            removed = plan.iter().filter(|p| !p.is_installed()).count(),
            "tearing down managed packages"
        );

        self.client.apply(ctx, &plan).await
    }

    pub fn teardown_plan(&self, record: &UnitRecord) -> ReconcileResult<PackageCollection> {
        self.ensure_same_manager(record)?;

        let mut plan = self.plan(&record.declared, None)?;
        for package in plan.iter_mut() {
            package.state = PackageState::NotInstalled;
        }
        Ok(restore_pre_installed(plan, &record.internal.pre_installed))
    }

    async fn converge(
        &self,
        ctx: &ExecutionContext,
        desired: &DesiredSet,
        previous: Option<&DesiredSet>,
        mut internal: InternalState,
    ) -> ReconcileResult<UnitRecord> {
        // Planning validates the declarations, so bad input never reaches the host.
        let plan = self.plan(desired, previous)?;

        let pre_apply = self.client.get(ctx).await?.to_map();

        let apply_plan = skip_pre_installed_removals(&plan, &internal.pre_installed);
        self.client.apply(ctx, &apply_plan).await?;

        track_pre_installed(&mut internal.pre_installed, &plan, &pre_apply);

        Ok(UnitRecord {
            manager: self.manager(),
            identity: ResourceIdentity::from_names(desired.names()),
            declared: desired.clone(),
            internal,
        })
    }

    fn ensure_same_manager(&self, record: &UnitRecord) -> ReconcileResult<()> {
        if record.manager == self.manager() {
            return Ok(());
        }
        Err(CoreError {
            manager: Some(self.manager()),
            action: None,
            kind: CoreErrorKind::InvalidInput,
            message: format!(
                "unit {} is managed by {} but the engine drives {}",
                record.identity,
                record.manager,
                self.manager()
            ),
        })
    }
}

/// Packages leaving management that were tracked as pre-installed are kept
/// installed instead of removed.
fn restore_pre_installed(
    mut plan: PackageCollection,
    pre_installed: &PreInstalledRecord,
) -> PackageCollection {
    for package in plan.iter_mut() {
        if package.state == PackageState::NotInstalled {
            package.state = pre_installed.restore_state(&package.name);
        }
    }
    plan
}

/// Packages leaving the declaration that were tracked as pre-installed are
/// left alone; whatever the host has for them now stays as it is.
fn skip_pre_installed_removals(
    plan: &PackageCollection,
    pre_installed: &PreInstalledRecord,
) -> PackageCollection {
    plan.filter(|package| {
        package.is_installed() || pre_installed.get(&package.name) != Some(true)
    })
}

fn track_pre_installed(
    record: &mut PreInstalledRecord,
    plan: &PackageCollection,
    pre_apply: &BTreeMap<String, Package>,
) {
    for package in plan {
        match package.state {
            PackageState::Installed => {
                let was_installed = pre_apply
                    .get(&package.name)
                    .is_some_and(Package::is_installed);
                if record.remember(&package.name, was_installed) {
                    tracing::debug!(
                        package = %package.name,
                        pre_installed = was_installed,
                        "tracking pre-installed state"
                    );
                }
            }
            PackageState::NotInstalled => {
                if record.forget(&package.name).is_some() {
                    tracing::debug!(package = %package.name, "stopped tracking package");
                }
            }
        }
    }
}
