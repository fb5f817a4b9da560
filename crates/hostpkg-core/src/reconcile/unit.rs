use std::sync::Arc;

use crate::execution::ExecutionContext;
use crate::models::{CoreError, CoreErrorKind, PackageCollection};
use crate::persistence::{PersistenceResult, StateStore};
use crate::reconcile::{
    DesiredSet, ReconcileOutcome, ReconcileResult, ReconciliationEngine, UnitRecord,
};

/// A named package group whose record lives in a `StateStore`. Every trigger
/// loads the record, runs the engine, then saves or removes the record.
pub struct ManagedUnit {
    name: String,
    engine: ReconciliationEngine,
    store: Arc<dyn StateStore>,
}

impl ManagedUnit {
    pub fn new(
        name: impl Into<String>,
        engine: ReconciliationEngine,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            name: name.into(),
            engine,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub async fn record(&self) -> ReconcileResult<Option<UnitRecord>> {
        self.with_store(|store, name| store.load_unit(name)).await
    }

    /// Creates the unit on first use, updates it afterwards.
    pub async fn apply(
        &self,
        ctx: &ExecutionContext,
        desired: &DesiredSet,
    ) -> ReconcileResult<ReconcileOutcome> {
        let record = match self.record().await? {
            Some(previous) => {
                tracing::info!(unit = %self.name, identity = %previous.identity, "updating managed unit");
                self.engine.update(ctx, &previous, desired).await?
            }
            None => {
                tracing::info!(unit = %self.name, "creating managed unit");
                self.engine.create(ctx, desired).await?
            }
        };

        let saved = record.clone();
        self.with_store(move |store, name| store.save_unit(name, &saved))
            .await
            .inspect_err(|error| {
                tracing::error!(
                    unit = %self.name,
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to persist unit record after apply"
                );
            })?;

        let observed = self.engine.read(ctx, &record.identity).await?;
        Ok(ReconcileOutcome { record, observed })
    }

    /// Observed state of a known unit; `None` when nothing is stored.
    pub async fn refresh(&self, ctx: &ExecutionContext) -> ReconcileResult<Option<PackageCollection>> {
        let Some(record) = self.record().await? else {
            return Ok(None);
        };
        self.engine.read(ctx, &record.identity).await.map(Some)
    }

    /// Returns false when there was nothing to destroy. The record is kept if
    /// teardown fails.
    pub async fn destroy(&self, ctx: &ExecutionContext) -> ReconcileResult<bool> {
        let Some(record) = self.record().await? else {
            return Ok(false);
        };

        self.engine.delete(ctx, &record).await?;
        self.with_store(|store, name| store.remove_unit(name)).await?;

        tracing::info!(unit = %self.name, identity = %record.identity, "destroyed managed unit");
        Ok(true)
    }

    async fn with_store<T: Send + 'static>(
        &self,
        operation: impl FnOnce(&dyn StateStore, &str) -> PersistenceResult<T> + Send + 'static,
    ) -> ReconcileResult<T> {
        let store = self.store.clone();
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || operation(store.as_ref(), &name))
            .await
            .map_err(|join_error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("state store join failure: {join_error}"),
                )
            })?
    }
}
