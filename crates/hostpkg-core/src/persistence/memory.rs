use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::models::{CoreError, CoreErrorKind};
use crate::persistence::{PersistenceResult, StateStore};
use crate::reconcile::UnitRecord;

#[derive(Default)]
pub struct InMemoryStateStore {
    units: Mutex<BTreeMap<String, UnitRecord>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PersistenceResult<std::sync::MutexGuard<'_, BTreeMap<String, UnitRecord>>> {
        self.units.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "state store lock poisoned")
        })
    }
}

impl StateStore for InMemoryStateStore {
    fn load_unit(&self, unit: &str) -> PersistenceResult<Option<UnitRecord>> {
        Ok(self.lock()?.get(unit).cloned())
    }

    fn save_unit(&self, unit: &str, record: &UnitRecord) -> PersistenceResult<()> {
        self.lock()?.insert(unit.to_owned(), record.clone());
        Ok(())
    }

    fn remove_unit(&self, unit: &str) -> PersistenceResult<()> {
        self.lock()?.remove(unit);
        Ok(())
    }

    fn list_units(&self) -> PersistenceResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
