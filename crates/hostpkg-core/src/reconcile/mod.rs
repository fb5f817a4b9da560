pub mod declaration;
pub mod engine;
pub mod tracker;
pub mod unit;

pub use declaration::{DesiredSet, IDENTITY_DELIMITER, ResourceIdentity};
pub use engine::{ReconcileOutcome, ReconciliationEngine, UnitRecord};
pub use tracker::{InternalState, PreInstalledRecord};
pub use unit::ManagedUnit;

use crate::models::CoreError;

pub type ReconcileResult<T> = Result<T, CoreError>;
