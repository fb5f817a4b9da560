use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};

use crate::models::PackageManagerId;
use crate::persistence::{
    MigrationStore, PersistenceResult, StateStore, UNIT_RECORD_SCHEMA_VERSION, storage_error,
};
use crate::reconcile::{DesiredSet, InternalState, ResourceIdentity, UnitRecord};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration};

const MIGRATIONS_TABLE: &str = "hostpkg_schema_migrations";

pub struct SqliteStateStore {
    database_path: PathBuf,
}

impl SqliteStateStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error.to_string()))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error.to_string()))
    }
}

impl MigrationStore for SqliteStateStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl StateStore for SqliteStateStore {
    fn load_unit(&self, unit: &str) -> PersistenceResult<Option<UnitRecord>> {
        let row = self.with_connection("load_unit", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "
SELECT manager_id, identity, declared_json, internal_json, record_schema_version
FROM managed_units
WHERE unit_name = ?1
",
                    [unit],
                    |row| {
                        Ok(StoredUnit {
                            manager_id: row.get(0)?,
                            identity: row.get(1)?,
                            declared_json: row.get(2)?,
                            internal_json: row.get(3)?,
                            record_schema_version: row.get(4)?,
                        })
                    },
                )
                .optional()
        })?;

        row.map(|stored| stored.into_record(unit)).transpose()
    }

    fn save_unit(&self, unit: &str, record: &UnitRecord) -> PersistenceResult<()> {
        let declared_json = serde_json::to_string(&record.declared)
            .map_err(|error| storage_error("save_unit", format!("{unit}: {error}")))?;
        let internal_json = record.internal.to_json()?;

        self.with_connection("save_unit", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO managed_units (
    unit_name, manager_id, identity, declared_json, internal_json,
    record_schema_version, updated_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, strftime('%s', 'now'))
ON CONFLICT(unit_name) DO UPDATE SET
    manager_id = excluded.manager_id,
    identity = excluded.identity,
    declared_json = excluded.declared_json,
    internal_json = excluded.internal_json,
    record_schema_version = excluded.record_schema_version,
    updated_at_unix = excluded.updated_at_unix
",
                params![
                    unit,
                    record.manager.as_str(),
                    record.identity.as_str(),
                    declared_json,
                    internal_json,
                    i64::from(UNIT_RECORD_SCHEMA_VERSION),
                ],
            )?;
            Ok(())
        })
    }

    fn remove_unit(&self, unit: &str) -> PersistenceResult<()> {
        self.with_connection("remove_unit", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute("DELETE FROM managed_units WHERE unit_name = ?1", [unit])?;
            Ok(())
        })
    }

    fn list_units(&self) -> PersistenceResult<Vec<String>> {
        self.with_connection("list_units", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement =
                connection.prepare("SELECT unit_name FROM managed_units ORDER BY unit_name ASC")?;
            let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect()
        })
    }
}

struct StoredUnit {
    manager_id: String,
    identity: String,
    declared_json: String,
    internal_json: String,
    record_schema_version: i64,
}

impl StoredUnit {
    fn into_record(self, unit: &str) -> PersistenceResult<UnitRecord> {
        if self.record_schema_version != i64::from(UNIT_RECORD_SCHEMA_VERSION) {
            return Err(storage_error(
                "load_unit",
                format!(
                    "{unit}: unsupported schema version {} (expected {UNIT_RECORD_SCHEMA_VERSION})",
                    self.record_schema_version
                ),
            ));
        }

        let manager = self.manager_id.parse::<PackageManagerId>().map_err(|_| {
            storage_error(
                "load_unit",
                format!(
                    "unknown manager id '{}' found in persisted sqlite record",
                    self.manager_id
                ),
            )
        })?;
        let declared: DesiredSet = serde_json::from_str(&self.declared_json)
            .map_err(|error| storage_error("load_unit", format!("{unit}: {error}")))?;
        let internal = InternalState::from_json(&self.internal_json)?;

        Ok(UnitRecord {
            manager,
            identity: ResourceIdentity::parse(self.identity),
            declared,
            internal,
        })
    }
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    Connection::open(database_path)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version < current_schema_version() {
        return Err(storage_error_sqlite(&format!(
            "database schema is at version {version}; apply migrations before unit operations"
        )));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version)
        .ok_or_else(|| storage_error_sqlite(&format!("migration version '{version}' is not defined")))
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}
