#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_unit_schema",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS managed_units (
    unit_name TEXT PRIMARY KEY,
    manager_id TEXT NOT NULL,
    identity TEXT NOT NULL,
    declared_json TEXT NOT NULL,
    internal_json TEXT NOT NULL,
    updated_at_unix INTEGER NOT NULL
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS managed_units;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_record_schema_version",
    up_sql: r#"
ALTER TABLE managed_units ADD COLUMN record_schema_version INTEGER NOT NULL DEFAULT 1;

CREATE INDEX IF NOT EXISTS idx_managed_units_manager
    ON managed_units (manager_id);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_managed_units_manager;
ALTER TABLE managed_units DROP COLUMN record_schema_version;
"#,
};

const MIGRATIONS: [SqliteMigration; 2] = [MIGRATION_0001, MIGRATION_0002];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
