//! SQL migration definitions for the run-history schema.
//!
//! Migrations are applied in order on warehouse open. They only ever touch
//! the `_salespipe` schema; pipeline relations in `main` are never migrated.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Run history: schema_migrations, materializations",
        sql: r#"
CREATE SCHEMA IF NOT EXISTS _salespipe;

-- Schema version tracking
CREATE TABLE IF NOT EXISTS _salespipe.schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT current_timestamp
);

-- One row per step per run
CREATE TABLE IF NOT EXISTS _salespipe.materializations (
    run_id     VARCHAR NOT NULL,
    step       VARCHAR NOT NULL,
    status     VARCHAR NOT NULL,
    row_count  BIGINT,
    error_kind VARCHAR,
    message    VARCHAR,
    started_at VARCHAR NOT NULL,
    elapsed_ms BIGINT NOT NULL,
    PRIMARY KEY (run_id, step)
);

INSERT INTO _salespipe.schema_migrations (version) VALUES (1);
"#,
    }]
}
