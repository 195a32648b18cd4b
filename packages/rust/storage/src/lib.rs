//! Embedded DuckDB storage layer.
//!
//! The [`Warehouse`] struct is the single shared database resource every
//! pipeline step materializes into. Steps never hold the root handle: they
//! call [`Warehouse::connect`] and get a connection of their own, released
//! when it drops.
//!
//! - [`relations`]: table/view replacement, counts, and previews
//! - [`history`]: per-step run history in the `_salespipe` schema

mod csv_shape;
pub mod history;
mod migrations;
pub mod relations;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use duckdb::{Connection, params};
use salespipe_shared::{PipelineError, Result};

pub use history::{HistoryEntry, recent_history, record_step};
pub use relations::{
    preview, quote_ident, quote_literal, relation_columns, relation_exists,
    replace_table_from_csv, replace_view, row_count,
};

/// Shared database resource wrapping one DuckDB instance.
///
/// Cloning a `Warehouse` is cheap and shares the same instance.
#[derive(Clone)]
pub struct Warehouse {
    root: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Warehouse {
    /// Open or create a database file at `path`.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        let conn = Connection::open(path).map_err(|e| PipelineError::Storage(e.to_string()))?;
        let warehouse = Self {
            root: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        };
        warehouse.run_migrations()?;
        tracing::debug!("warehouse opened");
        Ok(warehouse)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| PipelineError::Storage(e.to_string()))?;
        let warehouse = Self {
            root: Arc::new(Mutex::new(conn)),
            path: None,
        };
        warehouse.run_migrations()?;
        Ok(warehouse)
    }

    /// Database file path, `None` for in-memory warehouses.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire a new connection to the shared instance.
    pub fn connect(&self) -> Result<Connection> {
        let root = self
            .root
            .lock()
            .map_err(|_| PipelineError::Storage("warehouse lock poisoned".into()))?;
        root.try_clone()
            .map_err(|e| PipelineError::Storage(e.to_string()))
    }

    /// Run `f` with a scoped connection that is closed on every exit path.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Run pending schema migrations.
    fn run_migrations(&self) -> Result<()> {
        self.with_connection(|conn| {
            let current_version = get_schema_version(conn);

            for migration in migrations::all_migrations() {
                if migration.version > current_version {
                    tracing::info!(
                        version = migration.version,
                        description = migration.description,
                        "applying migration"
                    );
                    conn.execute_batch(migration.sql).map_err(|e| {
                        PipelineError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
                }
            }
            Ok(())
        })
    }
}

/// Get the current schema version, or 0 if no migrations have been applied.
fn get_schema_version(conn: &Connection) -> u32 {
    conn.query_row(
        "SELECT MAX(version) FROM _salespipe.schema_migrations",
        params![],
        |row| row.get::<_, Option<i64>>(0),
    )
    .ok()
    .flatten()
    .and_then(|v| u32::try_from(v).ok())
    .unwrap_or(0) // Schema doesn't exist yet
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_db() -> PathBuf {
        std::env::temp_dir()
            .join(format!("salespipe_storage_{}", Uuid::now_v7()))
            .join("test.duckdb")
    }

    #[test]
    fn open_creates_parent_and_migrates() {
        let path = temp_db();
        let warehouse = Warehouse::open(&path).expect("open warehouse");
        assert!(path.exists());
        assert_eq!(warehouse.path(), Some(path.as_path()));

        let conn = warehouse.connect().unwrap();
        assert_eq!(get_schema_version(&conn), 1);
    }

    #[test]
    fn idempotent_migration() {
        let path = temp_db();
        drop(Warehouse::open(&path).unwrap());
        let warehouse = Warehouse::open(&path).expect("reopen");
        let versions: i64 = warehouse
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM _salespipe.schema_migrations",
                    params![],
                    |row| row.get(0),
                )
                .map_err(|e| PipelineError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn connections_share_one_instance() {
        let warehouse = Warehouse::in_memory().unwrap();
        warehouse
            .with_connection(|conn| {
                conn.execute_batch("CREATE TABLE t AS SELECT 1 AS x")
                    .map_err(|e| PipelineError::query("t", e))
            })
            .unwrap();

        let other = warehouse.connect().unwrap();
        assert!(relation_exists(&other, "t").unwrap());
    }

    #[test]
    fn history_schema_stays_out_of_main() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        assert!(!relation_exists(&conn, "materializations").unwrap());
    }
}
