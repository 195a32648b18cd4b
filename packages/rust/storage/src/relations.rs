//! Relation-level SQL helpers: replace, inspect, count, preview.
//!
//! Every replacement uses `CREATE OR REPLACE`, so a failed rebuild leaves the
//! previous definition of the relation in place.

use std::path::Path;

use duckdb::{Connection, params};
use salespipe_shared::{PipelineError, Preview, Result};
use tracing::{debug, warn};

use crate::csv_shape;

/// Quote an SQL identifier (`"` doubled).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an SQL string literal (`'` doubled).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Replace `table` with the full contents of the CSV at `csv`.
///
/// Delimiter, header, and column types are inferred by `read_csv_auto`. The
/// file must be rectangular and the loaded table must have the header's
/// width and one row per data record; anything else is a query error and
/// the previous table is kept.
pub fn replace_table_from_csv(conn: &Connection, table: &str, csv: &Path) -> Result<()> {
    // Surface unreadable sources as I/O errors rather than engine errors.
    let meta = std::fs::metadata(csv).map_err(|e| PipelineError::io(csv, e))?;
    if !meta.is_file() {
        return Err(PipelineError::io(
            csv,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    let path = csv.to_str().ok_or_else(|| {
        PipelineError::io(
            csv,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path is not valid UTF-8"),
        )
    })?;
    let data = std::fs::read(csv).map_err(|e| PipelineError::io(csv, e))?;

    let (delimiter, quote) = sniff_dialect(conn, table, path)?;
    let expected = csv_shape::scan(&data, delimiter, quote)
        .map_err(|e| PipelineError::query(table, format!("malformed CSV {path}: {e}")))?;

    let sql = format!(
        "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_csv_auto({})",
        quote_ident(table),
        quote_literal(path),
    );
    debug!(table, csv = path, records = expected.records, "replacing table from csv");

    conn.execute_batch("BEGIN TRANSACTION")
        .map_err(|e| PipelineError::query(table, e))?;
    let loaded = conn
        .execute_batch(&sql)
        .map_err(|e| PipelineError::query(table, e))
        .and_then(|()| check_loaded_shape(conn, table, path, expected));
    match loaded {
        Ok(()) => conn
            .execute_batch("COMMIT")
            .map_err(|e| PipelineError::query(table, e)),
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                warn!(table, error = %rollback, "rollback after failed load");
            }
            Err(e)
        }
    }
}

/// Delimiter and quote byte the auto-detector settles on for `path`.
fn sniff_dialect(conn: &Connection, table: &str, path: &str) -> Result<(u8, Option<u8>)> {
    let sql = format!("SELECT Delimiter, Quote FROM sniff_csv({})", quote_literal(path));
    let (delimiter, quote): (String, String) = conn
        .query_row(&sql, params![], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| PipelineError::query(table, e))?;

    let delimiter = match delimiter.as_bytes() {
        [b] => *b,
        _ => {
            return Err(PipelineError::query(
                table,
                format!("unsupported CSV delimiter {delimiter:?} in {path}"),
            ));
        }
    };
    let quote = quote.bytes().next().filter(|b| *b != 0);
    Ok((delimiter, quote))
}

fn check_loaded_shape(
    conn: &Connection,
    table: &str,
    path: &str,
    expected: csv_shape::CsvShape,
) -> Result<()> {
    let columns = relation_columns(conn, table)?.len();
    let rows = row_count(conn, table)?;
    if columns != expected.fields || rows != expected.records {
        return Err(PipelineError::query(
            table,
            format!(
                "malformed CSV {path}: loaded {rows} rows x {columns} columns, \
                 file has {} records x {} fields",
                expected.records, expected.fields
            ),
        ));
    }
    Ok(())
}

/// Define (or redefine) `view` as `select_sql`.
pub fn replace_view(conn: &Connection, view: &str, select_sql: &str) -> Result<()> {
    let sql = format!("CREATE OR REPLACE VIEW {} AS {select_sql}", quote_ident(view));
    debug!(view, "replacing view");
    conn.execute_batch(&sql)
        .map_err(|e| PipelineError::query(view, e))
}

/// Whether a table or view named `name` exists in the `main` schema.
pub fn relation_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_catalog = current_database()
               AND table_schema = 'main'
               AND table_name = ?",
            params![name],
            |row| row.get(0),
        )
        .map_err(|e| PipelineError::query(name, e))?;
    Ok(count > 0)
}

/// Column names of `name`, in declaration order. Empty if it does not exist.
pub fn relation_columns(conn: &Connection, name: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE table_catalog = current_database()
               AND table_schema = 'main'
               AND table_name = ?
             ORDER BY ordinal_position",
        )
        .map_err(|e| PipelineError::query(name, e))?;
    let mut rows = stmt
        .query(params![name])
        .map_err(|e| PipelineError::query(name, e))?;

    let mut columns = Vec::new();
    while let Some(row) = rows.next().map_err(|e| PipelineError::query(name, e))? {
        columns.push(
            row.get::<_, String>(0)
                .map_err(|e| PipelineError::query(name, e))?,
        );
    }
    Ok(columns)
}

/// Total number of rows in `name`.
pub fn row_count(conn: &Connection, name: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(name));
    let count: i64 = conn
        .query_row(&sql, params![], |row| row.get(0))
        .map_err(|e| PipelineError::query(name, e))?;
    u64::try_from(count).map_err(|e| PipelineError::query(name, e))
}

/// First `limit` rows of `name`, every cell rendered to text by the engine.
pub fn preview(conn: &Connection, name: &str, limit: usize) -> Result<Preview> {
    let columns = relation_columns(conn, name)?;
    if columns.is_empty() {
        return Err(PipelineError::MissingTable {
            table: name.to_string(),
        });
    }

    let select_list = columns
        .iter()
        .map(|c| {
            let ident = quote_ident(c);
            format!("CAST({ident} AS VARCHAR) AS {ident}")
        })
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {select_list} FROM {} LIMIT {limit}", quote_ident(name));

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| PipelineError::query(name, e))?;
    let mut rows = stmt
        .query(params![])
        .map_err(|e| PipelineError::query(name, e))?;

    let mut cells = Vec::new();
    while let Some(row) = rows.next().map_err(|e| PipelineError::query(name, e))? {
        let mut record = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            record.push(
                row.get::<_, Option<String>>(idx)
                    .map_err(|e| PipelineError::query(name, e))?,
            );
        }
        cells.push(record);
    }

    Ok(Preview {
        columns,
        rows: cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Warehouse;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn write_csv(contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("salespipe_rel_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("products.csv");
        std::fs::write(&path, contents).unwrap();
        path
    }

    const PRODUCTS: &str = "product_id,product_name,category,price\n\
                            1,Widget,Hardware,19.99\n\
                            2,Gadget,Hardware,24.50\n\
                            3,Manual,Books,9.00\n";

    #[test]
    fn quoting() {
        assert_eq!(quote_ident("sales_data"), "\"sales_data\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("it's.csv"), "'it''s.csv'");
    }

    #[test]
    fn load_count_and_preview() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let csv = write_csv(PRODUCTS);

        replace_table_from_csv(&conn, "products", &csv).expect("load csv");
        assert!(relation_exists(&conn, "products").unwrap());
        assert_eq!(row_count(&conn, "products").unwrap(), 3);

        let preview = preview(&conn, "products", 2).expect("preview");
        assert_eq!(
            preview.columns,
            vec!["product_id", "product_name", "category", "price"]
        );
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.rows[0][1].as_deref(), Some("Widget"));
    }

    #[test]
    fn replacing_does_not_accumulate() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let csv = write_csv(PRODUCTS);

        replace_table_from_csv(&conn, "products", &csv).unwrap();
        replace_table_from_csv(&conn, "products", &csv).unwrap();
        assert_eq!(row_count(&conn, "products").unwrap(), 3);
    }

    #[test]
    fn missing_csv_is_io_error() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let missing = std::env::temp_dir().join(format!("nope_{}.csv", Uuid::now_v7()));

        let err = replace_table_from_csv(&conn, "products", &missing).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        assert!(!relation_exists(&conn, "products").unwrap());
    }

    #[test]
    fn ragged_csv_is_query_error_and_keeps_previous_table() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let csv = write_csv("a,b,c\n1,2,3\n");
        replace_table_from_csv(&conn, "t", &csv).unwrap();

        std::fs::write(&csv, "a,b,c\n1,2,3\n4,5\n6,7,8,9,10\n").unwrap();
        let err = replace_table_from_csv(&conn, "t", &csv).unwrap_err();
        assert_eq!(err.kind(), "query");
        assert!(err.to_string().contains("expected 3 fields, found 2"), "{err}");

        assert_eq!(row_count(&conn, "t").unwrap(), 1);
        assert_eq!(relation_columns(&conn, "t").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unreadable_reload_keeps_previous_table() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let csv = write_csv(PRODUCTS);
        replace_table_from_csv(&conn, "products", &csv).unwrap();

        std::fs::remove_file(&csv).unwrap();
        let err = replace_table_from_csv(&conn, "products", &csv).unwrap_err();
        assert_eq!(err.kind(), "io");
        assert_eq!(row_count(&conn, "products").unwrap(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_is_io_error() {
        use std::os::unix::ffi::OsStrExt;

        let dir = std::env::temp_dir().join(format!("salespipe_rel_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let csv = dir.join(std::ffi::OsStr::from_bytes(b"sales_\xff.csv"));
        std::fs::write(&csv, PRODUCTS).unwrap();

        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let err = replace_table_from_csv(&conn, "products", &csv).unwrap_err();
        match err {
            PipelineError::Io { path, source } => {
                assert_eq!(path, csv);
                assert_eq!(source.kind(), std::io::ErrorKind::InvalidInput);
            }
            other => panic!("expected io error, got {other}"),
        }
        assert!(!relation_exists(&conn, "products").unwrap());
    }

    #[test]
    fn failed_view_keeps_previous_definition() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        replace_view(&conn, "v", "SELECT 1 AS x").unwrap();

        let err = replace_view(&conn, "v", "SELECT no_such_column FROM range(3)").unwrap_err();
        assert_eq!(err.kind(), "query");
        assert_eq!(row_count(&conn, "v").unwrap(), 1);
    }

    #[test]
    fn preview_of_missing_relation() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let err = preview(&conn, "joined_data", 10).unwrap_err();
        assert!(matches!(err, PipelineError::MissingTable { .. }));
    }
}
