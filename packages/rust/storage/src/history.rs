//! Run history: one row per step per run in `_salespipe.materializations`.

use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{Connection, params};
use salespipe_shared::{PipelineError, Result, RunId, StepReport, StepStatus};
use serde::Serialize;

/// A recorded step outcome.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub run_id: String,
    pub step: String,
    pub status: String,
    pub row_count: Option<u64>,
    pub error_kind: Option<String>,
    pub message: Option<String>,
    pub started_at: String,
    pub elapsed_ms: u64,
}

fn storage_err(e: duckdb::Error) -> PipelineError {
    PipelineError::Storage(format!("run history: {e}"))
}

/// Record the outcome of one step.
pub fn record_step(
    conn: &Connection,
    run_id: &RunId,
    report: &StepReport,
    started_at: DateTime<Utc>,
) -> Result<()> {
    let (row_count, error_kind, message) = match &report.status {
        StepStatus::Materialized(result) => (Some(result.row_count as i64), None, None),
        StepStatus::Failed { kind, message } => (None, Some(kind.clone()), Some(message.clone())),
        StepStatus::Skipped { blocked_by } => (
            None,
            None,
            Some(format!("blocked by {}", blocked_by.join(", "))),
        ),
    };

    conn.execute(
        "INSERT OR REPLACE INTO _salespipe.materializations
         (run_id, step, status, row_count, error_kind, message, started_at, elapsed_ms)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            run_id.to_string(),
            report.step.as_str(),
            report.status.label(),
            row_count,
            error_kind,
            message,
            started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            report.elapsed_ms as i64,
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

/// The most recent `limit` step outcomes, newest first.
pub fn recent_history(conn: &Connection, limit: usize) -> Result<Vec<HistoryEntry>> {
    let sql = format!(
        "SELECT run_id, step, status, row_count, error_kind, message, started_at, elapsed_ms
         FROM _salespipe.materializations
         ORDER BY started_at DESC, step
         LIMIT {limit}"
    );
    let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
    let mut rows = stmt.query(params![]).map_err(storage_err)?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next().map_err(storage_err)? {
        entries.push(HistoryEntry {
            run_id: row.get(0).map_err(storage_err)?,
            step: row.get(1).map_err(storage_err)?,
            status: row.get(2).map_err(storage_err)?,
            row_count: row
                .get::<_, Option<i64>>(3)
                .map_err(storage_err)?
                .map(|n| n.max(0) as u64),
            error_kind: row.get(4).map_err(storage_err)?,
            message: row.get(5).map_err(storage_err)?,
            started_at: row.get(6).map_err(storage_err)?,
            elapsed_ms: row.get::<_, i64>(7).map_err(storage_err)?.max(0) as u64,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Warehouse;
    use salespipe_shared::{MaterializeResult, Preview};

    #[test]
    fn record_and_list() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let run_id = RunId::new();
        let t0 = Utc::now();

        let ok = StepReport {
            step: "products".into(),
            status: StepStatus::Materialized(MaterializeResult {
                row_count: 3,
                preview: Preview::default(),
            }),
            elapsed_ms: 12,
        };
        let failed = StepReport {
            step: "sales_data".into(),
            status: StepStatus::Failed {
                kind: "io".into(),
                message: "I/O error at \"data/sales_data.csv\"".into(),
            },
            elapsed_ms: 1,
        };
        record_step(&conn, &run_id, &ok, t0).expect("record ok");
        record_step(&conn, &run_id, &failed, t0 + chrono::Duration::milliseconds(20))
            .expect("record failed");

        let entries = recent_history(&conn, 10).expect("history");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].step, "sales_data");
        assert_eq!(entries[0].status, "failed");
        assert_eq!(entries[0].error_kind.as_deref(), Some("io"));
        assert_eq!(entries[1].row_count, Some(3));
        assert_eq!(entries[1].run_id, run_id.to_string());

        assert_eq!(recent_history(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn rerecording_a_step_replaces_it() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let run_id = RunId::new();
        let report = StepReport {
            step: "joined_data".into(),
            status: StepStatus::Skipped {
                blocked_by: vec!["products".into()],
            },
            elapsed_ms: 0,
        };
        record_step(&conn, &run_id, &report, Utc::now()).unwrap();
        record_step(&conn, &run_id, &report, Utc::now()).unwrap();

        let entries = recent_history(&conn, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.as_deref(), Some("blocked by products"));
    }

    #[test]
    fn entries_serialize_for_json_output() {
        let warehouse = Warehouse::in_memory().unwrap();
        let conn = warehouse.connect().unwrap();
        let run_id = RunId::new();
        let report = StepReport {
            step: "products".into(),
            status: StepStatus::Materialized(MaterializeResult {
                row_count: 3,
                preview: Preview::default(),
            }),
            elapsed_ms: 7,
        };
        record_step(&conn, &run_id, &report, Utc::now()).unwrap();

        let entries = recent_history(&conn, 10).unwrap();
        let json = serde_json::to_value(&entries).unwrap();
        assert_eq!(json[0]["step"], "products");
        assert_eq!(json[0]["status"], "materialized");
        assert_eq!(json[0]["row_count"], 3);
        assert!(json[0]["error_kind"].is_null());
        assert_eq!(json[0]["run_id"], run_id.to_string());
    }
}
