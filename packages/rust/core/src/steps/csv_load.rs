//! Load step: replace a table with the contents of a CSV file.

use std::path::{Path, PathBuf};

use salespipe_shared::{MaterializeResult, Result};
use tracing::info;

use super::{Step, StepContext, summarize};

/// Loads one CSV into a same-named table, overwriting it on every run.
pub struct CsvLoad {
    name: String,
    csv: PathBuf,
    group: String,
}

impl CsvLoad {
    /// A load step in the `ingestion` group.
    pub fn new(name: impl Into<String>, csv: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            csv: csv.into(),
            group: "ingestion".into(),
        }
    }
}

impl Step for CsvLoad {
    fn name(&self) -> &str {
        &self.name
    }

    fn deps(&self) -> &[String] {
        &[]
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn kind(&self) -> &'static str {
        "csv_load"
    }

    fn source(&self) -> Option<&Path> {
        Some(&self.csv)
    }

    fn materialize(&self, ctx: &StepContext<'_>) -> Result<MaterializeResult> {
        salespipe_storage::replace_table_from_csv(ctx.conn, &self.name, &self.csv)?;
        let result = summarize(ctx, &self.name)?;
        info!(
            run_id = %ctx.run_id,
            table = %self.name,
            csv = %self.csv.display(),
            rows = result.row_count,
            "table loaded"
        );
        Ok(result)
    }
}
