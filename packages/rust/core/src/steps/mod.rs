//! Step trait and built-in step kinds.
//!
//! A step owns one relation in the warehouse: it (re)builds it and reports
//! [`MaterializeResult`] metadata. Steps receive their connection through
//! [`StepContext`]; they never open the database themselves.

mod csv_load;
mod view;

use std::path::Path;

use duckdb::Connection;
use salespipe_shared::{MaterializeResult, Result, RunId};

pub use csv_load::CsvLoad;
pub use view::{JOINED_DATA_SQL, ViewStep, joined_data};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Everything a step may touch while it runs.
pub struct StepContext<'a> {
    /// Scoped connection to the shared warehouse.
    pub conn: &'a Connection,
    /// Run this invocation belongs to.
    pub run_id: &'a RunId,
    /// Rows to include in the preview.
    pub preview_rows: usize,
}

/// A node of the pipeline graph.
pub trait Step: Send + Sync {
    /// Step name; also the name of the relation it materializes.
    fn name(&self) -> &str;

    /// Names of steps that must materialize before this one.
    fn deps(&self) -> &[String];

    /// Display group (e.g. `ingestion`).
    fn group(&self) -> &str;

    /// Short step kind for listings.
    fn kind(&self) -> &'static str;

    /// External file the step reads, if any.
    fn source(&self) -> Option<&Path> {
        None
    }

    /// Rebuild the relation and report its metadata.
    fn materialize(&self, ctx: &StepContext<'_>) -> Result<MaterializeResult>;
}

/// Row count plus preview of `relation`.
pub(crate) fn summarize(ctx: &StepContext<'_>, relation: &str) -> Result<MaterializeResult> {
    let row_count = salespipe_storage::row_count(ctx.conn, relation)?;
    let preview = salespipe_storage::preview(ctx.conn, relation, ctx.preview_rows)?;
    Ok(MaterializeResult { row_count, preview })
}
