//! Pipeline runner: executes registered steps against the warehouse in
//! dependency order and collects a [`RunReport`].
//!
//! Execution policy:
//! 1. Steps run one at a time, in topological order
//! 2. Each step gets its own scoped connection, dropped when it finishes
//! 3. A step whose planned dependency did not materialize is skipped and reported
//! 4. A failed step never stops independent steps

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use salespipe_shared::{
    MaterializeResult, PipelineError, Result, RunConfig, RunId, RunReport, StepReport,
    StepStatus,
};
use salespipe_storage::Warehouse;
use tracing::{error, info, info_span, instrument, warn};

use crate::registry::Definitions;
use crate::steps::{Step, StepContext};

/// Options for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Steps to run; empty means all.
    pub selection: Vec<String>,
    /// Also run the transitive dependencies of selected steps.
    pub with_upstream: bool,
    /// Rows per step preview.
    pub preview_rows: usize,
    /// Record step outcomes in run history.
    pub record_history: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            selection: Vec::new(),
            with_upstream: false,
            preview_rows: 10,
            record_history: true,
        }
    }
}

impl From<&RunConfig> for RunOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            preview_rows: config.preview_rows,
            record_history: config.record_history,
            ..Self::default()
        }
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a step starts executing.
    fn step_started(&self, step: &str, current: usize, total: usize);
    /// Called once a step has materialized, failed, or been skipped.
    fn step_finished(&self, report: &StepReport);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn step_started(&self, _step: &str, _current: usize, _total: usize) {}
    fn step_finished(&self, _report: &StepReport) {}
    fn done(&self, _report: &RunReport) {}
}

/// Registered steps bound to the warehouse they materialize into.
pub struct Pipeline {
    definitions: Definitions,
    warehouse: Warehouse,
    options: RunOptions,
}

impl Pipeline {
    pub fn new(definitions: Definitions, warehouse: Warehouse, options: RunOptions) -> Self {
        Self {
            definitions,
            warehouse,
            options,
        }
    }

    /// Run the planned steps.
    ///
    /// Step failures are reported in the returned [`RunReport`]; only an
    /// invalid selection makes the run itself fail.
    #[instrument(skip_all, fields(selection = ?self.options.selection))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunReport> {
        let start = Instant::now();
        let run_id = RunId::new();
        let plan = self
            .definitions
            .graph()
            .plan(&self.options.selection, self.options.with_upstream)?;
        let planned: HashSet<&str> = plan.iter().copied().collect();

        info!(%run_id, steps = plan.len(), "starting pipeline run");

        let mut materialized: HashSet<&str> = HashSet::new();
        let mut reports = Vec::with_capacity(plan.len());

        for (i, &name) in plan.iter().enumerate() {
            let step = self
                .definitions
                .get(name)
                .ok_or_else(|| PipelineError::graph(format!("unregistered step `{name}`")))?;

            let blocked_by: Vec<String> = step
                .deps()
                .iter()
                .filter(|d| planned.contains(d.as_str()) && !materialized.contains(d.as_str()))
                .cloned()
                .collect();

            let started_at = Utc::now();
            let report = if blocked_by.is_empty() {
                progress.step_started(name, i + 1, plan.len());
                let t = Instant::now();
                let status = match self.execute(Arc::clone(step), &run_id).await {
                    Ok(result) => {
                        materialized.insert(name);
                        StepStatus::Materialized(result)
                    }
                    Err(e) => {
                        error!(step = name, kind = e.kind(), error = %e, "step failed");
                        StepStatus::Failed {
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        }
                    }
                };
                StepReport {
                    step: name.to_string(),
                    status,
                    elapsed_ms: t.elapsed().as_millis() as u64,
                }
            } else {
                warn!(step = name, ?blocked_by, "skipping step, upstream did not materialize");
                StepReport {
                    step: name.to_string(),
                    status: StepStatus::Skipped { blocked_by },
                    elapsed_ms: 0,
                }
            };

            if self.options.record_history {
                self.record(&run_id, &report, started_at);
            }
            progress.step_finished(&report);
            reports.push(report);
        }

        let report = RunReport {
            run_id,
            steps: reports,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        progress.done(&report);

        info!(
            run_id = %report.run_id,
            success = report.is_success(),
            elapsed_ms = report.elapsed_ms,
            "pipeline run complete"
        );

        Ok(report)
    }

    /// Materialize one step on the blocking pool with its own connection.
    async fn execute(&self, step: Arc<dyn Step>, run_id: &RunId) -> Result<MaterializeResult> {
        let warehouse = self.warehouse.clone();
        let run_id = run_id.clone();
        let preview_rows = self.options.preview_rows;
        let span = info_span!("step", step = step.name(), kind = step.kind());

        tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            warehouse.with_connection(|conn| {
                step.materialize(&StepContext {
                    conn,
                    run_id: &run_id,
                    preview_rows,
                })
            })
        })
        .await
        .map_err(|e| PipelineError::Storage(format!("step task failed: {e}")))?
    }

    /// Write a history row. History is best-effort and never fails the run.
    fn record(&self, run_id: &RunId, report: &StepReport, started_at: chrono::DateTime<Utc>) {
        let result = self.warehouse.with_connection(|conn| {
            salespipe_storage::record_step(conn, run_id, report, started_at)
        });
        if let Err(e) = result {
            warn!(step = %report.step, error = %e, "failed to record run history");
        }
    }
}
