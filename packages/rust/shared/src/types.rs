//! Core domain types for pipeline runs and their materialization metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// The first rows of a relation, every cell already rendered to text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    /// Column names in relation order.
    pub columns: Vec<String>,
    /// Row cells; `None` is SQL NULL.
    pub rows: Vec<Vec<Option<String>>>,
}

impl Preview {
    /// Render as a GitHub-flavored markdown table.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        push_markdown_row(&mut out, self.columns.iter().map(String::as_str));
        push_markdown_row(&mut out, self.columns.iter().map(|_| "---"));
        for row in &self.rows {
            push_markdown_row(&mut out, row.iter().map(|c| c.as_deref().unwrap_or("NULL")));
        }
        out
    }
}

fn push_markdown_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&cell.replace('|', "\\|").replace('\n', " "));
        out.push_str(" |");
    }
    out.push('\n');
}

// ---------------------------------------------------------------------------
// Step and run reports
// ---------------------------------------------------------------------------

/// Metadata returned by every successful step: row count plus a preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializeResult {
    pub row_count: u64,
    pub preview: Preview,
}

/// Final state of a single step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// The step ran and its relation is in place.
    Materialized(MaterializeResult),
    /// The step ran and returned an error.
    Failed {
        /// Error label from `PipelineError::kind`.
        kind: String,
        message: String,
    },
    /// The step did not run because an upstream step did not materialize.
    Skipped { blocked_by: Vec<String> },
}

impl StepStatus {
    /// Short label used in history rows and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Materialized(_) => "materialized",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: String,
    #[serde(flatten)]
    pub status: StepStatus,
    pub elapsed_ms: u64,
}

impl StepReport {
    /// Metadata for a materialized step.
    pub fn result(&self) -> Option<&MaterializeResult> {
        match &self.status {
            StepStatus::Materialized(result) => Some(result),
            _ => None,
        }
    }
}

/// Outcome of a whole pipeline run, steps in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub steps: Vec<StepReport>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// True when every planned step materialized.
    pub fn is_success(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Materialized(_)))
    }

    /// Steps that did not materialize (failed or skipped).
    pub fn unsuccessful(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| !matches!(s.status, StepStatus::Materialized(_)))
    }

    /// Look up a step's report by name.
    pub fn get(&self, step: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }
}
