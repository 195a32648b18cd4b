//! Error types for salespipe.
//!
//! Library crates use [`PipelineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error (missing or unreadable CSV, uncreatable data dir).
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The database rejected a statement or the data it read.
    #[error("query error on `{relation}`: {message}")]
    Query { relation: String, message: String },

    /// A derived relation ran before one of its source tables existed.
    #[error("missing table `{table}`: run its load step first")]
    MissingTable { table: String },

    /// Invalid step graph or step selection.
    #[error("graph error: {message}")]
    Graph { message: String },

    /// Database resource error (open, connection clone, worker task).
    #[error("storage error: {0}")]
    Storage(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a query error against `relation`.
    pub fn query(relation: impl Into<String>, msg: impl ToString) -> Self {
        Self::Query {
            relation: relation.into(),
            message: msg.to_string(),
        }
    }

    /// Create a graph error from any displayable message.
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph {
            message: msg.into(),
        }
    }

    /// Stable, machine-readable label for the error variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
            Self::Query { .. } => "query",
            Self::MissingTable { .. } => "missing_table",
            Self::Graph { .. } => "graph",
            Self::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PipelineError::config("preview.rows must be positive");
        assert_eq!(err.to_string(), "config error: preview.rows must be positive");

        let err = PipelineError::MissingTable {
            table: "sales_reps".into(),
        };
        assert!(err.to_string().contains("`sales_reps`"));

        let err = PipelineError::query("products", "Parser Error: syntax error");
        assert!(err.to_string().starts_with("query error on `products`"));
    }

    #[test]
    fn error_kinds_are_stable() {
        let io = PipelineError::io(
            "data/products.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(io.kind(), "io");
        assert_eq!(
            PipelineError::MissingTable { table: "x".into() }.kind(),
            "missing_table"
        );
        assert_eq!(PipelineError::graph("cycle").kind(), "graph");
        assert_eq!(PipelineError::Storage("poisoned".into()).kind(), "storage");
    }
}
