//! Shared types, error model, and configuration for salespipe.
//!
//! This crate is the foundation depended on by all other salespipe crates.
//! It provides:
//! - [`PipelineError`]: the unified error type
//! - Domain types ([`RunId`], [`Preview`], [`MaterializeResult`], [`RunReport`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CONFIG_FILE_NAME, DatabaseConfig, HistoryConfig, PreviewConfig, RunConfig,
    SourcesConfig, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{PipelineError, Result};
pub use types::{MaterializeResult, Preview, RunId, RunReport, StepReport, StepStatus};
