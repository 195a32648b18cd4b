//! Pipeline orchestration for salespipe.
//!
//! This crate declares the steps (CSV loads and the derived join view),
//! validates their dependency graph, and runs them against the shared
//! warehouse in dependency order.

pub mod graph;
pub mod pipeline;
pub mod registry;
pub mod steps;

pub use graph::StepGraph;
pub use pipeline::{Pipeline, ProgressReporter, RunOptions, SilentProgress};
pub use registry::{Definitions, sales_pipeline};
pub use steps::{CsvLoad, Step, StepContext, ViewStep, joined_data};
