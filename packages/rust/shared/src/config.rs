//! Application configuration for salespipe.
//!
//! Project config lives at `./salespipe.toml` next to the `data/` directory.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "salespipe.toml";

// ---------------------------------------------------------------------------
// Config structs (matching salespipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database file location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// CSV source locations.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Preview rendering.
    #[serde(default)]
    pub preview: PreviewConfig,

    /// Run history recording.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the DuckDB database file.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "data/mydb.duckdb".into()
}

/// `[sources]` section: one CSV path per load step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_products")]
    pub products: String,

    #[serde(default = "default_sales_reps")]
    pub sales_reps: String,

    #[serde(default = "default_sales_data")]
    pub sales_data: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            products: default_products(),
            sales_reps: default_sales_reps(),
            sales_data: default_sales_data(),
        }
    }
}

fn default_products() -> String {
    "data/products.csv".into()
}
fn default_sales_reps() -> String {
    "data/sales_reps.csv".into()
}
fn default_sales_data() -> String {
    "data/sales_data.csv".into()
}

/// `[preview]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Number of rows rendered in each step's preview.
    #[serde(default = "default_preview_rows")]
    pub rows: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            rows: default_preview_rows(),
        }
    }
}

fn default_preview_rows() -> usize {
    10
}

/// `[history]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Record each step outcome in the database's `_salespipe` schema.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for one pipeline run, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Database file to materialize into.
    pub database_path: PathBuf,
    /// Rows per preview.
    pub preview_rows: usize,
    /// Whether step outcomes are written to run history.
    pub record_history: bool,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            database_path: PathBuf::from(&config.database.path),
            preview_rows: config.preview.rows,
            record_history: config.history.enabled,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config file inside `dir`.
pub fn config_file_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Load `./salespipe.toml`. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = PathBuf::from(CONFIG_FILE_NAME);

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PipelineError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate(&config)?;
    Ok(config)
}

/// Reject values no run could use.
fn validate(config: &AppConfig) -> Result<()> {
    if config.preview.rows == 0 {
        return Err(PipelineError::config("preview.rows must be at least 1"));
    }
    if config.database.path.trim().is_empty() {
        return Err(PipelineError::config("database.path must not be empty"));
    }
    Ok(())
}

/// Write a default config file into `dir`. Returns the path to the created file.
///
/// Fails if a config file already exists there.
pub fn init_config(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;

    let path = config_file_path(dir);
    if path.exists() {
        return Err(PipelineError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PipelineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
