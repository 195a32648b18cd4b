//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use salespipe_core::{Pipeline, ProgressReporter, RunOptions, sales_pipeline};
use salespipe_shared::{
    AppConfig, RunConfig, RunReport, StepReport, StepStatus, init_config, load_config,
    load_config_from,
};
use salespipe_storage::Warehouse;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// salespipe: sales CSVs in, joined DuckDB view out.
#[derive(Parser)]
#[command(
    name = "salespipe",
    version,
    about = "Load sales CSVs into DuckDB and derive a joined sales view.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./salespipe.toml when present).
    #[arg(long, env = "SALESPIPE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Run report and history output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline (all steps, or a selection).
    Run {
        /// Step to run; repeat to select several. Defaults to all steps.
        #[arg(short, long = "select", value_name = "STEP")]
        select: Vec<String>,

        /// Also run the upstream dependencies of selected steps.
        #[arg(long)]
        with_upstream: bool,

        /// Database file (overrides config).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Do not record step outcomes in run history.
        #[arg(long)]
        no_history: bool,

        /// Report format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// List steps in execution order.
    List,

    /// Show recent step materializations.
    History {
        /// Number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Database file (overrides config).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write salespipe.toml with defaults into the current directory.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "salespipe=info",
        1 => "salespipe=debug",
        _ => "salespipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.config.as_deref())?;
    match cli.command {
        Command::Run {
            select,
            with_upstream,
            db,
            no_history,
            format,
        } => cmd_run(&config, select, with_upstream, db, no_history, format).await,
        Command::List => cmd_list(&config),
        Command::History { limit, db, format } => cmd_history(&config, limit, db, format),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config: &AppConfig,
    select: Vec<String>,
    with_upstream: bool,
    db: Option<PathBuf>,
    no_history: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut run_config = RunConfig::from(config);
    if let Some(db) = db {
        run_config.database_path = db;
    }
    if no_history {
        run_config.record_history = false;
    }

    let definitions = sales_pipeline(&config.sources)?;
    let warehouse = Warehouse::open(&run_config.database_path)?;
    let options = RunOptions {
        selection: select,
        with_upstream,
        ..RunOptions::from(&run_config)
    };

    info!(
        db = %run_config.database_path.display(),
        selection = ?options.selection,
        "running pipeline"
    );

    let reporter = CliProgress::new(format == OutputFormat::Text);
    let report = Pipeline::new(definitions, warehouse, options)
        .run(&reporter)
        .await?;

    match format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if !report.is_success() {
        let steps: Vec<&str> = report.unsuccessful().map(|s| s.step.as_str()).collect();
        return Err(eyre!("pipeline did not complete: {}", steps.join(", ")));
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Run:  {}", report.run_id);
    println!("  Time: {:.1}s", report.elapsed_ms as f64 / 1000.0);

    for step in &report.steps {
        println!();
        match &step.status {
            StepStatus::Materialized(result) => {
                println!("## {} ({} rows)", step.step, result.row_count);
                println!();
                print!("{}", result.preview.to_markdown());
            }
            StepStatus::Failed { kind, message } => {
                println!("## {} FAILED [{kind}]", step.step);
                println!("{message}");
            }
            StepStatus::Skipped { blocked_by } => {
                println!("## {} SKIPPED (blocked by {})", step.step, blocked_by.join(", "));
            }
        }
    }
    println!();
}

fn cmd_list(config: &AppConfig) -> Result<()> {
    let definitions = sales_pipeline(&config.sources)?;

    println!(
        "{:<4} {:<14} {:<10} {:<11} {:<36} SOURCE",
        "#", "STEP", "KIND", "GROUP", "DEPENDS ON"
    );
    for (i, step) in definitions.steps().iter().enumerate() {
        let deps = if step.deps().is_empty() {
            "-".to_string()
        } else {
            step.deps().join(", ")
        };
        let source = step
            .source()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<4} {:<14} {:<10} {:<11} {deps:<36} {source}",
            i + 1,
            step.name(),
            step.kind(),
            step.group()
        );
    }
    Ok(())
}

fn cmd_history(
    config: &AppConfig,
    limit: usize,
    db: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let path = db.unwrap_or_else(|| PathBuf::from(&config.database.path));
    if !path.exists() {
        return Err(eyre!(
            "no database at '{}': run the pipeline first",
            path.display()
        ));
    }

    let warehouse = Warehouse::open(&path)?;
    let entries = warehouse
        .with_connection(|conn| salespipe_storage::recent_history(conn, limit))?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }

    for entry in entries {
        let detail = match (entry.row_count, entry.message.as_deref()) {
            (Some(rows), _) => format!("{rows} rows"),
            (None, Some(message)) => message.to_string(),
            (None, None) => String::new(),
        };
        println!(
            "{}  {}  {:<12} {:<12} {:>6}ms  {detail}",
            entry.started_at, entry.run_id, entry.step, entry.status, entry.elapsed_ms
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let cwd = std::env::current_dir()
        .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    let path = init_config(&cwd)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn step_started(&self, step: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Materializing [{current}/{total}] {step}"));
    }

    fn step_finished(&self, report: &StepReport) {
        let line = match &report.status {
            StepStatus::Materialized(result) => format!(
                "  ✓ {:<12} {} rows ({} ms)",
                report.step, result.row_count, report.elapsed_ms
            ),
            StepStatus::Failed { kind, .. } => format!("  ✗ {:<12} failed [{kind}]", report.step),
            StepStatus::Skipped { .. } => format!("  - {:<12} skipped", report.step),
        };
        self.spinner.println(line);
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
