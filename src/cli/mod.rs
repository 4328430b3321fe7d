//! Command-line parsing for the `fp` fair-price tool.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! pipeline and pricing code; `app` turns these structs into a
//! [`PipelineConfig`](crate::domain::PipelineConfig).

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::data::yahoo::DEFAULT_BASE_URL;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fp", version, about = "Fair price calculator: market data -> cost buildup -> final price")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, validate and price the series; print the latest buildup and confidence.
    Price(PriceArgs),
    /// Fetch and validate only; print the data quality report.
    Quality(RunArgs),
    /// Rank cost inputs by their effect on the latest price.
    Sensitivity(SensitivityArgs),
    /// Compare theoretical prices with realized prices from a CSV.
    Backtest(BacktestArgs),
    /// List registered formula versions.
    Formulas(FormulasArgs),
    /// Copy market data from the external API (or a CSV) into the primary store.
    Sync(SyncArgs),
    /// Check the week-over-week price movement against a threshold.
    Alert(AlertArgs),
}

/// Options shared by every command that runs the pipeline.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// As-of date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub asof: Option<NaiveDate>,

    /// Calendar days of history to fetch.
    #[arg(long, default_value_t = 30)]
    pub days_back: u32,

    /// Pin a formula version (e.g. `1.0`). Defaults to the newest effective version.
    #[arg(long)]
    pub formula: Option<String>,

    /// SQLite market data store.
    #[arg(long, env = "FP_DB_PATH")]
    pub db: Option<PathBuf>,

    /// Audit log (`.jsonl` for JSON lines, anything else is SQLite).
    #[arg(long, env = "FP_AUDIT_PATH", default_value = "fp_audit.jsonl")]
    pub audit: PathBuf,

    /// Base URL of the chart API.
    #[arg(long, env = "FP_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Never call the external API.
    #[arg(long)]
    pub offline: bool,

    /// Ocean freight (USD/t).
    #[arg(long, default_value_t = 60.0)]
    pub freight: f64,

    /// Inland freight (local currency per unit).
    #[arg(long, default_value_t = 0.15)]
    pub internal_freight: f64,

    /// Tax as a fraction (0.18 = 18%).
    #[arg(long, default_value_t = 0.18)]
    pub tax: f64,

    /// Margin as a fraction.
    #[arg(long, default_value_t = 0.10)]
    pub margin: f64,

    /// Customs and port costs as a fraction of the landed value.
    #[arg(long, default_value_t = 0.12)]
    pub customs: f64,
}

#[derive(Debug, Args, Clone)]
pub struct PriceArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Show the last N rows of the priced series.
    #[arg(long, default_value_t = 10)]
    pub tail: usize,

    /// Export the priced series to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the full run (series, report, confidence) to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SensitivityArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Override a perturbation range: `param=min:max` (e.g. `freight=-20:20`).
    #[arg(long = "range", value_name = "PARAM=MIN:MAX")]
    pub ranges: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct BacktestArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// CSV with `date,price` columns of realized market prices.
    #[arg(long, value_name = "CSV")]
    pub realized: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct FormulasArgs {
    /// Date used to mark the current version. Defaults to today.
    #[arg(long)]
    pub asof: Option<NaiveDate>,
}

#[derive(Debug, Args, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Import from this CSV instead of the external API.
    #[arg(long = "from-csv", value_name = "CSV")]
    pub from_csv: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct AlertArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Relative move that triggers the alert.
    #[arg(long, default_value_t = crate::analysis::alert::DEFAULT_THRESHOLD)]
    pub threshold: f64,
}
