//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initialises logging
//! - parses CLI arguments into a `PipelineConfig`
//! - runs the requested pipeline stage
//! - prints reports and writes optional exports

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{AlertArgs, BacktestArgs, Command, FormulasArgs, PriceArgs, RunArgs, SensitivityArgs, SyncArgs};
use crate::data::{MAX_DAYS_BACK, MarketSource, SqliteMarketStore, YahooClient};
use crate::domain::{
    CachePolicy, CostInputs, CostParam, FormulaSelection, PerturbationRange, PipelineConfig,
};
use crate::error::{PricingError, Result};
use crate::io::CsvMarketSource;
use crate::pricing::{FormulaRegistry, PricingEngine};

pub mod pipeline;

use pipeline::PipelineContext;

/// Entry point for the `fp` binary.
pub fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Price(args) => handle_price(args),
        Command::Quality(args) => handle_quality(args),
        Command::Sensitivity(args) => handle_sensitivity(args),
        Command::Backtest(args) => handle_backtest(args),
        Command::Formulas(args) => handle_formulas(args),
        Command::Sync(args) => handle_sync(args),
        Command::Alert(args) => handle_alert(args),
    }
}

/// Logs go to stderr so stdout stays clean for reports.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fair_price=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn handle_price(args: PriceArgs) -> Result<()> {
    let ctx = PipelineContext::from_config(pipeline_config_from_args(&args.run)?)?;
    let run = ctx.run_price()?;
    let config = ctx.config();

    let mut out = crate::report::format_header("price", config.asof_date, run.source());
    if let Some(latest) = run.latest() {
        out.push('\n');
        out.push_str(&crate::report::format_breakdown(latest, &config.inputs));
    }
    out.push('\n');
    out.push_str(&crate::report::format_series_tail(&run.priced, args.tail));
    out.push('\n');
    out.push_str(&crate::report::format_confidence(&run.confidence));
    println!("{out}");

    if let Some(path) = &args.export {
        crate::io::write_priced_csv(path, &run.priced)?;
    }
    if let Some(path) = &args.export_json {
        let doc = serde_json::json!({
            "asof": config.asof_date,
            "source": run.source(),
            "report": &run.series.report,
            "confidence": &run.confidence,
            "priced": &run.priced,
        });
        crate::io::write_json(path, &doc)?;
    }
    Ok(())
}

fn handle_quality(args: RunArgs) -> Result<()> {
    let ctx = PipelineContext::from_config(pipeline_config_from_args(&args)?)?;
    let series = ctx.load_series()?;

    let mut out = crate::report::format_header("data quality", ctx.config().asof_date, series.report.source);
    out.push('\n');
    out.push_str(&crate::report::format_validation(&series.report));
    println!("{out}");
    Ok(())
}

fn handle_sensitivity(args: SensitivityArgs) -> Result<()> {
    let mut config = pipeline_config_from_args(&args.run)?;
    config.sensitivity_ranges = merge_ranges(PerturbationRange::defaults(), &args.ranges)?;

    let ctx = PipelineContext::from_config(config)?;
    let (series, result) = ctx.run_sensitivity()?;

    let mut out = crate::report::format_header("sensitivity", ctx.config().asof_date, series.report.source);
    out.push('\n');
    out.push_str(&crate::report::format_sensitivity(&result));
    println!("{out}");
    Ok(())
}

fn handle_backtest(args: BacktestArgs) -> Result<()> {
    let realized = crate::io::load_realized_prices(&args.realized)?;
    for e in &realized.row_errors {
        tracing::warn!(line = e.line, error = %e.message, "realized price row skipped");
    }

    let ctx = PipelineContext::from_config(pipeline_config_from_args(&args.run)?)?;
    let report = ctx.run_backtest(&realized.prices)?;
    println!("{}", crate::report::format_backtest(&report));
    Ok(())
}

fn handle_formulas(args: FormulasArgs) -> Result<()> {
    let asof = args.asof.unwrap_or_else(pipeline::today);
    println!("{}", crate::report::format_formulas(&FormulaRegistry::builtin(), asof));
    Ok(())
}

fn handle_sync(args: SyncArgs) -> Result<()> {
    let config = pipeline_config_from_args(&args.run)?;
    let db_path = config
        .db_path
        .clone()
        .ok_or_else(|| PricingError::Config("`sync` needs a store path (--db or FP_DB_PATH).".to_string()))?;
    let store = SqliteMarketStore::open(&db_path)?;

    let source: Box<dyn MarketSource> = match &args.from_csv {
        Some(path) => Box::new(CsvMarketSource::new(path)),
        None if config.offline => {
            return Err(PricingError::Config(
                "`sync --offline` needs --from-csv; the external API is disabled.".to_string(),
            ));
        }
        None => Box::new(YahooClient::new(config.api_base_url.clone())?),
    };

    let engine = PricingEngine::new(FormulaRegistry::builtin(), config.asof_date);
    let summary = pipeline::sync_store(&store, source.as_ref(), &engine, &config)?;

    println!(
        "Synced {} rows from {} into {} ({} FOB prices derived, {} rows in store)",
        summary.rows_written,
        summary.source,
        db_path.display(),
        summary.derived_filled,
        store.row_count()?,
    );
    for w in &summary.warnings {
        println!("  - {w}");
    }
    Ok(())
}

fn handle_alert(args: AlertArgs) -> Result<()> {
    let mut config = pipeline_config_from_args(&args.run)?;
    config.alert_threshold = args.threshold;

    let ctx = PipelineContext::from_config(config)?;
    let alert = ctx.run_alert()?;
    print!("{}", crate::report::format_alert(&alert));
    Ok(())
}

pub fn pipeline_config_from_args(args: &RunArgs) -> Result<PipelineConfig> {
    if args.days_back == 0 || args.days_back > MAX_DAYS_BACK {
        return Err(PricingError::InvalidInput(format!(
            "--days-back must be between 1 and {MAX_DAYS_BACK}, got {}.",
            args.days_back
        )));
    }
    let inputs = CostInputs {
        freight_cost: args.freight,
        internal_freight: args.internal_freight,
        tax_pct: args.tax,
        margin_pct: args.margin,
        customs_pct: args.customs,
    };
    crate::pricing::check_inputs(&inputs)?;

    Ok(PipelineConfig {
        asof_date: args.asof.unwrap_or_else(pipeline::today),
        days_back: args.days_back,
        formula: FormulaSelection::from_option(args.formula.as_deref()),
        inputs,
        db_path: args.db.clone(),
        audit_path: Some(args.audit.clone()),
        api_base_url: args.api_base_url.clone(),
        offline: args.offline,
        cache: CachePolicy::default(),
        sensitivity_ranges: PerturbationRange::defaults(),
        alert_threshold: crate::analysis::alert::DEFAULT_THRESHOLD,
    })
}

/// Apply `param=min:max` overrides on top of `base`, replacing same-param entries.
fn merge_ranges(mut base: Vec<PerturbationRange>, overrides: &[String]) -> Result<Vec<PerturbationRange>> {
    for raw in overrides {
        let range = parse_range(raw)?;
        match base.iter_mut().find(|r| r.param == range.param) {
            Some(existing) => *existing = range,
            None => base.push(range),
        }
    }
    Ok(base)
}

fn parse_range(raw: &str) -> Result<PerturbationRange> {
    let invalid = || PricingError::InvalidInput(format!("Invalid range '{raw}'. Expected PARAM=MIN:MAX."));

    let (name, bounds) = raw.split_once('=').ok_or_else(invalid)?;
    let (min, max) = bounds.split_once(':').ok_or_else(invalid)?;
    let param = CostParam::ALL
        .into_iter()
        .find(|p| {
            let n = name.trim();
            n.eq_ignore_ascii_case(p.name())
                || <CostParam as clap::ValueEnum>::to_possible_value(p).is_some_and(|v| v.matches(n, true))
        })
        .ok_or_else(|| PricingError::InvalidInput(format!("Unknown parameter '{name}' in range '{raw}'.")))?;
    let min: f64 = min.trim().parse().map_err(|_| invalid())?;
    let max: f64 = max.trim().parse().map_err(|_| invalid())?;
    if !(min.is_finite() && max.is_finite()) || min > max {
        return Err(invalid());
    }
    Ok(PerturbationRange::new(param, min, max))
}
