//! Shared pricing pipeline used by every `fp` subcommand.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! fetch (cached) -> validate -> price -> analytics -> audit
//!
//! The context is built explicitly from a [`PipelineConfig`]; tests build it
//! from in-memory parts instead.

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use tracing::{info, warn};

use crate::analysis::{self, BacktestReport, ConfidenceAssessment, PriceAlert, RealizedPrice, SensitivityResult};
use crate::audit::{AuditEntry, AuditSink, MemoryAuditSink, open_sink};
use crate::data::{
    MarketDataCache, MarketSource, SourceChain, SqliteMarketStore, TtlCache, YahooClient, cache_key, fetch_from,
};
use crate::domain::{DataSource, PipelineConfig, RawTable};
use crate::error::{PricingError, Result};
use crate::pricing::{FormulaRegistry, PriceBreakdown, PricedObservation, PricingEngine};
use crate::validate::{ValidatedSeries, Validator};

/// All computed outputs of a single `fp price` run.
#[derive(Debug, Clone)]
pub struct PriceRun {
    pub series: ValidatedSeries,
    /// Ascending by date, one entry per validated observation.
    pub priced: Vec<PricedObservation>,
    pub confidence: ConfidenceAssessment,
}

impl PriceRun {
    pub fn source(&self) -> DataSource {
        self.series.report.source
    }

    /// Buildup of the most recent observation.
    pub fn latest(&self) -> Option<&PriceBreakdown> {
        self.priced.last().map(|p| &p.breakdown)
    }
}

/// Outcome of copying validated rows into the primary store.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub source: DataSource,
    pub rows_written: usize,
    pub derived_filled: usize,
    pub warnings: Vec<String>,
}

pub struct PipelineContext {
    config: PipelineConfig,
    sources: SourceChain,
    cache: Box<dyn MarketDataCache>,
    audit: Box<dyn AuditSink>,
    engine: PricingEngine,
}

impl PipelineContext {
    pub fn new(
        config: PipelineConfig,
        sources: SourceChain,
        cache: Box<dyn MarketDataCache>,
        audit: Box<dyn AuditSink>,
    ) -> Self {
        let engine = PricingEngine::new(FormulaRegistry::builtin(), config.asof_date);
        Self {
            config,
            sources,
            cache,
            audit,
            engine,
        }
    }

    /// Wire up the standard tiers, cache and audit sink described by `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let store = config
            .db_path
            .as_deref()
            .map(SqliteMarketStore::open)
            .transpose()?;
        let api = if config.offline {
            None
        } else {
            Some(YahooClient::new(config.api_base_url.clone())?)
        };
        let audit: Box<dyn AuditSink> = match &config.audit_path {
            Some(path) => open_sink(path)?,
            None => {
                warn!("no audit path configured; audit entries are kept in memory only");
                Box::new(MemoryAuditSink::new())
            }
        };
        let cache = Box::new(TtlCache::new(config.cache));
        Ok(Self::new(config, SourceChain::standard(store, api), cache, audit))
    }

    pub fn with_registry(mut self, registry: FormulaRegistry) -> Self {
        self.engine = PricingEngine::new(registry, self.config.asof_date);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch through the cache using the local wall clock.
    pub fn fetch_market_data(&self) -> Result<Arc<RawTable>> {
        self.fetch_market_data_at(Local::now().naive_local())
    }

    pub fn fetch_market_data_at(&self, now: NaiveDateTime) -> Result<Arc<RawTable>> {
        let key = cache_key(self.config.days_back);
        if let Some(table) = self.cache.get(&key, now) {
            info!(key = %key, rows = table.len(), "market data served from cache");
            return Ok(table);
        }
        let table = Arc::new(self.sources.fetch(self.config.days_back, self.config.asof_date)?);
        self.cache.put(&key, Arc::clone(&table), now);
        Ok(table)
    }

    /// Fetch, validate, and fill missing FOB prices from the selected formula.
    pub fn load_series(&self) -> Result<ValidatedSeries> {
        let raw = self.fetch_market_data()?;
        let mut series = Validator::new(self.config.asof_date).validate(&raw)?;
        if series.report.is_fallback() {
            warn!("pricing on synthetic fallback data");
        }
        let filled = self
            .engine
            .fill_derived_fob(&mut series.observations, &self.config.formula)?;
        info!(
            rows = series.observations.len(),
            warnings = series.report.warnings.len(),
            derived_filled = filled,
            "market data validated"
        );
        Ok(series)
    }

    pub fn run_price(&self) -> Result<PriceRun> {
        let series = self.load_series()?;
        self.price_series(series)
    }

    /// Price an already validated series, score it, and audit every computation.
    pub fn price_series(&self, series: ValidatedSeries) -> Result<PriceRun> {
        let priced = self
            .engine
            .price_series(&series.observations, &self.config.inputs, &self.config.formula)?;

        let recorded_at = Utc::now();
        for p in &priced {
            let entry = AuditEntry::new(
                "price",
                series.report.source,
                &p.observation,
                &self.config.inputs,
                &p.breakdown,
                recorded_at,
            );
            self.audit.append(&entry)?;
        }

        let confidence = analysis::assess_series(&priced, series.report.quality.completeness, self.config.asof_date);

        if let Some(latest) = priced.last() {
            info!(
                date = %latest.date(),
                formula = %latest.breakdown.formula_version,
                final_price = latest.final_price(),
                confidence = confidence.score,
                "price computed"
            );
        }

        Ok(PriceRun {
            series,
            priced,
            confidence,
        })
    }

    /// Sensitivity of the most recent observation's price.
    pub fn run_sensitivity(&self) -> Result<(ValidatedSeries, SensitivityResult)> {
        let series = self.load_series()?;
        let latest = series
            .observations
            .last()
            .ok_or_else(|| PricingError::DataValidation("No observations to analyze.".to_string()))?;

        let result = analysis::analyze(
            &self.engine,
            latest,
            &self.config.inputs,
            &self.config.sensitivity_ranges,
            &self.config.formula,
        )?;

        let base = self
            .engine
            .compute(latest, &self.config.inputs, &self.config.formula)?;
        self.audit.append(&AuditEntry::new(
            "sensitivity",
            series.report.source,
            latest,
            &self.config.inputs,
            &base,
            Utc::now(),
        ))?;

        Ok((series, result))
    }

    pub fn run_backtest(&self, realized: &[RealizedPrice]) -> Result<BacktestReport> {
        let run = self.run_price()?;
        if run.series.report.is_fallback() {
            warn!("backtesting against synthetic fallback data");
        }
        analysis::backtest(&run.priced, realized, &self.config.inputs)
    }

    pub fn run_alert(&self) -> Result<PriceAlert> {
        let run = self.run_price()?;
        let alert = analysis::check_movement(&run.priced, self.config.alert_threshold)?;
        if alert.triggered {
            warn!(
                variation = alert.variation,
                current = alert.current_price,
                reference = alert.reference_price,
                "price movement above threshold"
            );
        }
        Ok(alert)
    }
}

/// Pull `days_back` days from `source`, validate, derive FOB prices, and upsert
/// the result into `store`.
pub fn sync_store(
    store: &SqliteMarketStore,
    source: &dyn MarketSource,
    engine: &PricingEngine,
    config: &PipelineConfig,
) -> Result<SyncSummary> {
    let raw = fetch_from(source, config.days_back, config.asof_date)?;
    let mut series = Validator::new(config.asof_date).validate(&raw)?;
    let derived_filled = engine.fill_derived_fob(&mut series.observations, &config.formula)?;
    let rows_written = store.upsert(&series.observations)?;
    info!(source = %raw.source, rows_written, derived_filled, "store synced");
    Ok(SyncSummary {
        source: raw.source,
        rows_written,
        derived_filled,
        warnings: series.report.warnings,
    })
}

/// Default as-of date when none is given.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
