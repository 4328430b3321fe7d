//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between pipeline stages in-memory
//! - written to the audit log as JSON
//! - exported to CSV for spreadsheets

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which fetch tier produced a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    /// Persistent market data store.
    Primary,
    /// External financial data API.
    ExternalApi,
    /// Fixed synthetic series used when everything else failed.
    Fallback,
}

impl DataSource {
    pub fn label(self) -> &'static str {
        match self {
            DataSource::Primary => "primary",
            DataSource::ExternalApi => "external-api",
            DataSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Numeric fields of a market observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    BenchmarkPrice,
    FxRate,
    DerivedFobPrice,
}

impl Field {
    pub const NUMERIC: [Field; 3] = [Field::BenchmarkPrice, Field::FxRate, Field::DerivedFobPrice];

    /// Canonical column name.
    pub fn column(self) -> &'static str {
        match self {
            Field::BenchmarkPrice => "benchmark_price",
            Field::FxRate => "fx_rate",
            Field::DerivedFobPrice => "derived_fob_price",
        }
    }

    /// Realistic value range, if the field has one.
    pub fn domain_range(self) -> Option<(f64, f64)> {
        match self {
            Field::BenchmarkPrice => Some((10.0, 250.0)),
            Field::FxRate => Some((2.0, 10.0)),
            Field::DerivedFobPrice => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A data-quality flag attached to an observation during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum QualityFlag {
    /// Beyond 1.5 × IQR from the quartiles of its column.
    Outlier(Field),
    /// Outside the field's realistic domain range.
    OutOfRange(Field),
}

/// One validated daily row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketObservation {
    pub date: NaiveDate,
    pub benchmark_price: f64,
    pub fx_rate: f64,
    /// FOB price as read from the source. Once priced, it is the selected
    /// formula's FOB, the same value as the buildup's `fob` step.
    pub derived_fob_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<QualityFlag>,
}

impl MarketObservation {
    pub fn new(date: NaiveDate, benchmark_price: f64, fx_rate: f64) -> Self {
        Self {
            date,
            benchmark_price,
            fx_rate,
            derived_fob_price: None,
            flags: Vec::new(),
        }
    }

    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }
}

/// A loosely typed cell as delivered by a source tier.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Missing,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl From<f64> for RawCell {
    fn from(value: f64) -> Self {
        RawCell::Number(value)
    }
}

impl From<Option<f64>> for RawCell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(RawCell::Missing, RawCell::Number)
    }
}

impl From<NaiveDate> for RawCell {
    fn from(value: NaiveDate) -> Self {
        RawCell::Date(value)
    }
}

impl From<&str> for RawCell {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            RawCell::Missing
        } else {
            RawCell::Text(value.to_string())
        }
    }
}

/// Unvalidated table returned by a fetch tier.
///
/// Rows are positional and aligned with `columns`; short rows are treated as
/// having missing trailing cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub source: DataSource,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    pub fn new(source: DataSource, columns: &[&str]) -> Self {
        Self {
            source,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Table with the canonical column set used by all built-in sources.
    pub fn canonical(source: DataSource) -> Self {
        Self::new(
            source,
            &["date", "benchmark_price", "fx_rate", "derived_fob_price"],
        )
    }

    pub fn push_row(&mut self, row: Vec<RawCell>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Cost-buildup inputs. Percentages are fractions (18% → `0.18`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostInputs {
    /// Ocean freight in USD per tonne.
    pub freight_cost: f64,
    /// Inland freight in local currency per unit, added after landing.
    pub internal_freight: f64,
    pub tax_pct: f64,
    pub margin_pct: f64,
    /// Import duties and port costs applied to the landed value.
    pub customs_pct: f64,
}

impl Default for CostInputs {
    fn default() -> Self {
        Self {
            freight_cost: 60.0,
            internal_freight: 0.15,
            tax_pct: 0.18,
            margin_pct: 0.10,
            customs_pct: 0.12,
        }
    }
}

/// A cost-buildup input that can be perturbed in sensitivity analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CostParam {
    #[value(name = "freight")]
    FreightCost,
    #[value(name = "internal-freight")]
    InternalFreight,
    #[value(name = "tax")]
    TaxPct,
    #[value(name = "margin")]
    MarginPct,
    #[value(name = "customs")]
    CustomsPct,
}

impl CostParam {
    pub const ALL: [CostParam; 5] = [
        CostParam::FreightCost,
        CostParam::InternalFreight,
        CostParam::TaxPct,
        CostParam::MarginPct,
        CostParam::CustomsPct,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CostParam::FreightCost => "freight_cost",
            CostParam::InternalFreight => "internal_freight",
            CostParam::TaxPct => "tax_pct",
            CostParam::MarginPct => "margin_pct",
            CostParam::CustomsPct => "customs_pct",
        }
    }

    pub fn get(self, inputs: &CostInputs) -> f64 {
        match self {
            CostParam::FreightCost => inputs.freight_cost,
            CostParam::InternalFreight => inputs.internal_freight,
            CostParam::TaxPct => inputs.tax_pct,
            CostParam::MarginPct => inputs.margin_pct,
            CostParam::CustomsPct => inputs.customs_pct,
        }
    }

    /// Copy of `inputs` with this parameter replaced by `value`.
    pub fn with_value(self, inputs: &CostInputs, value: f64) -> CostInputs {
        let mut out = *inputs;
        match self {
            CostParam::FreightCost => out.freight_cost = value,
            CostParam::InternalFreight => out.internal_freight = value,
            CostParam::TaxPct => out.tax_pct = value,
            CostParam::MarginPct => out.margin_pct = value,
            CostParam::CustomsPct => out.customs_pct = value,
        }
        out
    }
}

impl fmt::Display for CostParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shift range applied to one parameter in sensitivity analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerturbationRange {
    pub param: CostParam,
    pub min_delta: f64,
    pub max_delta: f64,
}

impl PerturbationRange {
    pub fn new(param: CostParam, min_delta: f64, max_delta: f64) -> Self {
        Self {
            param,
            min_delta,
            max_delta,
        }
    }

    /// Default shifts: ±10 USD/t freight, ±0.05 inland freight, ±2pp tax and margin,
    /// ±2pp customs.
    pub fn defaults() -> Vec<PerturbationRange> {
        vec![
            PerturbationRange::new(CostParam::FreightCost, -10.0, 10.0),
            PerturbationRange::new(CostParam::InternalFreight, -0.05, 0.05),
            PerturbationRange::new(CostParam::TaxPct, -0.02, 0.02),
            PerturbationRange::new(CostParam::MarginPct, -0.02, 0.02),
            PerturbationRange::new(CostParam::CustomsPct, -0.02, 0.02),
        ]
    }
}

/// How to pick a formula version from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormulaSelection {
    /// Newest version already effective on the as-of date.
    #[default]
    Latest,
    /// A specific version id, regardless of effective date.
    Pinned(String),
}

impl FormulaSelection {
    pub fn from_option(version: Option<&str>) -> Self {
        match version {
            Some(v) => FormulaSelection::Pinned(v.to_string()),
            None => FormulaSelection::Latest,
        }
    }
}

/// Local-time window during which market data changes often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    /// Inclusive start hour (0-23).
    pub start_hour: u32,
    /// Exclusive end hour (1-24).
    pub end_hour: u32,
    pub weekdays_only: bool,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            weekdays_only: true,
        }
    }
}

/// Cache time-to-live policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub business_hours: BusinessHours,
    pub business_ttl_secs: u64,
    pub off_hours_ttl_secs: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            business_hours: BusinessHours::default(),
            business_ttl_secs: 300,
            off_hours_ttl_secs: 3600,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags plus environment defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub asof_date: NaiveDate,
    pub days_back: u32,
    pub formula: FormulaSelection,
    pub inputs: CostInputs,

    /// SQLite file holding the primary market data table.
    pub db_path: Option<PathBuf>,
    /// Audit log destination (`.jsonl` → JSON lines, otherwise SQLite).
    pub audit_path: Option<PathBuf>,
    pub api_base_url: String,
    /// Skip the external API tier entirely (offline runs).
    pub offline: bool,

    pub cache: CachePolicy,
    pub sensitivity_ranges: Vec<PerturbationRange>,
    /// Relative 7-day move that triggers a price alert.
    pub alert_threshold: f64,
}
