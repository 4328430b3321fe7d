//! Market data validation and cleaning.
//!
//! This module turns a loosely typed [`RawTable`] from any fetch tier into a
//! clean, date-unique series of [`MarketObservation`]s plus a
//! [`ValidationReport`].
//!
//! Only structural problems are errors (empty table, missing required column,
//! nothing left after cleaning). Data-quality problems become warnings and
//! per-row flags:
//!
//! 1. coerce numeric fields and dates (unparseable → missing)
//! 2. flag IQR outliers per numeric field (never dropped)
//! 3. flag values outside the realistic domain range (never dropped)
//! 4. drop duplicate dates, keeping the last occurrence
//! 5. drop rows missing a required field

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::domain::{Field, MarketObservation, QualityFlag, RawCell, RawTable};
use crate::error::{PricingError, Result};
use crate::io::ingest::normalize_header_name;
use crate::math::iqr_fences;

pub mod quality;

pub use quality::*;

/// Tukey fence multiplier.
pub const IQR_K: f64 = 1.5;

/// Validation output.
#[derive(Debug, Clone)]
pub struct ValidatedSeries {
    /// Ascending by date, unique by date.
    pub observations: Vec<MarketObservation>,
    pub report: ValidationReport,
}

/// Stateless validator bound to an as-of date (used for freshness).
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    pub asof: NaiveDate,
    pub iqr_k: f64,
}

impl Validator {
    pub fn new(asof: NaiveDate) -> Self {
        Self { asof, iqr_k: IQR_K }
    }

    pub fn validate(&self, raw: &RawTable) -> Result<ValidatedSeries> {
        if raw.is_empty() {
            return Err(PricingError::DataValidation(format!(
                "Empty table received from {} source.",
                raw.source
            )));
        }

        let columns = resolve_columns(&raw.columns)?;
        let mut rows: Vec<ParsedRow> = raw.rows.iter().map(|r| parse_row(r, &columns)).collect();
        let rows_read = rows.len();
        let completeness = completeness(&rows, columns.has_fob());

        let mut warnings = Vec::new();

        // Outliers: reported and flagged, never dropped.
        let mut outliers = BTreeMap::new();
        for field in Field::NUMERIC {
            let values: Vec<f64> = rows.iter().filter_map(|r| r.get(field)).collect();
            let Some((lo, hi)) = iqr_fences(&values, self.iqr_k) else {
                continue;
            };
            let mut count = 0;
            for row in rows.iter_mut() {
                if let Some(v) = row.get(field) {
                    if v < lo || v > hi {
                        row.flags.push(QualityFlag::Outlier(field));
                        count += 1;
                    }
                }
            }
            if count > 0 {
                warn!(field = %field, count, "outliers detected");
                warnings.push(format!("{count} outliers detected in {field}"));
                outliers.insert(field, count);
            }
        }

        // Domain ranges: warned and flagged, rows retained.
        let mut out_of_range = BTreeMap::new();
        for field in Field::NUMERIC {
            let Some((lo, hi)) = field.domain_range() else {
                continue;
            };
            let mut count = 0;
            for row in rows.iter_mut() {
                if let Some(v) = row.get(field) {
                    if v < lo || v > hi {
                        row.flags.push(QualityFlag::OutOfRange(field));
                        count += 1;
                    }
                }
            }
            if count > 0 {
                warnings.push(format!(
                    "{field} outside expected range ({lo}-{hi}) in {count} rows"
                ));
                out_of_range.insert(field, count);
            }
        }

        // Duplicate dates: the last occurrence is the most recently fetched.
        let before = rows.len();
        let mut seen = HashSet::new();
        let mut deduped: Vec<ParsedRow> = rows
            .into_iter()
            .rev()
            .filter(|r| r.date.is_none_or(|d| seen.insert(d)))
            .collect();
        deduped.reverse();
        let duplicates_removed = before - deduped.len();
        if duplicates_removed > 0 {
            warnings.push(format!("Removed {duplicates_removed} duplicate dates"));
        }

        // Missing required fields.
        let before = deduped.len();
        let mut observations: Vec<MarketObservation> =
            deduped.into_iter().filter_map(ParsedRow::into_observation).collect();
        let missing_removed = before - observations.len();
        if missing_removed > 0 {
            warnings.push(format!(
                "Removed {missing_removed} rows with missing required fields"
            ));
        }

        if observations.is_empty() {
            return Err(PricingError::DataValidation(
                "No valid rows remain after validation.".to_string(),
            ));
        }

        observations.sort_by_key(|o| o.date);

        let quality = QualityMetrics::compute(&observations, completeness, duplicates_removed, self.asof);
        debug!(
            rows_read,
            rows_used = observations.len(),
            completeness = quality.completeness,
            "validation finished"
        );

        let report = ValidationReport {
            source: raw.source,
            rows_read,
            rows_used: observations.len(),
            outliers,
            out_of_range,
            duplicates_removed,
            missing_removed,
            warnings,
            quality,
        };

        Ok(ValidatedSeries {
            observations,
            report,
        })
    }
}

/// Column positions of the recognised fields.
#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    date: usize,
    benchmark: usize,
    fx: usize,
    fob: Option<usize>,
}

impl ColumnIndex {
    fn has_fob(&self) -> bool {
        self.fob.is_some()
    }
}

const DATE_ALIASES: [&str; 1] = ["date"];
const BENCHMARK_ALIASES: [&str; 2] = ["benchmark_price", "wti"];
const FX_ALIASES: [&str; 2] = ["fx_rate", "usd_brl"];
const FOB_ALIASES: [&str; 2] = ["derived_fob_price", "pp_fob_usd"];

fn resolve_columns(columns: &[String]) -> Result<ColumnIndex> {
    let header_map: HashMap<String, usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect();

    let find = |aliases: &[&str]| aliases.iter().find_map(|a| header_map.get(*a).copied());

    let date = find(&DATE_ALIASES);
    let benchmark = find(&BENCHMARK_ALIASES);
    let fx = find(&FX_ALIASES);

    let mut missing = Vec::new();
    if date.is_none() {
        missing.push("date");
    }
    if benchmark.is_none() {
        missing.push(Field::BenchmarkPrice.column());
    }
    if fx.is_none() {
        missing.push(Field::FxRate.column());
    }

    match (date, benchmark, fx) {
        (Some(date), Some(benchmark), Some(fx)) => Ok(ColumnIndex {
            date,
            benchmark,
            fx,
            fob: find(&FOB_ALIASES),
        }),
        _ => Err(PricingError::DataValidation(format!(
            "Missing required columns: {}",
            missing.join(", ")
        ))),
    }
}

#[derive(Debug, Clone)]
struct ParsedRow {
    date: Option<NaiveDate>,
    benchmark: Option<f64>,
    fx: Option<f64>,
    fob: Option<f64>,
    flags: Vec<QualityFlag>,
}

impl ParsedRow {
    fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::BenchmarkPrice => self.benchmark,
            Field::FxRate => self.fx,
            Field::DerivedFobPrice => self.fob,
        }
    }

    fn into_observation(self) -> Option<MarketObservation> {
        Some(MarketObservation {
            date: self.date?,
            benchmark_price: self.benchmark?,
            fx_rate: self.fx?,
            derived_fob_price: self.fob,
            flags: self.flags,
        })
    }
}

fn parse_row(row: &[RawCell], columns: &ColumnIndex) -> ParsedRow {
    let cell = |idx: usize| row.get(idx).unwrap_or(&RawCell::Missing);
    ParsedRow {
        date: coerce_date(cell(columns.date)),
        benchmark: coerce_f64(cell(columns.benchmark)),
        fx: coerce_f64(cell(columns.fx)),
        fob: columns.fob.and_then(|idx| coerce_f64(cell(idx))),
        flags: Vec::new(),
    }
}

fn coerce_f64(cell: &RawCell) -> Option<f64> {
    let v = match cell {
        RawCell::Number(v) => *v,
        RawCell::Text(s) => s.trim().parse::<f64>().ok()?,
        RawCell::Missing | RawCell::Date(_) => return None,
    };
    v.is_finite().then_some(v)
}

fn coerce_date(cell: &RawCell) -> Option<NaiveDate> {
    match cell {
        RawCell::Date(d) => Some(*d),
        RawCell::Text(s) => parse_date(s.trim()),
        RawCell::Missing | RawCell::Number(_) => None,
    }
}

/// Parse a date in one of the formats seen in exports and store dumps.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Share of non-missing cells among the recognised columns.
fn completeness(rows: &[ParsedRow], has_fob: bool) -> f64 {
    let width = if has_fob { 4 } else { 3 };
    let total = rows.len() * width;
    if total == 0 {
        return 0.0;
    }
    let present: usize = rows
        .iter()
        .map(|r| {
            let mut n = usize::from(r.date.is_some())
                + usize::from(r.benchmark.is_some())
                + usize::from(r.fx.is_some());
            if has_fob {
                n += usize::from(r.fob.is_some());
            }
            n
        })
        .sum();
    present as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DataSource;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn table(rows: &[(RawCell, RawCell, RawCell)]) -> RawTable {
        let mut t = RawTable::new(DataSource::Primary, &["Date", "WTI", "USD_BRL"]);
        for (a, b, c) in rows {
            t.push_row(vec![a.clone(), b.clone(), c.clone()]);
        }
        t
    }

    fn steady(n: u32) -> Vec<(RawCell, RawCell, RawCell)> {
        (1..=n)
            .map(|i| {
                (
                    RawCell::Date(d(i)),
                    RawCell::Number(70.0 + (i % 5) as f64),
                    RawCell::Number(5.0 + (i % 3) as f64 * 0.05),
                )
            })
            .collect()
    }

    fn validator() -> Validator {
        Validator::new(d(31))
    }

    #[test]
    fn missing_required_column_is_structural() {
        let mut t = RawTable::new(DataSource::Primary, &["date", "wti"]);
        t.push_row(vec![RawCell::Date(d(1)), RawCell::Number(70.0)]);
        let err = validator().validate(&t).unwrap_err();
        match err {
            PricingError::DataValidation(msg) => assert!(msg.contains("fx_rate")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_table_is_structural() {
        let t = RawTable::canonical(DataSource::ExternalApi);
        assert!(matches!(validator().validate(&t), Err(PricingError::DataValidation(_))));
    }

    #[test]
    fn out_of_range_row_is_kept_and_flagged() {
        let mut rows = steady(20);
        rows[4].1 = RawCell::Number(9999.0);
        let out = validator().validate(&table(&rows)).unwrap();

        assert_eq!(out.observations.len(), 20);
        let row = out.observations.iter().find(|o| o.date == d(5)).unwrap();
        assert_eq!(row.benchmark_price, 9999.0);
        assert!(row.flags.contains(&QualityFlag::OutOfRange(Field::BenchmarkPrice)));
        assert!(row.flags.contains(&QualityFlag::Outlier(Field::BenchmarkPrice)));
        assert!(out
            .report
            .warnings
            .iter()
            .any(|w| w.contains("benchmark_price outside expected range (10-250) in 1 rows")));
        assert_eq!(out.report.out_of_range.get(&Field::BenchmarkPrice), Some(&1));
    }

    #[test]
    fn duplicates_keep_last_and_missing_rows_drop() {
        let mut rows = steady(10);
        rows.push((RawCell::Date(d(3)), RawCell::Number(88.0), RawCell::Number(5.5)));
        rows.push((RawCell::Date(d(12)), RawCell::Text("n/a".into()), RawCell::Number(5.1)));
        let out = validator().validate(&table(&rows)).unwrap();

        assert_eq!(out.report.rows_read, 12);
        assert_eq!(out.report.duplicates_removed, 1);
        assert_eq!(out.report.missing_removed, 1);
        assert_eq!(out.observations.len(), 10);
        let day3 = out.observations.iter().find(|o| o.date == d(3)).unwrap();
        assert_eq!(day3.benchmark_price, 88.0);
        // Outlier warnings for the 88.0 / 5.5 row come first; cleaning steps last.
        assert!(out.report.warnings.ends_with(&[
            "Removed 1 duplicate dates".to_string(),
            "Removed 1 rows with missing required fields".to_string(),
        ]));
    }

    #[test]
    fn text_cells_are_coerced() {
        let rows = vec![
            (RawCell::from("2025-01-02"), RawCell::from("71.5"), RawCell::from(" 5.01 ")),
            (RawCell::from("03/01/2025"), RawCell::from("72"), RawCell::from("5.02")),
        ];
        let out = validator().validate(&table(&rows)).unwrap();
        assert_eq!(out.observations.len(), 2);
        assert_eq!(out.observations[1].date, d(3));
        assert_eq!(out.observations[1].fx_rate, 5.02);
        assert!((out.report.quality.completeness - 1.0).abs() < 1e-12);
    }

    #[test]
    fn output_is_sorted_by_date() {
        let mut rows = steady(5);
        rows.reverse();
        let out = validator().validate(&table(&rows)).unwrap();
        let dates: Vec<_> = out.observations.iter().map(|o| o.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }

    #[test]
    fn nothing_left_is_structural() {
        let rows = vec![(RawCell::Missing, RawCell::Number(70.0), RawCell::Number(5.0))];
        assert!(matches!(validator().validate(&table(&rows)), Err(PricingError::DataValidation(_))));
    }

    #[test]
    fn bom_prefixed_headers_resolve() {
        let mut t = RawTable::new(DataSource::Primary, &["\u{feff}date", "Benchmark_Price", "FX_RATE"]);
        t.push_row(vec![RawCell::Date(d(1)), RawCell::Number(70.0), RawCell::Number(5.0)]);
        assert!(validator().validate(&t).is_ok());
    }
}
