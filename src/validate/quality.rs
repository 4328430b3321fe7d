//! Validation report and data-quality metrics.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::domain::{DataSource, Field, MarketObservation};

/// Per-run validation summary. Ephemeral; consumed by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Fetch tier the table came from; `Fallback` means synthetic data.
    pub source: DataSource,
    pub rows_read: usize,
    pub rows_used: usize,
    pub outliers: BTreeMap<Field, usize>,
    pub out_of_range: BTreeMap<Field, usize>,
    pub duplicates_removed: usize,
    pub missing_removed: usize,
    /// Human-readable warnings in validation-step order.
    pub warnings: Vec<String>,
    pub quality: QualityMetrics,
}

impl ValidationReport {
    pub fn is_fallback(&self) -> bool {
        self.source == DataSource::Fallback
    }

    pub fn outlier_count(&self) -> usize {
        self.outliers.values().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub span_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Non-missing share of recognised cells before cleaning, in `[0, 1]`.
    pub completeness: f64,
    pub duplicate_count: usize,
    pub date_range: Option<DateRange>,
    /// Weekdays inside the covered range with no observation.
    pub gap_count: usize,
    /// Days between the last observation and the as-of date.
    pub freshness_days: Option<i64>,
}

impl QualityMetrics {
    /// Metrics over an ascending, date-unique series.
    pub fn compute(
        observations: &[MarketObservation],
        completeness: f64,
        duplicate_count: usize,
        asof: NaiveDate,
    ) -> Self {
        let date_range = match (observations.first(), observations.last()) {
            (Some(first), Some(last)) => Some(DateRange {
                start: first.date,
                end: last.date,
                span_days: (last.date - first.date).num_days(),
            }),
            _ => None,
        };

        let gap_count = observations
            .windows(2)
            .map(|w| missing_weekdays_between(w[0].date, w[1].date))
            .sum();

        Self {
            completeness: completeness.clamp(0.0, 1.0),
            duplicate_count,
            date_range,
            gap_count,
            freshness_days: date_range.map(|r| (asof - r.end).num_days()),
        }
    }
}

/// Weekdays strictly between `a` and `b` (exclusive both ends).
fn missing_weekdays_between(a: NaiveDate, b: NaiveDate) -> usize {
    a.iter_days()
        .skip(1)
        .take_while(|d| *d < b)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count()
}
