//! CSV ingest.
//!
//! Two file shapes are read here:
//!
//! - market data exports (`date, benchmark_price, fx_rate[, derived_fob_price]`),
//!   loaded as an untyped [`RawTable`] so the validator sees them exactly like
//!   any other source
//! - realized prices (`date, price`) for backtests, parsed strictly with
//!   row-level errors

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::StringRecord;

use crate::analysis::RealizedPrice;
use crate::data::MarketSource;
use crate::domain::{DataSource, RawCell, RawTable};
use crate::error::{PricingError, Result, SourceError};
use crate::validate::parse_date;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Parsed realized prices plus rows that could not be used.
#[derive(Debug, Clone)]
pub struct RealizedPrices {
    /// Ascending by date.
    pub prices: Vec<RealizedPrice>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path)
        .map_err(|e| PricingError::InvalidInput(format!("Failed to open CSV '{}': {e}", path.display())))?;
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

/// Read a market data CSV into an unvalidated table.
///
/// Cells are kept as text; the validator does the typing and reports problems.
pub fn load_market_csv(path: &Path, source: DataSource) -> Result<RawTable> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| PricingError::InvalidInput(format!("Failed to read CSV headers: {e}")))?
        .clone();

    let mut table = RawTable {
        source,
        columns: headers.iter().map(str::to_string).collect(),
        rows: Vec::new(),
    };

    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            PricingError::InvalidInput(format!("CSV parse error on line {}: {e}", idx + 2))
        })?;
        table.push_row(record.iter().map(RawCell::from).collect());
    }

    Ok(table)
}

/// Market data CSV used as a fetch tier.
#[derive(Debug, Clone)]
pub struct CsvMarketSource {
    path: PathBuf,
}

impl CsvMarketSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MarketSource for CsvMarketSource {
    fn tier(&self) -> DataSource {
        DataSource::Primary
    }

    /// Rows with an unreadable date are passed through for the validator to
    /// count; rows with a readable date outside the window are dropped.
    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> std::result::Result<RawTable, SourceError> {
        let mut table = load_market_csv(&self.path, DataSource::Primary).map_err(|e| SourceError::Malformed(e.to_string()))?;
        let header_map = build_header_map(&table.columns);
        let Some(&date_idx) = header_map.get("date") else {
            return Ok(table);
        };
        table.rows.retain(|row| match row.get(date_idx) {
            Some(RawCell::Text(s)) => parse_date(s).is_none_or(|d| d >= start && d <= end),
            _ => true,
        });
        Ok(table)
    }
}

/// Read a `date,price` CSV of realized market prices.
pub fn load_realized_prices(path: &Path) -> Result<RealizedPrices> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| PricingError::InvalidInput(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let columns: Vec<String> = headers.iter().map(str::to_string).collect();
    let header_map = build_header_map(&columns);

    for required in ["date", "price"] {
        if !header_map.contains_key(required) {
            return Err(PricingError::InvalidInput(format!(
                "Missing required column in '{}': `{required}`",
                path.display()
            )));
        }
    }

    let mut prices = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_realized_row(&record, &header_map) {
            Ok(p) => prices.push(p),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if prices.is_empty() {
        return Err(PricingError::InvalidInput(format!(
            "No usable realized prices in '{}'.",
            path.display()
        )));
    }

    prices.sort_by_key(|p| p.date);

    Ok(RealizedPrices {
        prices,
        row_errors,
        rows_read,
    })
}

fn parse_realized_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> std::result::Result<RealizedPrice, String> {
    let raw_date = get_required(record, header_map, "date")?;
    let date = parse_date(raw_date).ok_or_else(|| {
        format!("Invalid date '{raw_date}'. Expected one of: YYYY-MM-DD, DD/MM/YYYY, DD-MM-YYYY, YYYY/MM/DD.")
    })?;
    let raw_price = get_required(record, header_map, "price")?;
    let price = raw_price
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| format!("Invalid `price` '{raw_price}' (must be finite and > 0)."))?;
    Ok(RealizedPrice { date, price })
}

fn build_header_map(columns: &[String]) -> HashMap<String, usize> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

pub(crate) fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> std::result::Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tmp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("fp-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn market_csv_keeps_cells_as_text() {
        let path = write_tmp(
            "market.csv",
            "\u{feff}Date,WTI,USD_BRL\n2025-01-02,75.1,5.01\n2025-01-03,,5.02\n",
        );
        let table = load_market_csv(&path, DataSource::Primary).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][1], RawCell::Text("75.1".into()));
        assert_eq!(table.rows[1][1], RawCell::Missing);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn csv_source_filters_by_window() {
        let path = write_tmp(
            "window.csv",
            "date,benchmark_price,fx_rate\n2025-01-01,70,5\n2025-01-05,71,5\nnot-a-date,72,5\n2025-02-01,73,5\n",
        );
        let src = CsvMarketSource::new(&path);
        let start = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let table = src.fetch(start, end).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.source, DataSource::Primary);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_csv_is_a_source_error() {
        let src = CsvMarketSource::new("/nonexistent/fp-market.csv");
        let d = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(src.fetch(d, d), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn realized_prices_report_bad_rows() {
        let path = write_tmp(
            "realized.csv",
            "date,price\n2025-01-03,9.5\n2025-01-02,9.4\nbad,9.0\n2025-01-04,-1\n2025-01-05,\n",
        );
        let out = load_realized_prices(&path).unwrap();
        assert_eq!(out.rows_read, 5);
        assert_eq!(out.prices.len(), 2);
        assert_eq!(out.prices[0].date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        let lines: Vec<usize> = out.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![4, 5, 6]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn realized_prices_require_price_column() {
        let path = write_tmp("noprice.csv", "date,value\n2025-01-02,1\n");
        assert!(matches!(load_realized_prices(&path), Err(PricingError::InvalidInput(_))));
        let _ = std::fs::remove_file(&path);
    }
}
