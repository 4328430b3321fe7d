//! Yahoo Finance chart API integration (external fallback tier).
//!
//! Two daily close series are fetched (benchmark crude future and the FX pair)
//! and joined on date. Days where either close is missing are dropped.
//!
//! Daily bars are stamped at midnight exchange time, so each timestamp is
//! shifted by the exchange's `gmtoffset` before taking its date.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::data::MarketSource;
use crate::domain::{DataSource, RawCell, RawTable};
use crate::error::{PricingError, SourceError};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const BENCHMARK_SYMBOL: &str = "CL=F";
pub const FX_SYMBOL: &str = "BRL=X";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PricingError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("fair-price/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PricingError::internal("Failed to build HTTP client", e))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, SourceError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive; include the whole end day.
        let period2 = end.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_400;

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()?;

        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }

        let body: ChartResponse = resp.json()?;
        let series = parse_chart(body)?;
        debug!(symbol, points = series.len(), "chart series fetched");
        Ok(series)
    }
}

impl MarketSource for YahooClient {
    fn tier(&self) -> DataSource {
        DataSource::ExternalApi
    }

    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<RawTable, SourceError> {
        let benchmark = self.fetch_series(BENCHMARK_SYMBOL, start, end)?;
        let fx = self.fetch_series(FX_SYMBOL, start, end)?;
        Ok(join_series(&benchmark, &fx, start, end))
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    /// Exchange offset from UTC in seconds; `gmtoffset` is all lowercase upstream.
    #[serde(default, rename = "gmtoffset")]
    gmt_offset: i64,
    #[serde(default)]
    exchange_timezone_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn parse_chart(body: ChartResponse) -> Result<Vec<(NaiveDate, f64)>, SourceError> {
    if let Some(err) = body.chart.error {
        return Err(SourceError::Malformed(format!(
            "{}: {}",
            err.code.unwrap_or_default(),
            err.description.unwrap_or_default()
        )));
    }

    let result = body
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| SourceError::Malformed("chart response has no result".to_string()))?;

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    if closes.len() != result.timestamp.len() {
        return Err(SourceError::Malformed(format!(
            "{} timestamps but {} closes",
            result.timestamp.len(),
            closes.len()
        )));
    }

    let offset = result.meta.as_ref().map_or(0, |m| m.gmt_offset);
    if let Some(tz) = result.meta.as_ref().and_then(|m| m.exchange_timezone_name.as_deref()) {
        debug!(exchange_tz = tz, gmt_offset = offset, "chart bars dated in exchange time");
    }

    let mut out = Vec::with_capacity(closes.len());
    for (ts, close) in result.timestamp.into_iter().zip(closes) {
        let Some(close) = close.filter(|v| v.is_finite()) else {
            continue;
        };
        let date = exchange_date(ts, offset)
            .ok_or_else(|| SourceError::Malformed(format!("invalid timestamp {ts}")))?;
        out.push((date, close));
    }
    Ok(out)
}

/// Calendar date of a bar timestamp in the exchange's local time.
fn exchange_date(ts: i64, gmt_offset: i64) -> Option<NaiveDate> {
    let utc = DateTime::from_timestamp(ts, 0)?;
    let local = utc.naive_utc().checked_add_signed(TimeDelta::try_seconds(gmt_offset)?)?;
    Some(local.date())
}

/// Inner join on date, ascending, restricted to `[start, end]`.
fn join_series(benchmark: &[(NaiveDate, f64)], fx: &[(NaiveDate, f64)], start: NaiveDate, end: NaiveDate) -> RawTable {
    let fx: BTreeMap<NaiveDate, f64> = fx.iter().copied().collect();
    // Later points for the same day win (intraday refreshes of the last bar).
    let benchmark: BTreeMap<NaiveDate, f64> = benchmark.iter().copied().collect();

    let mut table = RawTable::canonical(DataSource::ExternalApi);
    for (date, price) in benchmark.range(start..=end) {
        if let Some(rate) = fx.get(date) {
            table.push_row(vec![
                RawCell::Date(*date),
                RawCell::Number(*price),
                RawCell::Number(*rate),
                RawCell::Missing,
            ]);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn parses_chart_and_skips_null_closes() {
        // 2025-01-02 and 2025-01-03 at 00:00 UTC, then a null close.
        let json = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1735776000, 1735862400, 1736121600],
                    "indicators": { "quote": [{ "close": [73.1, 73.9, null] }] }
                }],
                "error": null
            }
        }"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();
        let series = parse_chart(body).unwrap();
        assert_eq!(series, vec![(d(2), 73.1), (d(3), 73.9)]);
    }

    #[test]
    fn fx_bars_stamped_at_london_midnight_keep_their_date() {
        // 2023-07-03 and 2023-07-07 00:00 BST, i.e. 23:00 UTC the day before.
        let json = r#"{
            "chart": {
                "result": [{
                    "meta": { "gmtoffset": 3600, "exchangeTimezoneName": "Europe/London" },
                    "timestamp": [1688338800, 1688684400],
                    "indicators": { "quote": [{ "close": [4.82, 4.87] }] }
                }],
                "error": null
            }
        }"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();
        let fx = parse_chart(body).unwrap();
        let jul = |day| NaiveDate::from_ymd_opt(2023, 7, day).unwrap();
        assert_eq!(fx, vec![(jul(3), 4.82), (jul(7), 4.87)]);

        // Benchmark bars for the same Monday and Friday pair with the same-day rates.
        let benchmark = vec![(jul(3), 69.8), (jul(7), 73.9)];
        let table = join_series(&benchmark, &fx, jul(1), jul(31));
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1][0], RawCell::Date(jul(7)));
        assert_eq!(table.rows[1][2], RawCell::Number(4.87));
    }

    #[test]
    fn negative_offsets_shift_back_into_the_exchange_day() {
        // 2025-01-02 05:00 UTC is 00:00 in New York (EST, -5h).
        assert_eq!(exchange_date(1735794000, -18_000), Some(d(2)));
        assert_eq!(exchange_date(1735794000, 0), Some(d(2)));
        assert_eq!(exchange_date(1735776000 - 1, 0), Some(d(1)));
    }

    #[test]
    fn chart_error_is_reported() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();
        let err = parse_chart(body).unwrap_err();
        assert!(err.to_string().contains("No data found"));
    }

    #[test]
    fn join_keeps_common_dates_only() {
        let benchmark = vec![(d(2), 73.0), (d(3), 74.0), (d(6), 75.0)];
        let fx = vec![(d(3), 5.1), (d(6), 5.2), (d(7), 5.3)];
        let table = join_series(&benchmark, &fx, d(1), d(31));
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], RawCell::Date(d(3)));
        assert_eq!(table.rows[1][2], RawCell::Number(5.2));
        assert_eq!(table.source, DataSource::ExternalApi);
    }
}
