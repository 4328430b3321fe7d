//! Tiered market data fetch.
//!
//! Tiers are tried in order; an error or an empty table falls through to the
//! next one. Only when every tier has failed does the caller see
//! `DataSourceUnavailable`, and no partial table is ever returned.

use std::time::Instant;

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use crate::data::MarketSource;
use crate::data::store::SqliteMarketStore;
use crate::data::synthetic::SyntheticSource;
use crate::data::yahoo::YahooClient;
use crate::domain::RawTable;
use crate::error::{PricingError, Result, SourceError};

/// Longest fetch window accepted, in calendar days (about 20 years).
pub const MAX_DAYS_BACK: u32 = 7_300;

pub struct SourceChain {
    tiers: Vec<Box<dyn MarketSource>>,
}

impl SourceChain {
    pub fn new(tiers: Vec<Box<dyn MarketSource>>) -> Self {
        Self { tiers }
    }

    /// Primary store → external API → synthetic data.
    pub fn standard(store: Option<SqliteMarketStore>, api: Option<YahooClient>) -> Self {
        let mut tiers: Vec<Box<dyn MarketSource>> = Vec::new();
        if let Some(store) = store {
            tiers.push(Box::new(store));
        }
        if let Some(api) = api {
            tiers.push(Box::new(api));
        }
        tiers.push(Box::new(SyntheticSource));
        Self { tiers }
    }

    /// Fetch the last `days_back` calendar days up to and including `asof`.
    pub fn fetch(&self, days_back: u32, asof: NaiveDate) -> Result<RawTable> {
        let start = window_start(days_back, asof)?;
        info!(days_back, %start, end = %asof, "market data fetch started");

        let mut attempts = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            let label = tier.tier();
            let started = Instant::now();
            match tier.fetch(start, asof) {
                Ok(table) if !table.is_empty() => {
                    info!(
                        source = %label,
                        rows = table.len(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "market data loaded"
                    );
                    return Ok(table);
                }
                Ok(_) => {
                    warn!(source = %label, "source returned no rows, falling through");
                    attempts.push(format!("{label}: {}", SourceError::Empty));
                }
                Err(e) => {
                    warn!(source = %label, error = %e, "source failed, falling through");
                    attempts.push(format!("{label}: {e}"));
                }
            }
        }

        Err(PricingError::DataSourceUnavailable(if attempts.is_empty() {
            "no sources configured".to_string()
        } else {
            attempts.join("; ")
        }))
    }
}

/// Fetch from a single tier, without fallthrough.
///
/// An empty table counts as a failure, as it would inside a chain.
pub fn fetch_from(source: &dyn MarketSource, days_back: u32, asof: NaiveDate) -> Result<RawTable> {
    let start = window_start(days_back, asof)?;
    let label = source.tier();
    match source.fetch(start, asof) {
        Ok(table) if !table.is_empty() => Ok(table),
        Ok(_) => Err(PricingError::DataSourceUnavailable(format!("{label}: {}", SourceError::Empty))),
        Err(e) => Err(PricingError::DataSourceUnavailable(format!("{label}: {e}"))),
    }
}

fn window_start(days_back: u32, asof: NaiveDate) -> Result<NaiveDate> {
    if days_back == 0 || days_back > MAX_DAYS_BACK {
        return Err(PricingError::InvalidInput(format!(
            "days_back must be between 1 and {MAX_DAYS_BACK}, got {days_back}."
        )));
    }
    asof.checked_sub_signed(Duration::days(i64::from(days_back)))
        .ok_or_else(|| PricingError::InvalidInput(format!("days_back {days_back} reaches before the calendar start.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataSource, RawCell};

    struct Failing(DataSource);

    impl MarketSource for Failing {
        fn tier(&self) -> DataSource {
            self.0
        }
        fn fetch(&self, _: NaiveDate, _: NaiveDate) -> std::result::Result<RawTable, SourceError> {
            Err(SourceError::Malformed("connection refused".into()))
        }
    }

    struct Fixed(DataSource, usize);

    impl MarketSource for Fixed {
        fn tier(&self) -> DataSource {
            self.0
        }
        fn fetch(&self, start: NaiveDate, _: NaiveDate) -> std::result::Result<RawTable, SourceError> {
            let mut t = RawTable::canonical(self.0);
            for i in 0..self.1 {
                t.push_row(vec![
                    RawCell::Date(start + Duration::days(i as i64)),
                    RawCell::Number(70.0),
                    RawCell::Number(5.0),
                    RawCell::Missing,
                ]);
            }
            Ok(t)
        }
    }

    fn asof() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[test]
    fn first_non_empty_tier_wins() {
        let chain = SourceChain::new(vec![
            Box::new(Fixed(DataSource::Primary, 0)),
            Box::new(Fixed(DataSource::ExternalApi, 4)),
            Box::new(SyntheticSource),
        ]);
        let table = chain.fetch(30, asof()).unwrap();
        assert_eq!(table.source, DataSource::ExternalApi);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn synthetic_tier_catches_total_failure() {
        let chain = SourceChain::new(vec![
            Box::new(Fixed(DataSource::Primary, 0)),
            Box::new(Failing(DataSource::ExternalApi)),
            Box::new(SyntheticSource),
        ]);
        let table = chain.fetch(7, asof()).unwrap();
        assert_eq!(table.source, DataSource::Fallback);
        assert_eq!(table.len(), 8);
    }

    #[test]
    fn all_tiers_failing_is_unavailable() {
        let chain = SourceChain::new(vec![
            Box::new(Failing(DataSource::Primary)),
            Box::new(Failing(DataSource::ExternalApi)),
        ]);
        match chain.fetch(7, asof()) {
            Err(PricingError::DataSourceUnavailable(msg)) => {
                assert!(msg.contains("primary"));
                assert!(msg.contains("external-api"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn single_tier_fetch_does_not_fall_through() {
        let err = fetch_from(&Fixed(DataSource::ExternalApi, 0), 7, asof()).unwrap_err();
        assert!(matches!(err, PricingError::DataSourceUnavailable(_)));
        assert_eq!(fetch_from(&Fixed(DataSource::ExternalApi, 3), 7, asof()).unwrap().len(), 3);
    }

    #[test]
    fn zero_days_back_is_rejected() {
        let chain = SourceChain::standard(None, None);
        assert!(matches!(chain.fetch(0, asof()), Err(PricingError::InvalidInput(_))));
    }

    #[test]
    fn oversized_days_back_is_rejected_without_fetching() {
        let chain = SourceChain::standard(None, None);
        assert!(matches!(chain.fetch(u32::MAX, asof()), Err(PricingError::InvalidInput(_))));
        assert!(matches!(
            chain.fetch(MAX_DAYS_BACK + 1, asof()),
            Err(PricingError::InvalidInput(_))
        ));
        assert!(matches!(
            fetch_from(&SyntheticSource, u32::MAX, asof()),
            Err(PricingError::InvalidInput(_))
        ));
        assert_eq!(chain.fetch(MAX_DAYS_BACK, asof()).unwrap().len(), MAX_DAYS_BACK as usize + 1);
    }

    #[test]
    fn window_before_the_calendar_start_is_rejected() {
        let earliest = NaiveDate::MIN + Duration::days(3);
        assert!(matches!(window_start(10, earliest), Err(PricingError::InvalidInput(_))));
        assert_eq!(window_start(3, earliest).unwrap(), NaiveDate::MIN);
    }
}
