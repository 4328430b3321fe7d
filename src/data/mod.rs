//! Market data sources.
//!
//! - SQLite primary store (`store`)
//! - Yahoo Finance chart API fallback (`yahoo`)
//! - fixed synthetic series of last resort (`synthetic`)
//! - tiered fetch with fallthrough (`source`)
//! - read-through cache with business-hours TTL (`cache`)

use chrono::NaiveDate;

use crate::domain::{DataSource, RawTable};
use crate::error::SourceError;

pub mod cache;
pub mod source;
pub mod store;
pub mod synthetic;
pub mod yahoo;

pub use cache::{MarketDataCache, NoCache, TtlCache, cache_key};
pub use source::{MAX_DAYS_BACK, SourceChain, fetch_from};
pub use store::SqliteMarketStore;
pub use synthetic::SyntheticSource;
pub use yahoo::YahooClient;

/// One fetch tier.
///
/// Implementations return every row with `start <= date <= end`, ascending.
/// An empty table is a valid answer; the chain treats it like a miss.
pub trait MarketSource: Send + Sync {
    fn tier(&self) -> DataSource;

    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<RawTable, SourceError>;
}
