//! Read-through cache for fetched market tables.
//!
//! Entries are immutable `Arc<RawTable>`s. A miss just means the chain is
//! queried again, so concurrent callers racing on the same key can at worst
//! fetch twice.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use parking_lot::Mutex;

use crate::domain::{BusinessHours, CachePolicy, RawTable};

pub fn cache_key(days_back: u32) -> String {
    format!("market_data_{days_back}")
}

pub trait MarketDataCache: Send + Sync {
    fn get(&self, key: &str, now: NaiveDateTime) -> Option<Arc<RawTable>>;

    fn put(&self, key: &str, table: Arc<RawTable>, now: NaiveDateTime);
}

/// Cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl MarketDataCache for NoCache {
    fn get(&self, _key: &str, _now: NaiveDateTime) -> Option<Arc<RawTable>> {
        None
    }

    fn put(&self, _key: &str, _table: Arc<RawTable>, _now: NaiveDateTime) {}
}

struct Entry {
    table: Arc<RawTable>,
    expires_at: NaiveDateTime,
}

/// In-memory cache whose TTL depends on whether the entry was stored during
/// business hours.
pub struct TtlCache {
    policy: CachePolicy,
    entries: Mutex<HashMap<String, Entry>>,
}

impl TtlCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MarketDataCache for TtlCache {
    fn get(&self, key: &str, now: NaiveDateTime) -> Option<Arc<RawTable>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(Arc::clone(&entry.table)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, table: Arc<RawTable>, now: NaiveDateTime) {
        let ttl = ttl_secs(&self.policy, now);
        let expires_at = now + chrono::Duration::seconds(ttl as i64);
        self.entries
            .lock()
            .insert(key.to_string(), Entry { table, expires_at });
    }
}

pub fn is_business_hours(hours: &BusinessHours, now: NaiveDateTime) -> bool {
    if hours.weekdays_only && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let h = now.hour();
    h >= hours.start_hour && h < hours.end_hour
}

pub fn ttl_secs(policy: &CachePolicy, now: NaiveDateTime) -> u64 {
    if is_business_hours(&policy.business_hours, now) {
        policy.business_ttl_secs
    } else {
        policy.off_hours_ttl_secs
    }
}
