//! SQLite-backed primary market data store.
//!
//! One row per calendar day; writes are upserts keyed by date so a later fetch
//! of the same day supersedes the earlier one.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::data::MarketSource;
use crate::domain::{DataSource, MarketObservation, RawCell, RawTable};
use crate::error::{PricingError, Result, SourceError};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS market_data (
    date TEXT PRIMARY KEY,
    benchmark_price REAL,
    fx_rate REAL,
    derived_fob_price REAL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;
"#;

pub struct SqliteMarketStore {
    conn: Mutex<Connection>,
}

impl SqliteMarketStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            PricingError::internal(format!("Failed to open market store '{}'", path.display()), e)
        })?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "market store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PricingError::internal("Failed to open in-memory market store", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| PricingError::internal("Failed to initialize market store schema", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace observations by date in a single transaction.
    pub fn upsert(&self, observations: &[MarketObservation]) -> Result<usize> {
        if observations.is_empty() {
            return Ok(0);
        }
        let updated_at = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| PricingError::internal("Failed to start market store transaction", e))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO market_data (date, benchmark_price, fx_rate, derived_fob_price, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(date) DO UPDATE SET
                        benchmark_price = excluded.benchmark_price,
                        fx_rate = excluded.fx_rate,
                        derived_fob_price = excluded.derived_fob_price,
                        updated_at = excluded.updated_at",
                )
                .map_err(|e| PricingError::internal("Failed to prepare market store upsert", e))?;
            for obs in observations {
                stmt.execute(params![
                    obs.date.format("%Y-%m-%d").to_string(),
                    obs.benchmark_price,
                    obs.fx_rate,
                    obs.derived_fob_price,
                    &updated_at,
                ])
                .map_err(|e| PricingError::internal(format!("Failed to upsert {}", obs.date), e))?;
            }
        }
        tx.commit()
            .map_err(|e| PricingError::internal("Failed to commit market store upsert", e))?;
        debug!(rows = observations.len(), "market store upserted");
        Ok(observations.len())
    }

    pub fn row_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM market_data", [], |row| row.get(0))
            .map_err(|e| PricingError::internal("Failed to count market store rows", e))?;
        Ok(n.max(0) as usize)
    }
}

impl MarketSource for SqliteMarketStore {
    fn tier(&self) -> DataSource {
        DataSource::Primary
    }

    fn fetch(&self, start: NaiveDate, end: NaiveDate) -> std::result::Result<RawTable, SourceError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT date, benchmark_price, fx_rate, derived_fob_price
             FROM market_data
             WHERE date >= ?1 AND date <= ?2
             ORDER BY date ASC",
        )?;

        let rows = stmt.query_map(
            params![start.format("%Y-%m-%d").to_string(), end.format("%Y-%m-%d").to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            },
        )?;

        let mut table = RawTable::canonical(DataSource::Primary);
        for row in rows {
            let (date, benchmark, fx, fob) = row?;
            table.push_row(vec![
                RawCell::from(date.as_str()),
                RawCell::from(benchmark),
                RawCell::from(fx),
                RawCell::from(fob),
            ]);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn upsert_then_fetch_window_in_order() {
        let store = SqliteMarketStore::open_in_memory().unwrap();
        let rows: Vec<_> = [5, 1, 3].iter().map(|&day| MarketObservation::new(d(day), 70.0 + day as f64, 5.0)).collect();
        assert_eq!(store.upsert(&rows).unwrap(), 3);

        let table = store.fetch(d(2), d(31)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], RawCell::Text("2025-01-03".into()));
        assert_eq!(table.rows[1][1], RawCell::Number(75.0));
        assert_eq!(table.rows[1][3], RawCell::Missing);
    }

    #[test]
    fn later_write_supersedes_same_date() {
        let store = SqliteMarketStore::open_in_memory().unwrap();
        store.upsert(&[MarketObservation::new(d(1), 70.0, 5.0)]).unwrap();
        let mut newer = MarketObservation::new(d(1), 72.5, 5.1);
        newer.derived_fob_price = Some(1.365);
        store.upsert(&[newer]).unwrap();

        assert_eq!(store.row_count().unwrap(), 1);
        let table = store.fetch(d(1), d(1)).unwrap();
        assert_eq!(table.rows[0][1], RawCell::Number(72.5));
        assert_eq!(table.rows[0][3], RawCell::Number(1.365));
    }

    #[test]
    fn empty_store_returns_empty_table() {
        let store = SqliteMarketStore::open_in_memory().unwrap();
        assert!(store.fetch(d(1), d(31)).unwrap().is_empty());
    }
}
