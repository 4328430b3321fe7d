//! Append-only audit trail of pricing computations.
//!
//! The pipeline only ever writes here. Each entry captures the inputs, every
//! intermediate buildup value and the final price, so a result can be
//! reproduced later by pinning the recorded formula version.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::debug;

use crate::domain::{CostInputs, DataSource, MarketObservation};
use crate::error::{PricingError, Result};
use crate::pricing::PriceBreakdown;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub recorded_at: DateTime<Utc>,
    /// Operation that produced the price (`price`, `sensitivity`, ...).
    pub operation: String,
    pub formula_version: String,
    pub source: DataSource,
    pub observation: MarketObservation,
    pub inputs: CostInputs,
    pub steps: PriceBreakdown,
    pub final_price: f64,
}

impl AuditEntry {
    pub fn new(
        operation: &str,
        source: DataSource,
        observation: &MarketObservation,
        inputs: &CostInputs,
        steps: &PriceBreakdown,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            recorded_at,
            operation: operation.to_string(),
            formula_version: steps.formula_version.clone(),
            source,
            observation: observation.clone(),
            inputs: *inputs,
            steps: steps.clone(),
            final_price: steps.final_price,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<()>;
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        (**self).append(entry)
    }
}

/// Open the sink for `path`: `.jsonl` files get JSON lines, anything else SQLite.
pub fn open_sink(path: &Path) -> Result<Box<dyn AuditSink>> {
    let is_jsonl = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));
    if is_jsonl {
        Ok(Box::new(JsonlAuditSink::open(path)?))
    } else {
        Ok(Box::new(SqliteAuditSink::open(path)?))
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at TEXT NOT NULL,
    operation TEXT NOT NULL,
    formula_version TEXT NOT NULL,
    final_price REAL NOT NULL,
    entry_json TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update
    BEFORE UPDATE ON audit_log
    BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
    BEFORE DELETE ON audit_log
    BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;
"#;

pub struct SqliteAuditSink {
    conn: Mutex<Connection>,
}

impl SqliteAuditSink {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            PricingError::internal(format!("Failed to open audit store '{}'", path.display()), e)
        })?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PricingError::internal("Failed to open in-memory audit store", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| PricingError::internal("Failed to initialize audit schema", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl AuditSink for SqliteAuditSink {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let entry_json = serde_json::to_string(entry)
            .map_err(|e| PricingError::Audit(format!("Failed to serialize audit entry: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO audit_log (recorded_at, operation, formula_version, final_price, entry_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.recorded_at.to_rfc3339(),
                &entry.operation,
                &entry.formula_version,
                entry.final_price,
                &entry_json,
            ],
        )
        .map_err(|e| PricingError::Audit(format!("Failed to append audit entry: {e}")))?;
        debug!(operation = %entry.operation, "audit entry appended");
        Ok(())
    }
}

/// One JSON object per line, appended to a file.
pub struct JsonlAuditSink {
    file: Mutex<File>,
}

impl JsonlAuditSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PricingError::internal(format!("Failed to open audit log '{}'", path.display()), e))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| PricingError::Audit(format!("Failed to serialize audit entry: {e}")))?;
        line.push('\n');
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| PricingError::Audit(format!("Failed to append audit entry: {e}")))
    }
}

/// Keeps entries in memory. Intended for tests and dry runs.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}
