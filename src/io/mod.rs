//! Input/output helpers.
//!
//! - CSV ingest of market data and realized prices (`ingest`)
//! - priced-series exports (CSV/JSON) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
