//! Error taxonomy for the pricing pipeline.
//!
//! Every fallible public operation returns [`PricingError`]. Failures inside a
//! single fetch tier are [`SourceError`]s; the source adapter recovers from
//! those locally and only surfaces `DataSourceUnavailable` once every tier has
//! failed.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PricingError>;

#[derive(Debug, Error)]
pub enum PricingError {
    /// Every fetch tier failed. Callers may retry later.
    #[error("No market data source available: {0}")]
    DataSourceUnavailable(String),

    /// Structural schema violation in a market data table.
    #[error("Data validation failed: {0}")]
    DataValidation(String),

    #[error("Unknown formula version '{requested}'. Available: {available}")]
    UnknownFormulaVersion { requested: String, available: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audit sink error: {0}")]
    Audit(String),

    /// Unexpected low-level failure, wrapped with the operation that hit it.
    #[error("{context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PricingError {
    pub fn internal(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Internal {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Process exit code used by the `fp` binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            PricingError::InvalidInput(_)
            | PricingError::Config(_)
            | PricingError::UnknownFormulaVersion { .. } => 2,
            PricingError::DataValidation(_) => 3,
            PricingError::DataSourceUnavailable(_)
            | PricingError::Audit(_)
            | PricingError::Internal { .. } => 4,
        }
    }
}

/// Failure of a single fetch tier.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("store query failed: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("source not configured")]
    NotConfigured,

    #[error("no rows returned")]
    Empty,
}
