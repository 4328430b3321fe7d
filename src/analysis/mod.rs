//! Analytics over a priced series: confidence, sensitivity, backtest and
//! movement alerts.

pub mod alert;
pub mod backtest;
pub mod confidence;
pub mod sensitivity;

pub use alert::{Direction, PriceAlert, check_movement};
pub use backtest::{BacktestPoint, BacktestReport, Calibration, RealizedPrice, backtest};
pub use confidence::{ConfidenceAssessment, ConfidenceTier, assess, assess_series};
pub use sensitivity::{Bound, SensitivityResult, SensitivityRow, SkippedPerturbation, analyze};
