//! Week-over-week price movement alert.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::error::{PricingError, Result};
use crate::pricing::PricedObservation;

pub const DEFAULT_THRESHOLD: f64 = 0.03;
pub const LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAlert {
    pub current_date: NaiveDate,
    pub current_price: f64,
    pub reference_date: NaiveDate,
    pub reference_price: f64,
    /// `current / reference − 1`.
    pub variation: f64,
    pub direction: Direction,
    pub threshold: f64,
    pub triggered: bool,
}

/// Compare the latest final price with the one closest to `LOOKBACK_DAYS`
/// earlier. `priced` must be ascending by date.
pub fn check_movement(priced: &[PricedObservation], threshold: f64) -> Result<PriceAlert> {
    if !(threshold.is_finite() && threshold >= 0.0) {
        return Err(PricingError::InvalidInput(format!(
            "Alert threshold must be a non-negative number, got {threshold}."
        )));
    }
    let Some((current, history)) = priced.split_last() else {
        return Err(PricingError::InvalidInput("No priced observations to compare.".to_string()));
    };

    let target = current.date() - Duration::days(LOOKBACK_DAYS);
    let reference = history
        .iter()
        .min_by_key(|p| (p.date() - target).num_days().abs())
        .ok_or_else(|| {
            PricingError::InvalidInput("At least two priced observations are needed for an alert.".to_string())
        })?;

    let reference_price = reference.final_price();
    let variation = if reference_price > 0.0 {
        current.final_price() / reference_price - 1.0
    } else {
        0.0
    };
    let direction = if variation > 0.0 {
        Direction::Up
    } else if variation < 0.0 {
        Direction::Down
    } else {
        Direction::Flat
    };

    Ok(PriceAlert {
        current_date: current.date(),
        current_price: current.final_price(),
        reference_date: reference.date(),
        reference_price,
        variation,
        direction,
        threshold,
        triggered: variation.abs() >= threshold,
    })
}
