//! Backtest of theoretical prices against realized market prices.
//!
//! Besides the error metrics, the realized prices are regressed on the market
//! drivers to see which FOB coefficients would have reproduced them.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::CostInputs;
use crate::error::{PricingError, Result};
use crate::math::{fit_linear, mean};
use crate::pricing::{FobRule, PricedObservation};

/// An observed market price for one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealizedPrice {
    pub date: NaiveDate,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestPoint {
    pub date: NaiveDate,
    pub theoretical: f64,
    pub realized: f64,
    /// `theoretical − realized`.
    pub error: f64,
}

/// Least-squares fit of realized prices on the market drivers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    /// `price ≈ benchmark_fx_coef · (benchmark · fx) + fx_coef · fx`
    pub benchmark_fx_coef: f64,
    pub fx_coef: f64,
    /// FOB rule that reproduces the realized prices through the buildup.
    pub suggested_rule: FobRule,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub formula_version: String,
    pub points: Vec<BacktestPoint>,
    /// Mean absolute percentage error, as a fraction.
    pub mape: f64,
    pub rmse: f64,
    pub mean_bias: f64,
    pub calibration: Option<Calibration>,
}

/// Compare a priced series with realized prices on matching dates.
pub fn backtest(priced: &[PricedObservation], realized: &[RealizedPrice], inputs: &CostInputs) -> Result<BacktestReport> {
    let by_date: HashMap<NaiveDate, f64> = realized
        .iter()
        .filter(|r| r.price.is_finite() && r.price > 0.0)
        .map(|r| (r.date, r.price))
        .collect();

    let matched: Vec<(&PricedObservation, f64)> = priced
        .iter()
        .filter_map(|p| by_date.get(&p.date()).map(|r| (p, *r)))
        .collect();

    if matched.is_empty() {
        return Err(PricingError::InvalidInput(
            "No realized prices share a date with the priced series.".to_string(),
        ));
    }

    let points: Vec<BacktestPoint> = matched
        .iter()
        .map(|(p, realized)| BacktestPoint {
            date: p.date(),
            theoretical: p.final_price(),
            realized: *realized,
            error: p.final_price() - realized,
        })
        .collect();

    let abs_pct: Vec<f64> = points.iter().map(|p| (p.error / p.realized).abs()).collect();
    let sq: Vec<f64> = points.iter().map(|p| p.error * p.error).collect();
    let errors: Vec<f64> = points.iter().map(|p| p.error).collect();

    // Non-empty by construction.
    let mape = mean(&abs_pct).unwrap_or(0.0);
    let rmse = mean(&sq).unwrap_or(0.0).sqrt();
    let mean_bias = mean(&errors).unwrap_or(0.0);

    let calibration = calibrate(&matched, inputs);
    let formula_version = matched[0].0.breakdown.formula_version.clone();

    info!(points = points.len(), mape, rmse, "backtest finished");

    Ok(BacktestReport {
        formula_version,
        points,
        mape,
        rmse,
        mean_bias,
        calibration,
    })
}

fn calibrate(matched: &[(&PricedObservation, f64)], inputs: &CostInputs) -> Option<Calibration> {
    let rows: Vec<Vec<f64>> = matched
        .iter()
        .map(|(p, _)| {
            let o = &p.observation;
            vec![o.benchmark_price * o.fx_rate, o.fx_rate]
        })
        .collect();
    let y: Vec<f64> = matched.iter().map(|(_, r)| *r).collect();

    let raw = fit_linear(&rows, &y)?;

    // Undo the buildup around the FOB price:
    //   final = M·fx·(fob + freight/1000) + N·internal_freight
    // with M = (1+customs)(1+margin)/(1−tax) and N = (1+margin)/(1−tax).
    let n = (1.0 + inputs.margin_pct) / (1.0 - inputs.tax_pct);
    let m = (1.0 + inputs.customs_pct) * n;
    if !(m.is_finite() && m > 0.0) {
        return None;
    }
    let adjusted: Vec<f64> = y.iter().map(|price| (price - n * inputs.internal_freight) / m).collect();
    let fob = fit_linear(&rows, &adjusted)?;

    Some(Calibration {
        benchmark_fx_coef: raw[0],
        fx_coef: raw[1],
        suggested_rule: FobRule {
            slope: fob[0],
            intercept: fob[1] - inputs.freight_cost / 1000.0,
            surcharge_rate: 0.0,
        },
    })
}
