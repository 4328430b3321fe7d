//! One-at-a-time sensitivity of the final price to cost inputs.
//!
//! Each parameter is shifted to both ends of its range while every other input
//! stays at its base value. Perturbations are independent, so they run on the
//! rayon pool; results are ranked afterwards so ordering never depends on
//! scheduling.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{CostInputs, CostParam, FormulaSelection, MarketObservation, PerturbationRange};
use crate::error::Result;
use crate::pricing::{PricingEngine, compute_with};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    Min,
    Max,
}

impl Bound {
    pub fn label(self) -> &'static str {
        match self {
            Bound::Min => "min",
            Bound::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityRow {
    pub param: CostParam,
    pub bound: Bound,
    pub delta: f64,
    pub base_value: f64,
    pub new_value: f64,
    pub new_price: f64,
    pub price_impact: f64,
    /// Impact relative to the base price; 0 when the base price is not positive.
    pub price_impact_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPerturbation {
    pub param: CostParam,
    pub bound: Bound,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityResult {
    pub formula_version: String,
    pub base_price: f64,
    /// Ranked by `|price_impact_pct|`, largest first.
    pub rows: Vec<SensitivityRow>,
    pub skipped: Vec<SkippedPerturbation>,
}

impl SensitivityResult {
    /// Parameter with the largest absolute impact, if any perturbation succeeded.
    pub fn most_sensitive(&self) -> Option<CostParam> {
        self.rows.first().map(|r| r.param)
    }
}

enum Outcome {
    Row(SensitivityRow),
    Skipped(SkippedPerturbation),
}

/// Rank cost inputs by their effect on the price of `observation`.
///
/// The base price must be computable; individual perturbations that make the
/// inputs invalid are reported in `skipped` instead of failing the run.
pub fn analyze(
    engine: &PricingEngine,
    observation: &MarketObservation,
    base: &CostInputs,
    ranges: &[PerturbationRange],
    selection: &FormulaSelection,
) -> Result<SensitivityResult> {
    let formula = engine.formula(selection)?;
    let base_price = compute_with(observation, base, formula)?.final_price;

    let outcomes: Vec<Outcome> = ranges
        .par_iter()
        .flat_map_iter(|range| {
            [(Bound::Min, range.min_delta), (Bound::Max, range.max_delta)]
                .into_iter()
                .map(move |(bound, delta)| (range.param, bound, delta))
        })
        .map(|(param, bound, delta)| {
            let base_value = param.get(base);
            let new_value = base_value + delta;
            let shifted = param.with_value(base, new_value);
            match compute_with(observation, &shifted, formula) {
                Ok(b) => {
                    let price_impact = b.final_price - base_price;
                    let price_impact_pct = if base_price > 0.0 {
                        price_impact / base_price
                    } else {
                        0.0
                    };
                    Outcome::Row(SensitivityRow {
                        param,
                        bound,
                        delta,
                        base_value,
                        new_value,
                        new_price: b.final_price,
                        price_impact,
                        price_impact_pct,
                    })
                }
                Err(e) => Outcome::Skipped(SkippedPerturbation {
                    param,
                    bound,
                    reason: e.to_string(),
                }),
            }
        })
        .collect();

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Row(r) => rows.push(r),
            Outcome::Skipped(s) => {
                warn!(param = %s.param, bound = s.bound.label(), reason = %s.reason, "perturbation skipped");
                skipped.push(s);
            }
        }
    }

    // Stable sort keeps input order among ties.
    rows.sort_by(|a, b| b.price_impact_pct.abs().total_cmp(&a.price_impact_pct.abs()));

    debug!(rows = rows.len(), skipped = skipped.len(), "sensitivity analysis finished");

    Ok(SensitivityResult {
        formula_version: formula.id.clone(),
        base_price,
        rows,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PricingError;
    use crate::pricing::FormulaRegistry;
    use chrono::NaiveDate;

    fn setup() -> (PricingEngine, MarketObservation) {
        let asof = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        (
            PricingEngine::new(FormulaRegistry::builtin(), asof),
            MarketObservation::new(asof, 75.0, 5.0),
        )
    }

    #[test]
    fn zero_delta_has_zero_impact() {
        let (engine, obs) = setup();
        let ranges: Vec<_> = CostParam::ALL.iter().map(|p| PerturbationRange::new(*p, 0.0, 0.0)).collect();
        let res = analyze(&engine, &obs, &CostInputs::default(), &ranges, &FormulaSelection::Latest).unwrap();
        assert_eq!(res.rows.len(), 10);
        assert!(res.rows.iter().all(|r| r.price_impact == 0.0 && r.price_impact_pct == 0.0));
        // All ties: input order survives.
        assert_eq!(res.rows[0].param, CostParam::FreightCost);
        assert_eq!(res.rows[0].bound, Bound::Min);
    }

    #[test]
    fn rows_are_ranked_by_absolute_impact() {
        let (engine, obs) = setup();
        let res = analyze(
            &engine,
            &obs,
            &CostInputs::default(),
            &PerturbationRange::defaults(),
            &FormulaSelection::Latest,
        )
        .unwrap();
        assert!(res.skipped.is_empty());
        let pcts: Vec<f64> = res.rows.iter().map(|r| r.price_impact_pct.abs()).collect();
        assert!(pcts.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(res.formula_version, "1.2");
    }

    #[test]
    fn margin_shift_matches_closed_form() {
        let (engine, obs) = setup();
        let base = CostInputs::default();
        let ranges = [PerturbationRange::new(CostParam::MarginPct, -0.02, 0.02)];
        let res = analyze(&engine, &obs, &base, &ranges, &FormulaSelection::Latest).unwrap();
        let up = res.rows.iter().find(|r| r.bound == Bound::Max).unwrap();
        // final ∝ (1 + margin)
        assert!((up.price_impact_pct - 0.02 / 1.10).abs() < 1e-12);
        assert!((up.new_value - 0.12).abs() < 1e-12);
    }

    #[test]
    fn invalid_perturbations_are_skipped() {
        let (engine, obs) = setup();
        let ranges = [PerturbationRange::new(CostParam::TaxPct, -0.02, 0.9)];
        let res = analyze(&engine, &obs, &CostInputs::default(), &ranges, &FormulaSelection::Latest).unwrap();
        assert_eq!(res.rows.len(), 1);
        assert_eq!(res.skipped.len(), 1);
        assert_eq!(res.skipped[0].bound, Bound::Max);
    }

    #[test]
    fn invalid_base_is_an_error() {
        let (engine, obs) = setup();
        let mut base = CostInputs::default();
        base.freight_cost = -1.0;
        let err = analyze(&engine, &obs, &base, &PerturbationRange::defaults(), &FormulaSelection::Latest)
            .unwrap_err();
        assert!(matches!(err, PricingError::InvalidInput(_)));
    }
}
