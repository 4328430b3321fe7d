//! Cost buildup: benchmark + FX → final local-currency unit price.
//!
//! Steps, in fixed order (each feeds the next):
//!
//! ```text
//! fob          = formula(benchmark)
//! cfr          = fob + freight_cost / 1000
//! landed       = cfr × fx × (1 + customs)
//! operational  = landed + internal_freight
//! tax_adjusted = operational / (1 − tax)
//! final        = tax_adjusted × (1 + margin)
//! ```
//!
//! Plain `f64` arithmetic, no intermediate rounding. The functions here are
//! pure: identical inputs and version give bit-identical output.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::domain::{CostInputs, FormulaSelection, MarketObservation};
use crate::error::{PricingError, Result};
use crate::math::rolling_mean;
use crate::pricing::formula::{FormulaRegistry, FormulaVersion};

/// Trailing window (observations) for the trend column.
pub const TREND_WINDOW: usize = 7;

/// Every intermediate value of one buildup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBreakdown {
    pub formula_version: String,
    pub date: NaiveDate,
    pub benchmark_price: f64,
    pub fx_rate: f64,
    pub fob: f64,
    pub cfr: f64,
    pub landed: f64,
    pub operational_cost: f64,
    pub tax_adjusted: f64,
    pub final_price: f64,
}

/// A validated observation with its buildup and trailing trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedObservation {
    pub observation: MarketObservation,
    pub breakdown: PriceBreakdown,
    /// Mean final price over the trailing `TREND_WINDOW` observations.
    pub trend: Option<f64>,
}

impl PricedObservation {
    pub fn date(&self) -> NaiveDate {
        self.observation.date
    }

    pub fn final_price(&self) -> f64 {
        self.breakdown.final_price
    }
}

/// Run the buildup for a single observation with an already resolved formula.
pub fn compute_with(
    observation: &MarketObservation,
    inputs: &CostInputs,
    formula: &FormulaVersion,
) -> Result<PriceBreakdown> {
    check_observation(observation)?;
    check_inputs(inputs)?;

    let fob = formula.fob_price(observation.benchmark_price);
    let cfr = fob + (inputs.freight_cost / 1000.0);
    let landed = cfr * observation.fx_rate * (1.0 + inputs.customs_pct);
    let operational_cost = landed + inputs.internal_freight;
    let tax_adjusted = operational_cost / (1.0 - inputs.tax_pct);
    let final_price = tax_adjusted * (1.0 + inputs.margin_pct);

    if !final_price.is_finite() {
        return Err(PricingError::InvalidInput(format!(
            "Non-finite price for {} (formula {}).",
            observation.date, formula.id
        )));
    }

    Ok(PriceBreakdown {
        formula_version: formula.id.clone(),
        date: observation.date,
        benchmark_price: observation.benchmark_price,
        fx_rate: observation.fx_rate,
        fob,
        cfr,
        landed,
        operational_cost,
        tax_adjusted,
        final_price,
    })
}

fn check_observation(observation: &MarketObservation) -> Result<()> {
    if !(observation.benchmark_price.is_finite() && observation.benchmark_price > 0.0) {
        return Err(PricingError::InvalidInput(format!(
            "Benchmark price must be a positive number, got {} on {}.",
            observation.benchmark_price, observation.date
        )));
    }
    if !(observation.fx_rate.is_finite() && observation.fx_rate > 0.0) {
        return Err(PricingError::InvalidInput(format!(
            "FX rate must be a positive number, got {} on {}.",
            observation.fx_rate, observation.date
        )));
    }
    Ok(())
}

/// Reject inputs the buildup cannot price meaningfully.
pub fn check_inputs(inputs: &CostInputs) -> Result<()> {
    let finite = [
        inputs.freight_cost,
        inputs.internal_freight,
        inputs.tax_pct,
        inputs.margin_pct,
        inputs.customs_pct,
    ]
    .iter()
    .all(|v| v.is_finite());
    if !finite {
        return Err(PricingError::InvalidInput("Cost inputs must be finite.".to_string()));
    }
    if inputs.freight_cost < 0.0 {
        return Err(PricingError::InvalidInput("Freight cost must be >= 0.".to_string()));
    }
    if inputs.internal_freight < 0.0 {
        return Err(PricingError::InvalidInput("Internal freight must be >= 0.".to_string()));
    }
    if !(0.0..1.0).contains(&inputs.tax_pct) {
        return Err(PricingError::InvalidInput(format!(
            "Tax must be a fraction in [0, 1), got {}.",
            inputs.tax_pct
        )));
    }
    if inputs.margin_pct <= -1.0 {
        return Err(PricingError::InvalidInput(format!(
            "Margin must be > -1, got {}.",
            inputs.margin_pct
        )));
    }
    if inputs.customs_pct <= -1.0 {
        return Err(PricingError::InvalidInput(format!(
            "Customs multiplier must be > -1, got {}.",
            inputs.customs_pct
        )));
    }
    Ok(())
}

/// Formula registry bound to an as-of date.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    registry: FormulaRegistry,
    asof: NaiveDate,
}

impl PricingEngine {
    pub fn new(registry: FormulaRegistry, asof: NaiveDate) -> Self {
        Self { registry, asof }
    }

    pub fn formula(&self, selection: &FormulaSelection) -> Result<&FormulaVersion> {
        self.registry.resolve(selection, self.asof)
    }

    /// Price a single observation.
    pub fn compute(
        &self,
        observation: &MarketObservation,
        inputs: &CostInputs,
        selection: &FormulaSelection,
    ) -> Result<PriceBreakdown> {
        let formula = self.formula(selection)?;
        compute_with(observation, inputs, formula)
    }

    /// Price a whole series (ascending by date) and attach the trailing trend.
    ///
    /// Fails on the first observation that cannot be priced; no partial series
    /// is returned.
    pub fn price_series(
        &self,
        observations: &[MarketObservation],
        inputs: &CostInputs,
        selection: &FormulaSelection,
    ) -> Result<Vec<PricedObservation>> {
        let formula = self.formula(selection)?;
        let breakdowns = observations
            .iter()
            .map(|obs| compute_with(obs, inputs, formula))
            .collect::<Result<Vec<_>>>()?;

        let finals: Vec<f64> = breakdowns.iter().map(|b| b.final_price).collect();
        let trend = rolling_mean(&finals, TREND_WINDOW);

        Ok(observations
            .iter()
            .zip(breakdowns)
            .zip(trend)
            .map(|((obs, breakdown), trend)| PricedObservation {
                observation: obs.clone(),
                breakdown,
                trend,
            })
            .collect())
    }

    /// Set `derived_fob_price` to the selected formula's FOB, so it always
    /// equals the `fob` step of the buildup. Returns how many rows changed.
    ///
    /// A source-supplied value that disagrees with the formula is replaced.
    pub fn fill_derived_fob(
        &self,
        observations: &mut [MarketObservation],
        selection: &FormulaSelection,
    ) -> Result<usize> {
        let formula = self.formula(selection)?;
        let mut changed = 0;
        let mut replaced = 0;
        for obs in observations.iter_mut() {
            let fob = formula.fob_price(obs.benchmark_price);
            match obs.derived_fob_price {
                Some(v) if v.to_bits() == fob.to_bits() => continue,
                Some(_) => replaced += 1,
                None => {}
            }
            obs.derived_fob_price = Some(fob);
            changed += 1;
        }
        if replaced > 0 {
            debug!(replaced, formula = %formula.id, "source FOB prices replaced by formula FOB");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PricingEngine {
        PricingEngine::new(
            FormulaRegistry::builtin(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        )
    }

    fn obs(day: u32, benchmark: f64, fx: f64) -> MarketObservation {
        MarketObservation::new(NaiveDate::from_ymd_opt(2025, 2, day).unwrap(), benchmark, fx)
    }

    fn scenario_inputs() -> CostInputs {
        CostInputs {
            freight_cost: 60.0,
            internal_freight: 0.15,
            tax_pct: 0.18,
            margin_pct: 0.10,
            customs_pct: 0.12,
        }
    }

    #[test]
    fn reference_scenario_reproduces_each_step() {
        let pinned = FormulaSelection::Pinned("1.0".into());
        let b = engine().compute(&obs(3, 75.0, 5.0), &scenario_inputs(), &pinned).unwrap();

        assert!((b.fob - 1.40).abs() < 1e-12);
        assert!((b.cfr - 1.46).abs() < 1e-12);
        assert!((b.landed - 8.176).abs() < 1e-12);
        assert!((b.operational_cost - 8.326).abs() < 1e-12);
        assert!((b.tax_adjusted - 8.326 / 0.82).abs() < 1e-12);
        assert!((b.final_price - 8.326 / 0.82 * 1.1).abs() < 1e-12);
        assert_eq!(b.formula_version, "1.0");
    }

    #[test]
    fn compute_is_bit_for_bit_deterministic() {
        let e = engine();
        let o = obs(3, 81.37, 5.4321);
        let inputs = scenario_inputs();
        for selection in [
            FormulaSelection::Latest,
            FormulaSelection::Pinned("1.1".into()),
        ] {
            let a = e.compute(&o, &inputs, &selection).unwrap();
            let b = e.compute(&o, &inputs, &selection).unwrap();
            assert_eq!(a.final_price.to_bits(), b.final_price.to_bits());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn unknown_version_yields_no_result() {
        let err = engine()
            .compute(&obs(3, 75.0, 5.0), &scenario_inputs(), &FormulaSelection::Pinned("9.9".into()))
            .unwrap_err();
        assert!(matches!(err, PricingError::UnknownFormulaVersion { .. }));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let e = engine();
        let latest = FormulaSelection::Latest;
        let mut bad = scenario_inputs();
        bad.tax_pct = 1.0;
        assert!(matches!(e.compute(&obs(3, 75.0, 5.0), &bad, &latest), Err(PricingError::InvalidInput(_))));
        assert!(e.compute(&obs(3, 0.0, 5.0), &scenario_inputs(), &latest).is_err());
        assert!(e.compute(&obs(3, 75.0, f64::NAN), &scenario_inputs(), &latest).is_err());
    }

    #[test]
    fn series_trend_starts_after_the_window() {
        let e = engine();
        let series: Vec<_> = (1..=9).map(|d| obs(d, 70.0 + d as f64, 5.0)).collect();
        let priced = e.price_series(&series, &scenario_inputs(), &FormulaSelection::Latest).unwrap();
        assert_eq!(priced.len(), 9);
        assert!(priced[..TREND_WINDOW - 1].iter().all(|p| p.trend.is_none()));
        let expected = priced[..TREND_WINDOW].iter().map(|p| p.final_price()).sum::<f64>() / TREND_WINDOW as f64;
        assert!((priced[TREND_WINDOW - 1].trend.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn derived_fob_always_matches_the_buildup() {
        let e = engine();
        let selection = FormulaSelection::Pinned("1.0".into());
        let mut series = vec![obs(1, 75.0, 5.0), obs(2, 80.0, 5.0), obs(3, 70.0, 5.0)];
        series[0].derived_fob_price = Some(1.2);
        series[2].derived_fob_price = Some(70.0 * 0.014 + 0.35);

        let changed = e.fill_derived_fob(&mut series, &selection).unwrap();
        assert_eq!(changed, 2);

        let priced = e.price_series(&series, &scenario_inputs(), &selection).unwrap();
        for p in &priced {
            assert_eq!(p.observation.derived_fob_price, Some(p.breakdown.fob));
        }
        assert_eq!(e.fill_derived_fob(&mut series, &selection).unwrap(), 0);
    }
}
