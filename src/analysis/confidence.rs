//! Confidence score for a priced series.
//!
//! Four sub-scores in `[0, 1]` are blended with fixed weights:
//!
//! | sub-score   | weight | definition                                   |
//! |-------------|--------|----------------------------------------------|
//! | freshness   | 0.3    | `1 − days_since_last / 7`                    |
//! | completeness| 0.3    | non-missing share of cells (validation)      |
//! | volatility  | 0.2    | `1 − 10 · stdev(pct_change(price))`          |
//! | consistency | 0.2    | `1 − mean(|Δprice|) / mean(price)`           |
//!
//! Undefined volatility/consistency (too few points) score a neutral 0.5.

use chrono::NaiveDate;
use serde::Serialize;

use crate::math::{mean, mean_abs_diff, pct_change, sample_std};
use crate::pricing::PricedObservation;

const FRESHNESS_HORIZON_DAYS: f64 = 7.0;
const VOLATILITY_SCALE: f64 = 10.0;
const NEUTRAL: f64 = 0.5;

const W_FRESHNESS: f64 = 0.3;
const W_COMPLETENESS: f64 = 0.3;
const W_VOLATILITY: f64 = 0.2;
const W_CONSISTENCY: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Moderate,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceTier::High
        } else if score >= 0.6 {
            ConfidenceTier::Moderate
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            ConfidenceTier::High => "high confidence - suitable for decisions",
            ConfidenceTier::Moderate => "moderate confidence - cross-check with other sources",
            ConfidenceTier::Low => "low confidence - await fresher data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceAssessment {
    pub score: f64,
    pub freshness_score: f64,
    pub completeness: f64,
    pub volatility_score: f64,
    pub consistency: f64,
    pub freshness_days: Option<i64>,
    /// Sample stdev of period returns, when defined.
    pub volatility_index: Option<f64>,
    pub tier: ConfidenceTier,
}

impl ConfidenceAssessment {
    pub fn recommendation(&self) -> &'static str {
        self.tier.recommendation()
    }

    fn insufficient() -> Self {
        Self {
            score: 0.0,
            freshness_score: 0.0,
            completeness: 0.0,
            volatility_score: 0.0,
            consistency: 0.0,
            freshness_days: None,
            volatility_index: None,
            tier: ConfidenceTier::Low,
        }
    }
}

/// Score a dated price series (ascending by date).
pub fn assess(points: &[(NaiveDate, f64)], completeness: f64, asof: NaiveDate) -> ConfidenceAssessment {
    let Some(&(last_date, _)) = points.last() else {
        return ConfidenceAssessment::insufficient();
    };

    let freshness_days = (asof - last_date).num_days();
    let freshness_score = (1.0 - freshness_days as f64 / FRESHNESS_HORIZON_DAYS).clamp(0.0, 1.0);

    let completeness = if completeness.is_finite() {
        completeness.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let prices: Vec<f64> = points.iter().map(|(_, p)| *p).collect();

    let volatility_index = sample_std(&pct_change(&prices)).filter(|v| v.is_finite());
    let volatility_score = volatility_index
        .map(|v| (1.0 - v * VOLATILITY_SCALE).max(0.0))
        .unwrap_or(NEUTRAL);

    let consistency = match (mean(&prices), mean_abs_diff(&prices)) {
        (Some(m), Some(d)) if m > 0.0 => (1.0 - d / m).clamp(0.0, 1.0),
        _ => NEUTRAL,
    };

    let score = (W_FRESHNESS * freshness_score
        + W_COMPLETENESS * completeness
        + W_VOLATILITY * volatility_score
        + W_CONSISTENCY * consistency)
        .clamp(0.0, 1.0);

    ConfidenceAssessment {
        score,
        freshness_score,
        completeness,
        volatility_score,
        consistency,
        freshness_days: Some(freshness_days),
        volatility_index,
        tier: ConfidenceTier::from_score(score),
    }
}

/// Score the final-price column of a priced series.
pub fn assess_series(priced: &[PricedObservation], completeness: f64, asof: NaiveDate) -> ConfidenceAssessment {
    let points: Vec<(NaiveDate, f64)> = priced.iter().map(|p| (p.date(), p.final_price())).collect();
    assess(&points, completeness, asof)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn flat_fresh_complete_series_scores_high() {
        let points: Vec<_> = (1..=10).map(|i| (d(i), 10.0)).collect();
        let a = assess(&points, 1.0, d(10));
        assert!((a.score - 1.0).abs() < 1e-12);
        assert_eq!(a.tier, ConfidenceTier::High);
        assert_eq!(a.freshness_days, Some(0));
    }

    #[test]
    fn stale_data_loses_freshness() {
        let points: Vec<_> = (1..=10).map(|i| (d(i), 10.0)).collect();
        let a = assess(&points, 1.0, d(20));
        assert_eq!(a.freshness_score, 0.0);
        // 0.3·0 + 0.3·1 + 0.2·1 + 0.2·1
        assert!((a.score - 0.7).abs() < 1e-12);
        assert_eq!(a.tier, ConfidenceTier::Moderate);
    }

    #[test]
    fn volatile_series_is_penalised() {
        let points: Vec<_> = (1..=10)
            .map(|i| (d(i), if i % 2 == 0 { 12.0 } else { 8.0 }))
            .collect();
        let a = assess(&points, 0.5, d(10));
        assert_eq!(a.volatility_score, 0.0);
        assert!(a.consistency < 0.7);
        assert_eq!(a.tier, ConfidenceTier::Low);
        assert_eq!(a.recommendation(), "low confidence - await fresher data");
    }

    #[test]
    fn single_point_uses_neutral_subscores() {
        let a = assess(&[(d(5), 10.0)], 1.0, d(5));
        assert_eq!(a.volatility_score, NEUTRAL);
        assert_eq!(a.consistency, NEUTRAL);
        assert!(a.volatility_index.is_none());
    }

    #[test]
    fn empty_series_scores_zero() {
        let a = assess(&[], 1.0, d(5));
        assert_eq!(a.score, 0.0);
        assert_eq!(a.tier, ConfidenceTier::Low);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let cases: [(f64, u32, &[f64]); 4] = [
            (2.0, 1, &[1.0, 2.0, 3.0]),
            (-1.0, 31, &[100.0, 0.01, 100.0]),
            (f64::NAN, 10, &[5.0, 5.0]),
            (1.0, 1, &[-3.0, 4.0, -5.0]),
        ];
        for (completeness, asof_day, prices) in cases {
            let points: Vec<_> = prices.iter().enumerate().map(|(i, p)| (d(i as u32 + 1), *p)).collect();
            let a = assess(&points, completeness, d(asof_day));
            assert!((0.0..=1.0).contains(&a.score), "score {} out of range", a.score);
        }
    }
}
