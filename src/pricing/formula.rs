//! Versioned FOB formulas.
//!
//! A formula version maps the benchmark price (USD/bbl) to an FOB price
//! (USD/kg). Versions are immutable once published: a behaviour change gets a
//! new id, and historical results are reproduced by pinning the id they used.
//!
//! Selection when nothing is pinned: the newest version whose effective date is
//! on or before the as-of date.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::FormulaSelection;
use crate::error::{PricingError, Result};

/// Linear benchmark → FOB rule: `p·slope + intercept + p·surcharge_rate`.
///
/// The surcharge term is kept separate from the slope so the published
/// expression of each version is reproduced term for term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FobRule {
    pub slope: f64,
    pub intercept: f64,
    pub surcharge_rate: f64,
}

impl FobRule {
    pub fn apply(&self, benchmark_price: f64) -> f64 {
        (benchmark_price * self.slope) + self.intercept + (benchmark_price * self.surcharge_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaMetadata {
    pub author: String,
    pub effective_date: NaiveDate,
    /// Backtest or study that validated the coefficients.
    pub validation: String,
    pub expression: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaVersion {
    pub id: String,
    pub rule: FobRule,
    pub metadata: FormulaMetadata,
}

impl FormulaVersion {
    pub fn fob_price(&self, benchmark_price: f64) -> f64 {
        self.rule.apply(benchmark_price)
    }
}

/// Immutable set of published formula versions.
#[derive(Debug, Clone)]
pub struct FormulaRegistry {
    versions: Vec<FormulaVersion>,
}

impl Default for FormulaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormulaRegistry {
    pub fn empty() -> Self {
        Self { versions: Vec::new() }
    }

    /// The three published versions.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let versions = [
            (
                "1.0",
                FobRule { slope: 0.014, intercept: 0.35, surcharge_rate: 0.0 },
                "Initial",
                (2024, 1, 1),
                "backtest_2023",
                "FOB = (benchmark * 0.014) + 0.35",
                "Initial formula from historical analysis",
            ),
            (
                "1.1",
                FobRule { slope: 0.0145, intercept: 0.32, surcharge_rate: 0.0 },
                "Data Team",
                (2024, 6, 1),
                "backtest_2024_q1",
                "FOB = (benchmark * 0.0145) + 0.32",
                "Coefficient and spread adjusted on Q1 2024",
            ),
            (
                "1.2",
                FobRule { slope: 0.014, intercept: 0.35, surcharge_rate: 0.0001 },
                "Data Team",
                (2024, 12, 1),
                "backtest_2024_q3",
                "FOB = (benchmark * 0.014) + 0.35 + (benchmark * 0.0001)",
                "High-volatility surcharge on top of 1.0",
            ),
        ];

        for (id, rule, author, (y, m, d), validation, expression, description) in versions {
            let Some(effective_date) = NaiveDate::from_ymd_opt(y, m, d) else {
                continue;
            };
            registry.versions.push(FormulaVersion {
                id: id.to_string(),
                rule,
                metadata: FormulaMetadata {
                    author: author.to_string(),
                    effective_date,
                    validation: validation.to_string(),
                    expression: expression.to_string(),
                    description: description.to_string(),
                },
            });
        }
        registry
    }

    /// Publish a new version. Existing ids can never be replaced.
    pub fn publish(&mut self, version: FormulaVersion) -> Result<()> {
        if self.get(&version.id).is_some() {
            return Err(PricingError::InvalidInput(format!(
                "Formula version '{}' is already published and cannot change.",
                version.id
            )));
        }
        if ![version.rule.slope, version.rule.intercept, version.rule.surcharge_rate]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(PricingError::InvalidInput(format!(
                "Formula version '{}' has non-finite coefficients.",
                version.id
            )));
        }
        self.versions.push(version);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&FormulaVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// All versions ordered by effective date (oldest first).
    pub fn versions(&self) -> Vec<&FormulaVersion> {
        let mut out: Vec<&FormulaVersion> = self.versions.iter().collect();
        out.sort_by_key(|v| v.metadata.effective_date);
        out
    }

    pub fn ids(&self) -> Vec<&str> {
        self.versions().into_iter().map(|v| v.id.as_str()).collect()
    }

    /// Newest version effective on `asof`.
    pub fn latest(&self, asof: NaiveDate) -> Option<&FormulaVersion> {
        self.versions
            .iter()
            .filter(|v| v.metadata.effective_date <= asof)
            .max_by_key(|v| v.metadata.effective_date)
    }

    pub fn resolve(&self, selection: &FormulaSelection, asof: NaiveDate) -> Result<&FormulaVersion> {
        match selection {
            FormulaSelection::Pinned(id) => self.get(id).ok_or_else(|| self.unknown(id)),
            FormulaSelection::Latest => self.latest(asof).ok_or_else(|| {
                PricingError::InvalidInput(format!(
                    "No formula version is effective on {asof}. Pin one of: {}",
                    self.ids().join(", ")
                ))
            }),
        }
    }

    fn unknown(&self, requested: &str) -> PricingError {
        PricingError::UnknownFormulaVersion {
            requested: requested.to_string(),
            available: self.ids().join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn builtin_versions_match_published_expressions() {
        let registry = FormulaRegistry::builtin();
        assert_eq!(registry.ids(), vec!["1.0", "1.1", "1.2"]);

        let v10 = registry.get("1.0").unwrap();
        assert!((v10.fob_price(75.0) - 1.40).abs() < 1e-12);

        let v11 = registry.get("1.1").unwrap();
        assert!((v11.fob_price(80.0) - (80.0 * 0.0145 + 0.32)).abs() < 1e-12);

        let v12 = registry.get("1.2").unwrap();
        assert!((v12.fob_price(100.0) - (1.4 + 0.35 + 0.01)).abs() < 1e-12);
    }

    #[test]
    fn latest_respects_effective_dates() {
        let registry = FormulaRegistry::builtin();
        assert_eq!(registry.latest(date(2025, 3, 1)).unwrap().id, "1.2");
        assert_eq!(registry.latest(date(2024, 7, 15)).unwrap().id, "1.1");
        assert_eq!(registry.latest(date(2024, 1, 1)).unwrap().id, "1.0");
        assert!(registry.latest(date(2023, 12, 31)).is_none());
    }

    #[test]
    fn pinned_version_overrides_effective_date() {
        let registry = FormulaRegistry::builtin();
        let pinned = FormulaSelection::Pinned("1.2".into());
        assert_eq!(registry.resolve(&pinned, date(2024, 2, 1)).unwrap().id, "1.2");
    }

    #[test]
    fn unknown_version_is_fatal() {
        let registry = FormulaRegistry::builtin();
        let err = registry
            .resolve(&FormulaSelection::Pinned("9.9".into()), date(2025, 1, 1))
            .unwrap_err();
        assert!(matches!(err, PricingError::UnknownFormulaVersion { ref requested, .. } if requested == "9.9"));
    }

    #[test]
    fn published_versions_cannot_be_replaced() {
        let mut registry = FormulaRegistry::builtin();
        let mut clash = registry.get("1.0").unwrap().clone();
        clash.rule.slope = 0.02;
        assert!(registry.publish(clash).is_err());
        assert!((registry.get("1.0").unwrap().rule.slope - 0.014).abs() < 1e-15);
    }
}
