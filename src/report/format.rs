//! Formatted terminal output.
//!
//! Everything printed by the `fp` binary is built here as plain strings so the
//! pipeline stays free of presentation concerns and tests can assert on text.

use chrono::NaiveDate;

use crate::analysis::{BacktestReport, ConfidenceAssessment, PriceAlert, SensitivityResult};
use crate::domain::{CostInputs, DataSource};
use crate::pricing::{FormulaRegistry, PriceBreakdown, PricedObservation};
use crate::validate::ValidationReport;

/// Header block shared by every run summary.
pub fn format_header(title: &str, asof: NaiveDate, source: DataSource) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== fp - {title} ===\n"));
    out.push_str(&format!("As-of: {asof}\n"));
    out.push_str(&format!("Source: {source}\n"));
    if source == DataSource::Fallback {
        out.push_str("WARNING: synthetic fallback data, prices are indicative only\n");
    }
    out
}

/// Step-by-step buildup for one observation.
pub fn format_breakdown(b: &PriceBreakdown, inputs: &CostInputs) -> String {
    let mut out = String::new();
    out.push_str(&format!("Price buildup ({}, formula {}):\n", b.date, b.formula_version));
    out.push_str(&format!("  benchmark        {:>12.2} USD/bbl\n", b.benchmark_price));
    out.push_str(&format!("  fx               {:>12.4}\n", b.fx_rate));
    out.push_str(&format!("  FOB              {:>12.4} USD/kg\n", b.fob));
    out.push_str(&format!(
        "  CFR              {:>12.4} USD/kg  (+{:.0} USD/t freight)\n",
        b.cfr, inputs.freight_cost
    ));
    out.push_str(&format!(
        "  landed           {:>12.4}         (customs {})\n",
        b.landed,
        fmt_pct(inputs.customs_pct)
    ));
    out.push_str(&format!(
        "  operational      {:>12.4}         (+{:.2} internal freight)\n",
        b.operational_cost, inputs.internal_freight
    ));
    out.push_str(&format!(
        "  tax adjusted     {:>12.4}         (tax {})\n",
        b.tax_adjusted,
        fmt_pct(inputs.tax_pct)
    ));
    out.push_str(&format!(
        "  final            {:>12.4}         (margin {})\n",
        b.final_price,
        fmt_pct(inputs.margin_pct)
    ));
    out
}

pub fn format_validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    let q = &report.quality;
    out.push_str("Data quality:\n");
    out.push_str(&format!(
        "  rows: read={} used={} | duplicates={} missing={}\n",
        report.rows_read, report.rows_used, report.duplicates_removed, report.missing_removed
    ));
    out.push_str(&format!(
        "  completeness={} gaps={} freshness={}\n",
        fmt_pct(q.completeness),
        q.gap_count,
        q.freshness_days
            .map(|d| format!("{d}d"))
            .unwrap_or_else(|| "n/a".to_string())
    ));
    if let Some(range) = &q.date_range {
        out.push_str(&format!(
            "  range: {} .. {} ({} days)\n",
            range.start, range.end, range.span_days
        ));
    }
    if !report.outliers.is_empty() {
        let parts: Vec<String> = report.outliers.iter().map(|(f, n)| format!("{f}={n}")).collect();
        out.push_str(&format!("  outliers: {} ({})\n", report.outlier_count(), parts.join(", ")));
    }
    if report.warnings.is_empty() {
        out.push_str("  warnings: none\n");
    } else {
        out.push_str("  warnings:\n");
        for w in &report.warnings {
            out.push_str(&format!("  - {w}\n"));
        }
    }
    out
}

pub fn format_confidence(c: &ConfidenceAssessment) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Confidence: {:.2} ({})\n",
        c.score,
        c.recommendation()
    ));
    out.push_str(&format!(
        "  freshness={:.2} completeness={:.2} volatility={:.2} consistency={:.2}\n",
        c.freshness_score, c.completeness, c.volatility_score, c.consistency
    ));
    out
}

/// Last `n` rows of the priced series.
pub fn format_series_tail(priced: &[PricedObservation], n: usize) -> String {
    let mut out = String::new();
    push_row(&mut out, format!(
        "{:<10} {:>10} {:>8} {:>8} {:>10} {:>10} {:<5}",
        "date", "benchmark", "fx", "fob", "final", "trend", "flag"
    ));
    push_row(&mut out, format!(
        "{:-<10} {:-<10} {:-<8} {:-<8} {:-<10} {:-<10} {:-<5}",
        "", "", "", "", "", "", ""
    ));

    let start = priced.len().saturating_sub(n);
    for p in &priced[start..] {
        let b = &p.breakdown;
        push_row(&mut out, format!(
            "{:<10} {:>10.2} {:>8.4} {:>8.4} {:>10.4} {:>10} {:<5}",
            b.date,
            b.benchmark_price,
            b.fx_rate,
            b.fob,
            b.final_price,
            p.trend.map(|t| format!("{t:.4}")).unwrap_or_else(|| "-".to_string()),
            if p.observation.is_flagged() { "*" } else { "" },
        ));
    }
    out
}

pub fn format_sensitivity(result: &SensitivityResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Sensitivity (formula {}, base price {:.4}):\n",
        result.formula_version, result.base_price
    ));
    push_row(&mut out, format!(
        "{:<18} {:<4} {:>10} {:>10} {:>10} {:>10} {:>9}",
        "param", "side", "base", "shifted", "price", "impact", "impact%"
    ));
    push_row(&mut out, format!(
        "{:-<18} {:-<4} {:-<10} {:-<10} {:-<10} {:-<10} {:-<9}",
        "", "", "", "", "", "", ""
    ));
    for r in &result.rows {
        push_row(&mut out, format!(
            "{:<18} {:<4} {:>10.4} {:>10.4} {:>10.4} {:>+10.4} {:>+8.2}%",
            r.param.name(),
            r.bound.label(),
            r.base_value,
            r.new_value,
            r.new_price,
            r.price_impact,
            r.price_impact_pct * 100.0,
        ));
    }
    for s in &result.skipped {
        out.push_str(&format!("  (skipped {} {}) {}\n", s.param, s.bound.label(), s.reason));
    }
    if let Some(p) = result.most_sensitive() {
        out.push_str(&format!("Most sensitive input: {p}\n"));
    }
    out
}

pub fn format_backtest(report: &BacktestReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Backtest (formula {}, n={}):\n",
        report.formula_version,
        report.points.len()
    ));
    out.push_str(&format!(
        "  MAPE={} RMSE={:.4} bias={:+.4}\n",
        fmt_pct(report.mape),
        report.rmse,
        report.mean_bias
    ));
    match &report.calibration {
        Some(c) => {
            out.push_str(&format!(
                "  fit: price = {:.6}·(benchmark·fx) + {:.6}·fx\n",
                c.benchmark_fx_coef, c.fx_coef
            ));
            out.push_str(&format!(
                "  suggested FOB rule: benchmark·{:.6} + {:.4}\n",
                c.suggested_rule.slope, c.suggested_rule.intercept
            ));
        }
        None => out.push_str("  calibration: not enough points\n"),
    }
    out
}

/// Registered formula versions; the one selected for `asof` is starred.
pub fn format_formulas(registry: &FormulaRegistry, asof: NaiveDate) -> String {
    let current = registry.latest(asof).map(|v| v.id.as_str());
    let mut out = String::new();
    push_row(&mut out, format!(
        "  {:<7} {:<10} {:<10} {:<18} {}",
        "version", "effective", "author", "validation", "expression"
    ));
    for v in registry.versions() {
        let mark = if Some(v.id.as_str()) == current { "*" } else { " " };
        push_row(&mut out, format!(
            "{mark} {:<7} {:<10} {:<10} {:<18} {}",
            v.id,
            v.metadata.effective_date,
            truncate(&v.metadata.author, 10),
            truncate(&v.metadata.validation, 18),
            v.metadata.expression,
        ));
    }
    out
}

pub fn format_alert(alert: &PriceAlert) -> String {
    let status = if alert.triggered { "ALERT" } else { "ok" };
    format!(
        "[{status}] {} {:.4} vs {} {:.4}: {:+.2}% ({:?}, threshold {})\n",
        alert.current_date,
        alert.current_price,
        alert.reference_date,
        alert.reference_price,
        alert.variation * 100.0,
        alert.direction,
        fmt_pct(alert.threshold),
    )
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn fmt_pct(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FormulaSelection, MarketObservation};
    use crate::pricing::PricingEngine;

    #[test]
    fn breakdown_lists_every_step() {
        let asof = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let engine = PricingEngine::new(FormulaRegistry::builtin(), asof);
        let inputs = CostInputs::default();
        let b = engine
            .compute(&MarketObservation::new(asof, 75.0, 5.0), &inputs, &FormulaSelection::Pinned("1.0".into()))
            .unwrap();
        let text = format_breakdown(&b, &inputs);
        for label in ["FOB", "CFR", "landed", "operational", "tax adjusted", "final"] {
            assert!(text.contains(label), "missing {label}");
        }
        assert!(text.contains("1.4000"));
        assert!(text.contains("customs 12.0%"));
    }

    #[test]
    fn formulas_star_the_current_version() {
        let text = format_formulas(&FormulaRegistry::builtin(), NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        let starred: Vec<&str> = text.lines().filter(|l| l.starts_with('*')).collect();
        assert_eq!(starred.len(), 1);
        assert!(starred[0].contains("1.1"));
    }

    #[test]
    fn fallback_header_warns() {
        let asof = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert!(format_header("price", asof, DataSource::Fallback).contains("WARNING"));
        assert!(!format_header("price", asof, DataSource::Primary).contains("WARNING"));
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("backtest_2024_q1", 8), "backtes.");
        assert_eq!(truncate("short", 8), "short");
    }
}
