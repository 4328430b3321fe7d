//! Export a priced series to CSV or JSON.
//!
//! The CSV carries every buildup step so a spreadsheet can re-derive the final
//! price column.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::{PricingError, Result};
use crate::pricing::PricedObservation;

/// Write the priced series, one row per date.
pub fn write_priced_csv(path: &Path, priced: &[PricedObservation]) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|e| PricingError::InvalidInput(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writeln!(
        file,
        "date,formula_version,benchmark_price,fx_rate,fob,cfr,landed,operational_cost,tax_adjusted,final_price,trend,flags"
    )
    .map_err(|e| PricingError::internal("Failed to write export CSV header", e))?;

    for p in priced {
        let b = &p.breakdown;
        let flags = p
            .observation
            .flags
            .iter()
            .map(|f| format!("{f:?}"))
            .collect::<Vec<_>>()
            .join("|");
        writeln!(
            file,
            "{},{},{:.4},{:.4},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{}",
            b.date,
            b.formula_version,
            b.benchmark_price,
            b.fx_rate,
            b.fob,
            b.cfr,
            b.landed,
            b.operational_cost,
            b.tax_adjusted,
            b.final_price,
            p.trend.map(|v| format!("{v:.6}")).unwrap_or_default(),
            flags,
        )
        .map_err(|e| PricingError::internal("Failed to write export CSV row", e))?;
    }

    Ok(())
}

/// Pretty-printed JSON of any serializable run output.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| PricingError::InvalidInput(format!("Failed to create export JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, value).map_err(|e| PricingError::internal("Failed to write export JSON", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CostInputs, Field, FormulaSelection, MarketObservation, QualityFlag};
    use crate::pricing::{FormulaRegistry, PricingEngine};
    use chrono::NaiveDate;

    #[test]
    fn csv_has_one_row_per_observation() {
        let asof = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let engine = PricingEngine::new(FormulaRegistry::builtin(), asof);
        let mut obs = vec![
            MarketObservation::new(NaiveDate::from_ymd_opt(2025, 2, 27).unwrap(), 75.0, 5.0),
            MarketObservation::new(NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(), 76.0, 5.0),
        ];
        obs[1].flags.push(QualityFlag::Outlier(Field::BenchmarkPrice));
        let priced = engine
            .price_series(&obs, &CostInputs::default(), &FormulaSelection::Pinned("1.0".into()))
            .unwrap();

        let path = std::env::temp_dir().join(format!("fp-export-{}.csv", std::process::id()));
        write_priced_csv(&path, &priced).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2025-02-27,1.0,75.0000,5.0000,1.400000,1.460000"));
        assert!(lines[2].ends_with("Outlier(BenchmarkPrice)"));
        let _ = std::fs::remove_file(&path);
    }
}
