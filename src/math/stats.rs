//! Descriptive statistics over small `f64` slices.
//!
//! Series here are hundreds of rows at most, so everything is a straight pass
//! over a slice. Functions return `None` instead of `NaN` when a statistic is
//! undefined for the input length.

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let n = values.len() as f64;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Quantile with linear interpolation between order statistics.
///
/// `q` is in `[0, 1]`. Position is `q * (n - 1)` on the sorted values, which is
/// the usual "type 7" definition used by most dataframe libraries.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Tukey fences `(Q1 - k·IQR, Q3 + k·IQR)`.
///
/// Returns `None` when the IQR is zero: a flat column has no outliers.
pub fn iqr_fences(values: &[f64], k: f64) -> Option<(f64, f64)> {
    let q1 = quantile(values, 0.25)?;
    let q3 = quantile(values, 0.75)?;
    let iqr = q3 - q1;
    if iqr <= 0.0 {
        return None;
    }
    Some((q1 - k * iqr, q3 + k * iqr))
}

/// Period-over-period relative change. Pairs with a zero base are skipped.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Mean absolute first difference.
pub fn mean_abs_diff(values: &[f64]) -> Option<f64> {
    let diffs: Vec<f64> = values.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    mean(&diffs)
}

/// Trailing rolling mean; the first `window - 1` entries are `None`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                mean(&values[i + 1 - window..=i])
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_interpolates_between_ranks() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.0), Some(1.0));
        assert_eq!(quantile(&v, 1.0), Some(4.0));
        // pos = 0.75 → 1 + 0.75 * (2 - 1)
        assert!((quantile(&v, 0.25).unwrap() - 1.75).abs() < 1e-12);
        assert!((quantile(&v, 0.75).unwrap() - 3.25).abs() < 1e-12);
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn fences_absent_for_flat_column() {
        assert_eq!(iqr_fences(&[5.0, 5.0, 5.0, 5.0], 1.5), None);
        let (lo, hi) = iqr_fences(&[1.0, 2.0, 3.0, 4.0], 1.5).unwrap();
        assert!((lo - (1.75 - 2.25)).abs() < 1e-12);
        assert!((hi - (3.25 + 2.25)).abs() < 1e-12);
    }

    #[test]
    fn sample_std_matches_hand_computation() {
        // mean 2, squared deviations 1 + 0 + 1, / (3 - 1) = 1
        assert!((sample_std(&[1.0, 2.0, 3.0]).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(sample_std(&[1.0]), None);
    }

    #[test]
    fn pct_change_and_diffs() {
        let v = [100.0, 110.0, 99.0];
        let pc = pct_change(&v);
        assert_eq!(pc.len(), 2);
        assert!((pc[0] - 0.1).abs() < 1e-12);
        assert!((pc[1] + 0.1).abs() < 1e-12);
        assert!((mean_abs_diff(&v).unwrap() - 10.5).abs() < 1e-12);
    }

    #[test]
    fn rolling_mean_pads_the_warmup() {
        let r = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(r[0], None);
        assert_eq!(r[1], None);
        assert_eq!(r[2], Some(2.0));
        assert_eq!(r[3], Some(3.0));
    }
}
