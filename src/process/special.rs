//! Numerical helpers for batch processing
//!
//! Statistics are accumulated in `f64` regardless of the `f32` storage type.

/// Discounted cumulative sum: `y[t] = Σ_{k≥t} discount^(k-t) · x[k]`
///
/// Computed with a single reverse scan.
pub fn discount_cumsum(x: &[f32], discount: f64) -> Vec<f32> {
    let mut out = vec![0.0f32; x.len()];
    let mut running = 0.0f64;
    for t in (0..x.len()).rev() {
        running = x[t] as f64 + discount * running;
        out[t] = running as f32;
    }
    out
}

/// Mean of a slice (0 when empty)
pub fn mean(xs: &[f32]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().map(|&x| x as f64).sum::<f64>() / xs.len() as f64
}

/// Population variance of a slice (0 when empty)
pub fn variance(xs: &[f32]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|&x| (x as f64 - m).powi(2)).sum::<f64>() / xs.len() as f64
}

/// Population standard deviation of a slice
pub fn std(xs: &[f32]) -> f64 {
    variance(xs).sqrt()
}

/// Percentile with linear interpolation between closest ranks
///
/// `q` is in `[0, 100]`. Returns 0 for an empty slice.
pub fn percentile(xs: &[f32], q: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = xs.iter().map(|&x| x as f64).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Median (50th percentile)
pub fn median(xs: &[f32]) -> f64 {
    percentile(xs, 50.0)
}

/// Fraction of the variance of `y` explained by `ypred`
///
/// `1 - Var(y - ypred) / Var(y)`. When `y` is constant the result is 1 for a
/// constant prediction and 0 otherwise.
pub fn explained_variance_1d(ypred: &[f32], y: &[f32]) -> f64 {
    debug_assert_eq!(ypred.len(), y.len(), "explained variance inputs differ in length");
    let var_y = variance(y);
    if var_y.abs() < 1e-8 {
        return if variance(ypred) > 0.0 { 0.0 } else { 1.0 };
    }
    let residual: Vec<f32> = y.iter().zip(ypred).map(|(a, b)| a - b).collect();
    1.0 - variance(&residual) / (var_y + 1e-8)
}

/// Standardize to zero mean and unit variance, in place
///
/// The standard deviation is offset by `eps`, so a constant batch maps to
/// zeros instead of NaN.
pub fn center(xs: &mut [f32], eps: f64) {
    let m = mean(xs);
    let s = std(xs) + eps;
    for x in xs.iter_mut() {
        *x = ((*x as f64 - m) / s) as f32;
    }
}

/// Shift so the minimum becomes `eps`, in place
pub fn shift_to_positive(xs: &mut [f32], eps: f64) {
    let Some(min) = xs.iter().copied().reduce(f32::min) else {
        return;
    };
    for x in xs.iter_mut() {
        *x = ((*x - min) as f64 + eps) as f32;
    }
}

/// Summary of a distribution recorded under a common key suffix
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Distribution {
    /// Mean
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    /// Minimum
    pub min: f64,
    /// Maximum
    pub max: f64,
    /// Median
    pub median: f64,
    /// 25th percentile
    pub p25: f64,
    /// 75th percentile
    pub p75: f64,
    /// 90th percentile
    pub p90: f64,
}

impl Distribution {
    /// Summarize a slice (all zeros when empty)
    pub fn of(xs: &[f32]) -> Self {
        if xs.is_empty() {
            return Self::default();
        }
        Self {
            mean: mean(xs),
            std: std(xs),
            min: xs.iter().copied().fold(f32::INFINITY, f32::min) as f64,
            max: xs.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64,
            median: median(xs),
            p25: percentile(xs, 25.0),
            p75: percentile(xs, 75.0),
            p90: percentile(xs, 90.0),
        }
    }

    /// `(key, value)` pairs named `{prefix}Mean{suffix}`, `{prefix}StdKL...`
    pub fn entries(&self, prefix: &str, suffix: &str) -> Vec<(String, f64)> {
        [
            ("Mean", self.mean),
            ("Std", self.std),
            ("Min", self.min),
            ("Max", self.max),
            ("Median", self.median),
            ("25perc", self.p25),
            ("75perc", self.p75),
            ("90perc", self.p90),
        ]
        .into_iter()
        .map(|(stat, value)| (format!("{}{}{}", prefix, stat, suffix), value))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_cumsum() {
        let out = discount_cumsum(&[1.0, 1.0, 1.0], 0.5);
        assert_eq!(out, vec![1.75, 1.5, 1.0]);

        assert_eq!(discount_cumsum(&[1.0, 2.0, 3.0], 1.0), vec![6.0, 5.0, 3.0]);
        assert_eq!(discount_cumsum(&[1.0, 2.0, 3.0], 0.0), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_percentile_interpolates() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&xs, 0.0), 1.0);
        assert_eq!(percentile(&xs, 100.0), 4.0);
        assert_eq!(median(&xs), 2.5);
        assert!((percentile(&xs, 90.0) - 3.7).abs() < 1e-9);
    }

    #[test]
    fn test_explained_variance() {
        let y = [1.0, 2.0, 3.0, 4.0];
        assert!((explained_variance_1d(&y, &y) - 1.0).abs() < 1e-6);
        assert!(explained_variance_1d(&[0.0; 4], &y).abs() < 1e-6);

        // Constant target
        assert_eq!(explained_variance_1d(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert_eq!(explained_variance_1d(&[1.0, 3.0], &[2.0, 2.0]), 0.0);
    }

    #[test]
    fn test_center_then_shift() {
        let mut adv = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        center(&mut adv, 1e-8);
        assert!(mean(&adv).abs() < 1e-6);
        assert!((std(&adv) - 1.0).abs() < 1e-4);

        shift_to_positive(&mut adv, 1e-8);
        assert!(adv.iter().all(|&a| a >= 0.0));
    }

    #[test]
    fn test_center_constant_batch_is_finite() {
        let mut adv = vec![3.0];
        center(&mut adv, 1e-8);
        assert_eq!(adv, vec![0.0]);
    }

    #[test]
    fn test_distribution_entries() {
        let d = Distribution::of(&[1.0, 2.0, 3.0]);
        let entries = d.entries("BNN_", "KL_transf");
        assert_eq!(entries[0], ("BNN_MeanKL_transf".to_string(), 2.0));
        assert_eq!(entries.len(), 8);
        assert_eq!(Distribution::of(&[]), Distribution::default());
    }
}
