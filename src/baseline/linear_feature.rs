//! Linear regression baseline on hand-built time/observation features
//!
//! Features per step `t` of a path:
//!
//! ```text
//! [clip(o), clip(o)^2, t/100, (t/100)^2, (t/100)^3, 1]
//! ```
//!
//! with observations clipped to `[-10, 10]`. Coefficients come from ridge
//! regression against the discounted returns; if the normal equations are
//! singular the ridge term is grown tenfold, up to five times.

use anyhow::{anyhow, Result};

use super::Baseline;
use crate::{buffer::Path, process::ProcessedPath};

const OBS_CLIP: f32 = 10.0;
const RIDGE_RETRIES: usize = 5;

/// Ridge-regression baseline over polynomial features
#[derive(Debug, Clone)]
pub struct LinearFeatureBaseline {
    reg_coeff: f64,
    coeffs: Option<Vec<f64>>,
}

impl LinearFeatureBaseline {
    /// Create an unfitted baseline with the given initial ridge coefficient
    pub fn new(reg_coeff: f64) -> Self {
        Self { reg_coeff, coeffs: None }
    }

    /// Fitted coefficients, if any
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coeffs.as_deref()
    }

    fn features(path: &Path) -> Vec<Vec<f64>> {
        path.observations
            .iter()
            .enumerate()
            .map(|(t, obs)| {
                let al = t as f64 / 100.0;
                let clipped: Vec<f64> = obs.iter().map(|&o| o.clamp(-OBS_CLIP, OBS_CLIP) as f64).collect();
                let mut row = Vec::with_capacity(2 * clipped.len() + 4);
                row.extend(clipped.iter().copied());
                row.extend(clipped.iter().map(|o| o * o));
                row.extend([al, al * al, al * al * al, 1.0]);
                row
            })
            .collect()
    }
}

impl Default for LinearFeatureBaseline {
    fn default() -> Self {
        Self::new(1e-5)
    }
}

impl Baseline for LinearFeatureBaseline {
    fn fit(&mut self, paths: &[ProcessedPath]) -> Result<()> {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for p in paths {
            rows.extend(Self::features(&p.path));
            targets.extend(p.returns.iter().map(|&r| r as f64));
        }
        let Some(width) = rows.first().map(Vec::len) else {
            return Ok(());
        };

        // Normal equations: (XᵀX + reg·I) w = Xᵀy
        let mut xtx = vec![vec![0.0f64; width]; width];
        let mut xty = vec![0.0f64; width];
        for (row, &y) in rows.iter().zip(&targets) {
            for i in 0..width {
                xty[i] += row[i] * y;
                for j in 0..width {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }

        let mut reg = self.reg_coeff;
        for _ in 0..RIDGE_RETRIES {
            let mut a = xtx.clone();
            for (i, row) in a.iter_mut().enumerate() {
                row[i] += reg;
            }
            if let Some(w) = solve(a, xty.clone()) {
                if w.iter().all(|c| c.is_finite()) {
                    self.coeffs = Some(w);
                    return Ok(());
                }
            }
            reg *= 10.0;
        }

        Err(anyhow!("baseline regression stayed singular up to ridge coefficient {}", reg))
    }

    fn predict(&self, path: &Path) -> Vec<f32> {
        match &self.coeffs {
            None => vec![0.0; path.len()],
            Some(w) => Self::features(path)
                .iter()
                .map(|row| row.iter().zip(w).map(|(x, c)| x * c).sum::<f64>() as f32)
                .collect(),
        }
    }
}

/// Gaussian elimination with partial pivoting; `None` when singular
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed(observations: Vec<Vec<f32>>, returns: Vec<f32>) -> ProcessedPath {
        let n = returns.len();
        ProcessedPath {
            path: Path {
                observations,
                actions: vec![vec![0.0]; n],
                rewards: vec![0.0; n],
                ..Default::default()
            },
            rewards: vec![0.0; n],
            returns,
            advantages: vec![0.0; n],
            baselines: vec![0.0; n],
        }
    }

    #[test]
    fn test_unfitted_predicts_zero() {
        let baseline = LinearFeatureBaseline::default();
        let p = processed(vec![vec![1.0]; 3], vec![0.0; 3]);
        assert_eq!(baseline.predict(&p.path), vec![0.0; 3]);
    }

    #[test]
    fn test_fits_observation_linear_returns() {
        // return = 2·obs + 1 is exactly representable by the features
        let obs: Vec<Vec<f32>> = (0..20).map(|i| vec![(i % 5) as f32 - 2.0]).collect();
        let returns: Vec<f32> = obs.iter().map(|o| 2.0 * o[0] + 1.0).collect();
        let p = processed(obs, returns.clone());

        let mut baseline = LinearFeatureBaseline::default();
        baseline.fit(std::slice::from_ref(&p)).unwrap();

        let predictions = baseline.predict(&p.path);
        for (pred, target) in predictions.iter().zip(&returns) {
            assert!((pred - target).abs() < 1e-2, "{} vs {}", pred, target);
        }
    }

    #[test]
    fn test_solve_small_system() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);

        assert!(solve(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]).is_none());
    }
}
