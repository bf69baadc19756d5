//! Gaussian kernel density estimation on an evaluation grid.
//!
//! The estimator is fully parameterized: the bandwidth rule and the grid
//! resolution are explicit inputs, so the numerical behavior of anything built
//! on top of it (the posterior mode in particular) is reproducible.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Kernel contributions further than this many bandwidths away are dropped.
/// `exp(-0.5 * 8^2)` is below `1.3e-14`.
const KERNEL_CUTOFF_BANDWIDTHS: f64 = 8.0;

/// Rule used to turn the sample spread into a kernel bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    /// Scott's rule, `n^(-1/5) * sd`.
    #[default]
    Scott,
    /// Silverman's rule, `(4/3)^(1/5) * n^(-1/5) * sd`.
    Silverman,
    /// A fixed bandwidth in data units.
    Fixed(f64),
}

impl Bandwidth {
    /// Resolves the rule to a bandwidth for `n` samples with standard deviation `sd`.
    pub fn resolve(self, n: usize, sd: f64) -> f64 {
        let n = n.max(1) as f64;
        match self {
            Bandwidth::Scott => n.powf(-0.2) * sd,
            Bandwidth::Silverman => (4.0_f64 / 3.0).powf(0.2) * n.powf(-0.2) * sd,
            Bandwidth::Fixed(h) => h,
        }
    }
}

/// A Gaussian KDE over finite, sorted samples.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    sorted: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// Builds the estimator from the finite entries of `samples`.
    ///
    /// Returns `None` when there are no finite samples.
    pub fn new(samples: &[f64], rule: Bandwidth) -> Option<Self> {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        let sd = sample_sd(&sorted);
        let bandwidth = rule.resolve(sorted.len(), sd);
        Some(Self { sorted, bandwidth })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn n(&self) -> usize {
        self.sorted.len()
    }

    pub fn min(&self) -> f64 {
        self.sorted[0]
    }

    pub fn max(&self) -> f64 {
        self.sorted[self.sorted.len() - 1]
    }

    /// Density at a single point.
    pub fn density(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        if h.is_nan() || h <= 0.0 {
            return f64::NAN;
        }
        let reach = KERNEL_CUTOFF_BANDWIDTHS * h;
        let lo = self.sorted.partition_point(|&v| v < x - reach);
        let hi = self.sorted.partition_point(|&v| v <= x + reach);
        let sum: f64 = self.sorted[lo..hi]
            .iter()
            .map(|&v| {
                let u = (x - v) / h;
                (-0.5 * u * u).exp()
            })
            .sum();
        sum / (self.sorted.len() as f64 * h * (2.0 * PI).sqrt())
    }

    /// Evaluates the density on `bins` equally spaced points spanning
    /// `[min, max]` of the samples. Returns `(grid, density)`.
    pub fn evaluate_grid(&self, bins: usize) -> (Vec<f64>, Vec<f64>) {
        let grid = linspace(self.min(), self.max(), bins);
        let density = grid.iter().map(|&x| self.density(x)).collect();
        (grid, density)
    }
}

/// `n` equally spaced points from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Sample standard deviation with one degree of freedom removed.
fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n as f64 - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scott_and_silverman_scale_with_sample_size() {
        assert_relative_eq!(Bandwidth::Scott.resolve(32, 1.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(
            Bandwidth::Silverman.resolve(32, 2.0),
            (4.0_f64 / 3.0).powf(0.2) * 0.5 * 2.0,
            epsilon = 1e-12
        );
        assert_eq!(Bandwidth::Fixed(0.3).resolve(1000, 5.0), 0.3);
    }

    #[test]
    fn single_point_density_matches_normal_pdf() {
        let kde = GaussianKde::new(&[0.0, 0.0], Bandwidth::Fixed(1.0)).unwrap();
        let expected = 1.0 / (2.0 * PI).sqrt();
        assert_relative_eq!(kde.density(0.0), expected, epsilon = 1e-12);
        assert_relative_eq!(kde.density(1.0), expected * (-0.5f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn density_integrates_to_about_one() {
        let samples: Vec<f64> = (0..200).map(|i| (i as f64 * 0.37).sin() * 3.0).collect();
        let kde = GaussianKde::new(&samples, Bandwidth::Scott).unwrap();
        let grid = linspace(-10.0, 10.0, 4001);
        let step = grid[1] - grid[0];
        let integral: f64 = grid.iter().map(|&x| kde.density(x) * step).sum();
        assert_relative_eq!(integral, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn non_finite_samples_are_dropped() {
        assert!(GaussianKde::new(&[f64::NAN, f64::INFINITY], Bandwidth::Scott).is_none());
        let kde = GaussianKde::new(&[1.0, f64::NAN, 3.0], Bandwidth::Scott).unwrap();
        assert_eq!(kde.n(), 2);
        assert_eq!((kde.min(), kde.max()), (1.0, 3.0));
    }

    #[test]
    fn linspace_hits_both_endpoints() {
        let g = linspace(-1.0, 2.0, 4);
        assert_eq!(g, vec![-1.0, 0.0, 1.0, 2.0]);
        assert_eq!(linspace(3.0, 3.0, 1), vec![3.0]);
    }
}
