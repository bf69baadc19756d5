//! Quantile-quantile data for posterior predictive checks.
//!
//! Percentiles are computed at `n` equally spaced levels on `[0, 100]` with
//! linear interpolation between order statistics, so two identical inputs
//! always produce pairs that lie exactly on the diagonal.

use crate::convergence::quantile_sorted;
use crate::density::linspace;
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_QQ_POINTS: usize = 101;

#[derive(Error, Debug, PartialEq)]
pub enum QqError {
    #[error("Cannot compute quantiles of an empty '{0}' array.")]
    EmptyInput(&'static str),
    #[error("The '{0}' array contains NaN or infinite values.")]
    NonFinite(&'static str),
    #[error("At least 2 quantile levels are required, but {0} were requested.")]
    InvalidResolution(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QqPoint {
    pub level: f64,
    pub predicted: f64,
    pub observed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QqData {
    pub points: Vec<QqPoint>,
    /// Diagonal from `(min, min)` to `(max, max)` over both quantile sets.
    pub reference: ((f64, f64), (f64, f64)),
}

/// Matching percentiles of `predicted` and `observed`. The arrays may differ in length.
pub fn qq_data(predicted: &[f64], observed: &[f64], n: usize) -> Result<QqData, QqError> {
    if n < 2 {
        return Err(QqError::InvalidResolution(n));
    }
    let predicted = sorted_finite(predicted, "predicted")?;
    let observed = sorted_finite(observed, "observed")?;

    let points: Vec<QqPoint> = linspace(0.0, 100.0, n)
        .into_iter()
        .map(|level| QqPoint {
            level,
            predicted: quantile_sorted(&predicted, level / 100.0),
            observed: quantile_sorted(&observed, level / 100.0),
        })
        .collect();

    let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        (lo.min(p.predicted).min(p.observed), hi.max(p.predicted).max(p.observed))
    });
    Ok(QqData {
        points,
        reference: ((lo, lo), (hi, hi)),
    })
}

fn sorted_finite(values: &[f64], which: &'static str) -> Result<Vec<f64>, QqError> {
    if values.is_empty() {
        return Err(QqError::EmptyInput(which));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(QqError::NonFinite(which));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identical_inputs_lie_on_the_diagonal() {
        let x: Vec<f64> = (1..=100).map(f64::from).collect();
        let qq = qq_data(&x, &x, DEFAULT_QQ_POINTS).unwrap();
        assert_eq!(qq.points.len(), 101);
        assert!(qq.points.iter().all(|p| p.predicted == p.observed));
        assert_eq!(qq.reference, ((1.0, 1.0), (100.0, 100.0)));
        assert_eq!(qq.points[0].level, 0.0);
        assert_eq!(qq.points[100].level, 100.0);
    }

    #[test]
    fn percentiles_interpolate_linearly() {
        let qq = qq_data(&[0.0, 10.0], &[1.0, 2.0, 3.0, 4.0, 5.0], 5).unwrap();
        let predicted: Vec<f64> = qq.points.iter().map(|p| p.predicted).collect();
        let observed: Vec<f64> = qq.points.iter().map(|p| p.observed).collect();
        assert_eq!(predicted, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
        assert_eq!(observed, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(qq.reference, ((0.0, 0.0), (10.0, 10.0)));
    }

    #[test]
    fn unsorted_input_gives_the_same_quantiles() {
        let sorted = [1.0, 2.0, 3.0, 7.0];
        let shuffled = [7.0, 1.0, 3.0, 2.0];
        let qq = qq_data(&shuffled, &sorted, 11).unwrap();
        for p in &qq.points {
            assert_relative_eq!(p.predicted, p.observed, epsilon = 1e-12);
        }
    }

    #[test]
    fn rejects_empty_non_finite_and_low_resolution() {
        assert_eq!(qq_data(&[], &[1.0], 10).unwrap_err(), QqError::EmptyInput("predicted"));
        assert_eq!(
            qq_data(&[1.0], &[f64::NAN], 10).unwrap_err(),
            QqError::NonFinite("observed")
        );
        assert_eq!(qq_data(&[1.0], &[1.0], 1).unwrap_err(), QqError::InvalidResolution(1));
    }
}
