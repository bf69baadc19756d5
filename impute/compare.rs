//! WAIC model comparison.
//!
//! Works purely on the pointwise log-likelihood matrices carried by the fitted
//! models (draws x observed rows). All models must be evaluated on the same
//! observations for the comparison to be meaningful.

use crate::model::{FittedModel, ModelKind};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Posterior variance of a pointwise log-likelihood above which WAIC is flagged
/// as unreliable.
pub const P_WAIC_WARNING_THRESHOLD: f64 = 0.4;

#[derive(Error, Debug, PartialEq)]
pub enum CompareError {
    #[error("At least two models are required for a comparison, but {0} were given.")]
    NotEnoughModels(usize),
    #[error(
        "Model '{name}' has {found} pointwise observations, but the first model has {expected}."
    )]
    MismatchedObservations {
        name: String,
        found: usize,
        expected: usize,
    },
    #[error("Model '{0}' has no posterior draws or no observations to score.")]
    EmptyLogLikelihood(String),
}

/// WAIC of one model with its pointwise contributions.
#[derive(Debug, Clone)]
pub struct Waic {
    pub elpd: f64,
    pub se: f64,
    pub p_waic: f64,
    pub pointwise: Array1<f64>,
    pub warning: bool,
}

/// Computes WAIC on the log scale from a `(draws, observations)` matrix.
pub fn waic(log_lik: ArrayView2<f64>) -> Waic {
    let (s, n) = log_lik.dim();
    let ln_s = (s as f64).ln();
    let mut pointwise = Array1::<f64>::zeros(n);
    let mut p_total = 0.0;
    let mut warning = false;
    for (i, column) in log_lik.axis_iter(Axis(1)).enumerate() {
        let lppd = logsumexp(column) - ln_s;
        let p = if s > 1 { column.var(1.0) } else { 0.0 };
        warning |= p > P_WAIC_WARNING_THRESHOLD;
        p_total += p;
        pointwise[i] = lppd - p;
    }
    let elpd = pointwise.sum();
    let se = paired_se(pointwise.view());
    Waic {
        elpd,
        se,
        p_waic: p_total,
        pointwise,
        warning,
    }
}

/// `sqrt(n * var(x))` with one degree of freedom removed, 0 for fewer than two points.
fn paired_se(x: ArrayView1<f64>) -> f64 {
    let n = x.len();
    if n < 2 {
        return 0.0;
    }
    (n as f64 * x.var(1.0)).sqrt()
}

fn logsumexp(xs: ArrayView1<f64>) -> f64 {
    let m = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return m;
    }
    m + xs.iter().map(|&x| (x - m).exp()).sum::<f64>().ln()
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    /// How the model treats censored rows, when it came from a fit.
    pub kind: Option<ModelKind>,
    pub name: String,
    pub rank: usize,
    pub elpd_waic: f64,
    pub p_waic: f64,
    pub elpd_diff: f64,
    pub weight: f64,
    pub se: f64,
    pub dse: f64,
    pub warning: bool,
}

/// Models ordered best first.
#[derive(Debug, Clone)]
pub struct ComparisonTable {
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn best(&self) -> Option<&ComparisonRow> {
        self.rows.first()
    }

    pub fn row(&self, name: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    pub fn row_for_kind(&self, kind: ModelKind) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.kind == Some(kind))
    }
}

/// Display names for the models, with repeats suffixed ` #2`, ` #3`, ...
pub fn display_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|n| {
            let base: String = n.into();
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base} #{count}")
            }
        })
        .collect()
}

struct Entry<'a> {
    kind: Option<ModelKind>,
    name: String,
    log_lik: ArrayView2<'a, f64>,
}

/// Compares fitted models by WAIC. Each model is named after its formula terms
/// and its row carries the model kind.
pub fn compare(models: &[&FittedModel]) -> Result<ComparisonTable, CompareError> {
    let names = display_names(models.iter().map(|m| m.display_name()));
    let entries = names
        .into_iter()
        .zip(models)
        .map(|(name, m)| Entry {
            kind: Some(m.kind),
            name,
            log_lik: m.log_likelihood.view(),
        })
        .collect();
    rank_entries(entries)
}

/// Compares named pointwise log-likelihood matrices.
pub fn compare_log_likelihoods(
    entries: &[(String, ArrayView2<f64>)],
) -> Result<ComparisonTable, CompareError> {
    let entries = entries
        .iter()
        .map(|(name, ll)| Entry {
            kind: None,
            name: name.clone(),
            log_lik: *ll,
        })
        .collect();
    rank_entries(entries)
}

fn rank_entries(entries: Vec<Entry<'_>>) -> Result<ComparisonTable, CompareError> {
    if entries.len() < 2 {
        return Err(CompareError::NotEnoughModels(entries.len()));
    }
    let expected = entries[0].log_lik.ncols();
    for Entry { name, log_lik: ll, .. } in &entries {
        if ll.nrows() == 0 || ll.ncols() == 0 {
            return Err(CompareError::EmptyLogLikelihood(name.clone()));
        }
        if ll.ncols() != expected {
            return Err(CompareError::MismatchedObservations {
                name: name.clone(),
                found: ll.ncols(),
                expected,
            });
        }
    }

    let mut scored: Vec<(Entry<'_>, Waic)> = entries
        .into_iter()
        .map(|e| {
            let w = waic(e.log_lik);
            (e, w)
        })
        .collect();
    scored.sort_by(|a, b| b.1.elpd.total_cmp(&a.1.elpd));

    let best_elpd = scored[0].1.elpd;
    let best_pointwise = scored[0].1.pointwise.clone();
    let total_weight: f64 = scored.iter().map(|(_, w)| (w.elpd - best_elpd).exp()).sum();

    let rows = scored
        .into_iter()
        .enumerate()
        .map(|(rank, (entry, w))| {
            let diff = &best_pointwise - &w.pointwise;
            ComparisonRow {
                kind: entry.kind,
                name: entry.name,
                rank,
                elpd_waic: w.elpd,
                p_waic: w.p_waic,
                elpd_diff: best_elpd - w.elpd,
                weight: (w.elpd - best_elpd).exp() / total_weight,
                se: w.se,
                dse: if rank == 0 { 0.0 } else { paired_se(diff.view()) },
                warning: w.warning,
            }
        })
        .collect::<Vec<_>>();

    if let Some(best) = rows.first() {
        match best.kind {
            Some(kind) => log::info!(
                "Model comparison: the {} model '{}' ranks first with elpd_waic {:.2}",
                kind,
                best.name,
                best.elpd_waic
            ),
            None => log::info!(
                "Model comparison: '{}' ranks first with elpd_waic {:.2}",
                best.name,
                best.elpd_waic
            ),
        }
    }
    Ok(ComparisonTable { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array2, array};

    #[test]
    fn waic_of_constant_log_likelihood_has_no_penalty() {
        let ll = Array2::from_elem((10, 4), -1.5);
        let w = waic(ll.view());
        assert_relative_eq!(w.elpd, -6.0, epsilon = 1e-12);
        assert_eq!(w.p_waic, 0.0);
        assert_eq!(w.se, 0.0);
        assert!(!w.warning);
    }

    #[test]
    fn waic_penalizes_posterior_variance() {
        let ll = array![[-1.0, -2.0], [-3.0, -2.0]];
        let w = waic(ll.view());
        // column 0: lppd = ln((e^-1 + e^-3) / 2), var = 2
        let lppd0 = (((-1.0f64).exp() + (-3.0f64).exp()) / 2.0).ln();
        assert_relative_eq!(w.pointwise[0], lppd0 - 2.0, epsilon = 1e-12);
        assert_relative_eq!(w.pointwise[1], -2.0, epsilon = 1e-12);
        assert!(w.warning);
    }

    #[test]
    fn ranks_models_and_normalizes_weights() {
        let good = Array2::from_elem((20, 5), -1.0);
        let bad = Array2::from_elem((20, 5), -2.0);
        let table = compare_log_likelihoods(&[
            ("bad".to_string(), bad.view()),
            ("good".to_string(), good.view()),
        ])
        .unwrap();
        assert_eq!(table.rows[0].name, "good");
        assert!(table.rows.iter().all(|r| r.kind.is_none()));
        assert!(table.row_for_kind(ModelKind::Naive).is_none());
        assert_eq!(table.rows[0].rank, 0);
        assert_eq!(table.rows[1].rank, 1);
        assert_relative_eq!(table.rows[1].elpd_diff, 5.0, epsilon = 1e-12);
        assert_eq!(table.rows[0].elpd_diff, 0.0);
        let total: f64 = table.rows.iter().map(|r| r.weight).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert!(table.rows[0].weight > table.rows[1].weight);
    }

    #[test]
    fn rejects_single_model_and_mismatched_observations() {
        let a = Array2::from_elem((5, 3), -1.0);
        let b = Array2::from_elem((5, 4), -1.0);
        assert_eq!(
            compare_log_likelihoods(&[("a".to_string(), a.view())]).unwrap_err(),
            CompareError::NotEnoughModels(1)
        );
        assert_eq!(
            compare_log_likelihoods(&[("a".to_string(), a.view()), ("b".to_string(), b.view())])
                .unwrap_err(),
            CompareError::MismatchedObservations {
                name: "b".to_string(),
                found: 4,
                expected: 3
            }
        );
    }

    #[test]
    fn duplicate_names_get_numbered() {
        let names = display_names(["Intercept + x1", "Intercept + x1", "x2", "Intercept + x1"]);
        assert_eq!(
            names,
            vec!["Intercept + x1", "Intercept + x1 #2", "x2", "Intercept + x1 #3"]
        );
    }
}
