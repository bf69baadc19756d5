//! Posterior diagnostics
//!
//! This module holds the stateless helpers used to inspect sampler output:
//!
//! 1. Standardization of a numeric column, `(x - mean) / (2 * sd)`.
//!
//! 2. Posterior mode estimation: a Gaussian KDE evaluated on an equally spaced
//!    grid over the finite samples, returning the grid point of maximum density.
//!
//! 3. The summary table: mean, sd, HDI, Monte Carlo standard error, bulk/tail
//!    ESS and R-hat per scalar parameter, plus the posterior mode.
//!
//! Nothing here renders anything; `report` turns these values into text.

use crate::convergence::{ess_bulk, ess_tail, hdi, r_hat_rank_folded};
use crate::density::{Bandwidth, GaussianKde};
use crate::trace::{PosteriorTrace, TraceError};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default resolution of the posterior mode grid.
pub const DEFAULT_MODE_BINS: usize = 500;

/// Default HDI mass reported by the summary table.
pub const DEFAULT_HDI_PROB: f64 = 0.94;

#[derive(Error, Debug, PartialEq)]
pub enum DiagnosticsError {
    #[error("Cannot estimate a posterior mode: the sample contains no finite values.")]
    NoFiniteSamples,
    #[error("The mode grid needs at least 2 points, but {0} were requested.")]
    InvalidBins(usize),
    #[error("The kernel bandwidth must be finite and positive, but resolved to {0}.")]
    InvalidBandwidth(f64),
    #[error("The HDI probability must lie in (0, 1), but got {0}.")]
    InvalidHdiProb(f64),
    #[error("Trace lookup failed: {0}")]
    Trace(#[from] TraceError),
}

/// Parameters of the KDE-based mode estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    pub bins: usize,
    pub bandwidth: Bandwidth,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            bins: DEFAULT_MODE_BINS,
            bandwidth: Bandwidth::Scott,
        }
    }
}

/// Scales a column to mean 0 and standard deviation 0.5.
///
/// Uses the population standard deviation. A constant column divides by zero
/// and yields non-finite values.
pub fn standardize(x: ArrayView1<f64>) -> Array1<f64> {
    let n = x.len() as f64;
    let mean = x.sum() / n;
    let sd = (x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    x.mapv(|v| (v - mean) / (2.0 * sd))
}

/// Estimates the mode of a one-dimensional sample.
///
/// Non-finite values are discarded before the density is estimated. A sample
/// whose finite values are all equal has that value as its mode.
pub fn posterior_mode(samples: &[f64], config: &ModeConfig) -> Result<f64, DiagnosticsError> {
    if config.bins < 2 {
        return Err(DiagnosticsError::InvalidBins(config.bins));
    }
    let kde = GaussianKde::new(samples, config.bandwidth).ok_or(DiagnosticsError::NoFiniteSamples)?;
    if kde.min() == kde.max() {
        return Ok(kde.min());
    }
    let h = kde.bandwidth();
    if !h.is_finite() || h <= 0.0 {
        return Err(DiagnosticsError::InvalidBandwidth(h));
    }

    let (grid, density) = kde.evaluate_grid(config.bins);
    let mut best = 0usize;
    for (i, &d) in density.iter().enumerate().skip(1) {
        if d > density[best] {
            best = i;
        }
    }
    Ok(grid[best])
}

/// Mode of every column of a `(draws, parameters)` matrix, computed in parallel.
pub fn posterior_modes(
    samples: ArrayView2<f64>,
    config: &ModeConfig,
) -> Result<Array1<f64>, DiagnosticsError> {
    let modes: Result<Vec<f64>, DiagnosticsError> = samples
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|column| posterior_mode(&column.to_vec(), config))
        .collect();
    Ok(Array1::from_vec(modes?))
}

/// Options for [`summarize`].
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    /// Restrict the table to these variables, in this order. `None` keeps every
    /// variable in trace order.
    pub var_names: Option<Vec<String>>,
    pub hdi_prob: f64,
    pub mode: ModeConfig,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            var_names: None,
            hdi_prob: DEFAULT_HDI_PROB,
            mode: ModeConfig::default(),
        }
    }
}

/// One row of the summary table, describing a single scalar component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub hdi_low: f64,
    pub hdi_high: f64,
    pub mcse_mean: f64,
    pub ess_bulk: f64,
    pub ess_tail: f64,
    pub r_hat: f64,
    pub mode: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub hdi_prob: f64,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn row(&self, name: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column labels for the HDI bounds, e.g. `hdi_3%` and `hdi_97%`.
    pub fn hdi_labels(&self) -> (String, String) {
        let tail = (1.0 - self.hdi_prob) / 2.0 * 100.0;
        (
            format!("hdi_{}%", trim_percent(tail)),
            format!("hdi_{}%", trim_percent(100.0 - tail)),
        )
    }
}

fn trim_percent(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded:.1}")
    }
}

/// Summarizes every scalar component of the selected trace variables.
///
/// The trace is only read. Rows follow variable order, and vector variables
/// expand to `name[i]` rows.
pub fn summarize(
    trace: &PosteriorTrace,
    options: &SummaryOptions,
) -> Result<SummaryTable, DiagnosticsError> {
    if !(options.hdi_prob > 0.0 && options.hdi_prob < 1.0) {
        return Err(DiagnosticsError::InvalidHdiProb(options.hdi_prob));
    }
    let names: Vec<String> = match &options.var_names {
        Some(selected) => selected.clone(),
        None => trace.names().to_vec(),
    };

    let mut components = Vec::new();
    for name in &names {
        for (offset, component) in trace.component_names(name)?.into_iter().enumerate() {
            components.push((name.clone(), offset, component.to_string()));
        }
    }

    let rows: Result<Vec<SummaryRow>, DiagnosticsError> = components
        .par_iter()
        .map(|(variable, index, label)| {
            let chains = trace.component_chains(variable, *index)?;
            summarize_component(label, &chains, options)
        })
        .collect();

    let rows = rows?;
    log::debug!("Summarized {} components across {} variables", rows.len(), names.len());
    Ok(SummaryTable {
        hdi_prob: options.hdi_prob,
        rows,
    })
}

fn summarize_component(
    label: &str,
    chains: &[Vec<f64>],
    options: &SummaryOptions,
) -> Result<SummaryRow, DiagnosticsError> {
    let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
    let refs: Vec<&[f64]> = chains.iter().map(Vec::as_slice).collect();

    let n = pooled.len() as f64;
    let mean = pooled.iter().sum::<f64>() / n;
    let sd = if pooled.len() > 1 {
        (pooled.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    let (hdi_low, hdi_high) = hdi(&pooled, options.hdi_prob);
    let bulk = ess_bulk(&refs);
    let mcse_mean = if bulk > 0.0 { sd / bulk.sqrt() } else { f64::NAN };

    Ok(SummaryRow {
        name: label.to_string(),
        mean,
        sd,
        hdi_low,
        hdi_high,
        mcse_mean,
        ess_bulk: bulk,
        ess_tail: ess_tail(&refs),
        r_hat: r_hat_rank_folded(&refs),
        mode: posterior_mode(&pooled, &options.mode)?,
    })
}
