//! Interval data for coefficient forest plots.

use crate::convergence::hdi;
use crate::model::FittedModel;
use crate::trace::TraceError;
use serde::{Deserialize, Serialize};

/// Outer and inner interval masses drawn per coefficient.
pub const OUTER_HDI_PROB: f64 = 0.94;
pub const INNER_HDI_PROB: f64 = 0.5;

/// Label of the reference line at the transformed zero.
pub const REFERENCE_LABEL: &str = "no effect";

/// Mapping applied to the coefficient axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisTransform {
    #[default]
    Identity,
    /// Multiplicative scale, e.g. for log-link coefficients.
    Exp,
}

impl AxisTransform {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            AxisTransform::Identity => x,
            AxisTransform::Exp => x.exp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForestRow {
    pub term: String,
    pub mean: f64,
    pub outer_low: f64,
    pub outer_high: f64,
    pub inner_low: f64,
    pub inner_high: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForestData {
    pub transform: AxisTransform,
    pub rows: Vec<ForestRow>,
    pub reference: f64,
    pub reference_label: &'static str,
}

impl ForestData {
    /// Smallest and largest value that must be visible on the axis,
    /// including the reference line.
    pub fn extent(&self) -> (f64, f64) {
        self.rows.iter().fold((self.reference, self.reference), |(lo, hi), r| {
            (lo.min(r.outer_low), hi.max(r.outer_high))
        })
    }
}

/// Per-term posterior mean and HDIs of a model's fixed effects.
pub fn forest_data(model: &FittedModel, transform: AxisTransform) -> Result<ForestData, TraceError> {
    let rows = model
        .formula
        .terms
        .iter()
        .map(|term| {
            let draws = model.trace.component_samples(term, 0)?;
            Ok(forest_row(term, &draws, transform))
        })
        .collect::<Result<Vec<_>, TraceError>>()?;
    Ok(ForestData {
        transform,
        rows,
        reference: transform.apply(0.0),
        reference_label: REFERENCE_LABEL,
    })
}

/// Mean and intervals are all taken over the transformed draws.
fn forest_row(term: &str, draws: &[f64], transform: AxisTransform) -> ForestRow {
    let scaled: Vec<f64> = draws
        .iter()
        .map(|&v| transform.apply(v))
        .filter(|v| v.is_finite())
        .collect();
    let mean = if scaled.is_empty() {
        f64::NAN
    } else {
        scaled.iter().sum::<f64>() / scaled.len() as f64
    };
    let (outer_low, outer_high) = hdi(&scaled, OUTER_HDI_PROB);
    let (inner_low, inner_high) = hdi(&scaled, INNER_HDI_PROB);
    ForestRow {
        term: term.to_string(),
        mean,
        outer_low,
        outer_high,
        inner_low,
        inner_high,
    }
}
