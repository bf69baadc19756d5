//! Right-censoring split of an observation table.
//!
//! Rows whose response lies strictly below the cutoff are observed; every other
//! row is censored (its response is only known to be at or above the cutoff).
//! The split stores row indices into the original table, so it is a pair of
//! views rather than a copy, and the two sides always reconstruct the table.

use crate::simulate::ObservationTable;
use ndarray::{Array1, ArrayView1};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CensorError {
    #[error("The censoring cutoff must be finite, but got {0}.")]
    NonFiniteCutoff(f64),
}

/// Partition of an observation table into observed and censored rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CensoredSplit {
    cutoff: f64,
    observed: Vec<usize>,
    censored: Vec<usize>,
}

impl CensoredSplit {
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Indices of rows with `y < cutoff`, in table order.
    pub fn observed(&self) -> &[usize] {
        &self.observed
    }

    /// Indices of rows with `y >= cutoff`, in table order.
    pub fn censored(&self) -> &[usize] {
        &self.censored
    }

    pub fn n_observed(&self) -> usize {
        self.observed.len()
    }

    pub fn n_censored(&self) -> usize {
        self.censored.len()
    }

    pub fn censored_fraction(&self) -> f64 {
        let total = self.observed.len() + self.censored.len();
        if total == 0 {
            0.0
        } else {
            self.censored.len() as f64 / total as f64
        }
    }

    /// Merges both sides back into the full, ordered list of row indices.
    pub fn reconstruct(&self) -> Vec<usize> {
        let mut merged = Vec::with_capacity(self.observed.len() + self.censored.len());
        let (mut i, mut j) = (0, 0);
        while i < self.observed.len() && j < self.censored.len() {
            if self.observed[i] < self.censored[j] {
                merged.push(self.observed[i]);
                i += 1;
            } else {
                merged.push(self.censored[j]);
                j += 1;
            }
        }
        merged.extend_from_slice(&self.observed[i..]);
        merged.extend_from_slice(&self.censored[j..]);
        merged
    }
}

/// Splits `table` at `cutoff` using the strict comparison `y < cutoff`.
pub fn split_at_cutoff(table: &ObservationTable, cutoff: f64) -> Result<CensoredSplit, CensorError> {
    if !cutoff.is_finite() {
        return Err(CensorError::NonFiniteCutoff(cutoff));
    }
    let (observed, censored): (Vec<usize>, Vec<usize>) =
        (0..table.len()).partition(|&i| table.y()[i] < cutoff);

    log::info!(
        "Censoring at y >= {}: {} observed, {} censored ({:.1}%)",
        cutoff,
        observed.len(),
        censored.len(),
        100.0 * censored.len() as f64 / table.len().max(1) as f64
    );

    Ok(CensoredSplit {
        cutoff,
        observed,
        censored,
    })
}

/// Gathers the entries of `column` at `rows`.
pub fn select_rows(column: ArrayView1<f64>, rows: &[usize]) -> Array1<f64> {
    rows.iter().map(|&i| column[i]).collect()
}
