//! # Regression Models
//!
//! Two Gaussian linear regressions share one formula:
//!
//! - `Naive` fits only the observed rows and ignores the censored ones.
//! - `Imputed` keeps the censored rows as latent responses bounded below by
//!   the cutoff. Their draws are recorded in the trace under the name held by
//!   the [`LATENT_VARIABLE`] constant.
//!
//! Both models are sampled by the Gibbs sampler in `gibbs`. The fitted model
//! bundles the posterior trace with the pointwise log-likelihood of the observed
//! rows, which is what the WAIC comparison consumes.

use crate::censor::{CensoredSplit, select_rows};
use crate::gibbs::{self, SamplerConfig};
use crate::linalg::LinalgError;
use crate::simulate::ObservationTable;
use crate::trace::{PosteriorTrace, TraceError};
use itertools::Itertools;
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis, s};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name of the constant term in a formula.
pub const INTERCEPT: &str = "Intercept";

/// Trace name of the residual standard deviation.
pub const SIGMA: &str = "sigma";

/// Trace name of the latent draws for the censored responses.
pub const LATENT_VARIABLE: &str = "right_censored";

#[derive(Error, Debug)]
pub enum FitError {
    #[error("The formula '{0}' could not be parsed. Expected the form 'y ~ x1 + x2'.")]
    InvalidFormula(String),
    #[error("The formula has no terms; at least one predictor or the intercept is required.")]
    NoTerms,
    #[error("Column '{0}' named in the formula does not exist in the observation table.")]
    UnknownColumn(String),
    #[error("There are no observed rows to fit; every response is censored.")]
    NoObservedRows,
    #[error("Invalid sampler configuration: {0}")]
    InvalidSampler(String),
    #[error("Invalid prior configuration: {0}")]
    InvalidPrior(String),
    #[error("Design matrix has {found} columns, but the model has {expected} coefficients.")]
    DesignMismatch { expected: usize, found: usize },
    #[error("Could not construct a sampling distribution: {0}")]
    Distribution(String),
    #[error("Linear algebra failure while sampling coefficients: {0}")]
    Linalg(#[from] LinalgError),
    #[error("Posterior trace error: {0}")]
    Trace(#[from] TraceError),
}

/// How censored rows enter the likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Censored rows are discarded.
    Naive,
    /// Censored rows become latent variables truncated to `[cutoff, inf)`.
    Imputed,
}

impl ModelKind {
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Naive => "naive",
            ModelKind::Imputed => "imputed",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A response and an ordered list of additive terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub response: String,
    pub terms: Vec<String>,
}

impl Default for Formula {
    fn default() -> Self {
        Self {
            response: "y".to_string(),
            terms: vec![INTERCEPT.to_string(), "x1".to_string(), "x2".to_string()],
        }
    }
}

impl Formula {
    /// Parses `response ~ a + b`. The intercept is added unless a `0` or `-1`
    /// term removes it.
    pub fn parse(text: &str) -> Result<Self, FitError> {
        let (lhs, rhs) = text
            .split_once('~')
            .ok_or_else(|| FitError::InvalidFormula(text.to_string()))?;
        let response = lhs.trim();
        if response.is_empty() {
            return Err(FitError::InvalidFormula(text.to_string()));
        }
        let mut intercept = true;
        let mut terms = Vec::new();
        for raw in rhs.split('+') {
            let term = raw.trim();
            match term {
                "" => return Err(FitError::InvalidFormula(text.to_string())),
                "0" | "-1" => intercept = false,
                "1" | INTERCEPT => intercept = true,
                other => {
                    if !terms.iter().any(|t: &String| t == other) {
                        terms.push(other.to_string());
                    }
                }
            }
        }
        if intercept {
            terms.insert(0, INTERCEPT.to_string());
        }
        if terms.is_empty() {
            return Err(FitError::NoTerms);
        }
        Ok(Self {
            response: response.to_string(),
            terms,
        })
    }

    /// Display name used in model comparisons: the term names joined by `" + "`.
    pub fn display_name(&self) -> String {
        self.terms.iter().join(" + ")
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    /// Builds the design matrix for the given table rows, one column per term.
    pub fn design_matrix(
        &self,
        table: &ObservationTable,
        rows: &[usize],
    ) -> Result<Array2<f64>, FitError> {
        if self.terms.is_empty() {
            return Err(FitError::NoTerms);
        }
        let mut design = Array2::<f64>::zeros((rows.len(), self.terms.len()));
        for (j, term) in self.terms.iter().enumerate() {
            if term == INTERCEPT {
                design.column_mut(j).fill(1.0);
                continue;
            }
            let column = table
                .column(term)
                .ok_or_else(|| FitError::UnknownColumn(term.clone()))?;
            design.column_mut(j).assign(&select_rows(column, rows));
        }
        Ok(design)
    }

    fn response(&self, table: &ObservationTable, rows: &[usize]) -> Result<Array1<f64>, FitError> {
        let column = table
            .column(&self.response)
            .ok_or_else(|| FitError::UnknownColumn(self.response.clone()))?;
        Ok(select_rows(column, rows))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.response, self.display_name())
    }
}

/// Priors: independent `N(0, beta_sd^2)` coefficients and an inverse-gamma
/// residual variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    pub beta_sd: f64,
    pub sigma_shape: f64,
    pub sigma_rate: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            beta_sd: 10.0,
            sigma_shape: 2.0,
            sigma_rate: 1.0,
        }
    }
}

impl PriorConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.beta_sd) {
            return Err(FitError::InvalidPrior(format!(
                "beta_sd must be positive, got {}",
                self.beta_sd
            )));
        }
        if !positive(self.sigma_shape) || !positive(self.sigma_rate) {
            return Err(FitError::InvalidPrior(format!(
                "sigma_shape and sigma_rate must be positive, got {} and {}",
                self.sigma_shape, self.sigma_rate
            )));
        }
        Ok(())
    }
}

/// Design matrices and responses handed to the sampler.
#[derive(Debug, Clone)]
pub struct RegressionData {
    pub x_observed: Array2<f64>,
    pub y_observed: Array1<f64>,
    /// Design rows of the censored responses; empty for the naive model.
    pub x_censored: Array2<f64>,
    /// Lower bound of the latent responses, `None` for the naive model.
    pub cutoff: Option<f64>,
}

impl RegressionData {
    pub fn build(
        kind: ModelKind,
        formula: &Formula,
        table: &ObservationTable,
        split: &CensoredSplit,
    ) -> Result<Self, FitError> {
        if split.n_observed() == 0 {
            return Err(FitError::NoObservedRows);
        }
        let x_observed = formula.design_matrix(table, split.observed())?;
        let y_observed = formula.response(table, split.observed())?;
        let (x_censored, cutoff) = match kind {
            ModelKind::Naive => (Array2::zeros((0, formula.n_terms())), None),
            ModelKind::Imputed => (
                formula.design_matrix(table, split.censored())?,
                Some(split.cutoff()),
            ),
        };
        Ok(Self {
            x_observed,
            y_observed,
            x_censored,
            cutoff,
        })
    }

    pub fn n_terms(&self) -> usize {
        self.x_observed.ncols()
    }

    pub fn n_observed(&self) -> usize {
        self.x_observed.nrows()
    }

    pub fn n_censored(&self) -> usize {
        self.x_censored.nrows()
    }
}

/// A sampled model: formula, posterior trace and observed-row log-likelihood.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub kind: ModelKind,
    pub formula: Formula,
    pub trace: PosteriorTrace,
    /// Pointwise log-likelihood, shape `(chains * draws, observed rows)`.
    pub log_likelihood: Array2<f64>,
}

impl FittedModel {
    pub fn display_name(&self) -> String {
        self.formula.display_name()
    }

    /// Coefficient draws with chains stacked, shape `(chains * draws, terms)`.
    pub fn coefficient_draws(&self) -> Result<Array2<f64>, TraceError> {
        let n = self.trace.n_chains() * self.trace.n_draws();
        let mut out = Array2::<f64>::zeros((n, self.formula.n_terms()));
        for (j, term) in self.formula.terms.iter().enumerate() {
            out.column_mut(j).assign(&self.trace.samples(term)?.column(0));
        }
        Ok(out)
    }

    /// Replicated responses for `design`, one row per posterior draw.
    pub fn posterior_predictive<R: Rng + ?Sized>(
        &self,
        design: ArrayView2<f64>,
        rng: &mut R,
    ) -> Result<Array2<f64>, FitError> {
        let beta = self.coefficient_draws()?;
        if design.ncols() != beta.ncols() {
            return Err(FitError::DesignMismatch {
                expected: beta.ncols(),
                found: design.ncols(),
            });
        }
        let sigma = self.trace.samples(SIGMA)?;
        let mut out = beta.dot(&design.t());
        for (s, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            let sd = sigma[(s, 0)];
            for v in row.iter_mut() {
                let e: f64 = StandardNormal.sample(rng);
                *v += sd * e;
            }
        }
        Ok(out)
    }

    /// Stacked latent draws for the censored rows, `(chains * draws, censored rows)`.
    pub fn latent_draws(&self) -> Result<Array2<f64>, TraceError> {
        self.trace.samples(LATENT_VARIABLE)
    }
}

/// Samples one model from the table and its censoring split.
pub fn fit(
    kind: ModelKind,
    formula: &Formula,
    table: &ObservationTable,
    split: &CensoredSplit,
    prior: &PriorConfig,
    sampler: &SamplerConfig,
) -> Result<FittedModel, FitError> {
    prior.validate()?;
    sampler.validate()?;
    let data = RegressionData::build(kind, formula, table, split)?;
    log::info!(
        "Fitting {} model '{}' on {} observed and {} latent rows ({} chains x {} draws, {} tune)",
        kind,
        formula,
        data.n_observed(),
        data.n_censored(),
        sampler.chains,
        sampler.draws,
        sampler.tune
    );

    let chains = gibbs::run_chains(&data, prior, sampler, kind.label())?;

    let n_chains = chains.len();
    let draws = sampler.draws;
    let p = data.n_terms();
    let mut trace = PosteriorTrace::new();
    for (j, term) in formula.terms.iter().enumerate() {
        let values = Array2::from_shape_fn((n_chains, draws), |(c, d)| chains[c].beta[(d, j)]);
        trace.insert_scalar(term, values)?;
    }
    let sigma = Array2::from_shape_fn((n_chains, draws), |(c, d)| chains[c].sigma[d]);
    trace.insert_scalar(SIGMA, sigma)?;
    if kind == ModelKind::Imputed {
        let n_latent = data.n_censored();
        let latent = Array3::from_shape_fn((n_chains, draws, n_latent), |(c, d, k)| {
            chains[c].latent[(d, k)]
        });
        trace.insert(LATENT_VARIABLE, latent)?;
    }

    let mut log_likelihood = Array2::<f64>::zeros((n_chains * draws, data.n_observed()));
    for (c, chain) in chains.iter().enumerate() {
        log_likelihood
            .slice_mut(s![c * draws..(c + 1) * draws, ..])
            .assign(&chain.log_likelihood);
    }
    log::debug!("Trace for {kind} model holds {p} coefficients");

    Ok(FittedModel {
        kind,
        formula: formula.clone(),
        trace,
        log_likelihood,
    })
}
