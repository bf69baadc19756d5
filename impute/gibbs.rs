//! Gibbs sampler for the conjugate Gaussian linear regression.
//!
//! # Design
//!
//! Each sweep updates three blocks in turn:
//!
//! - Latent censored responses, drawn from `N(x_k β, σ²)` truncated to
//!   `[cutoff, ∞)`. Skipped for the naive model.
//! - Coefficients from `N(Q⁻¹ X'y / σ², Q⁻¹)` with `Q = X'X / σ² + I / τ²`,
//!   drawn through the Cholesky factor of the precision: `β = m + L⁻ᵀ z`.
//! - The residual variance from its inverse-gamma full conditional.
//!
//! Chains run in parallel with rayon. Chain `c` is seeded with `seed + c`,
//! so a run is reproducible regardless of thread scheduling.

use crate::linalg::Cholesky;
use crate::model::{FitError, PriorConfig, RegressionData};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand::SeedableRng;
use rand::distributions::Open01;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp1, Gamma, StandardNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;
use std::io::IsTerminal;

/// Standardized truncation points above this use exponential rejection
/// instead of the inverse CDF, whose tail mass underflows.
const TAIL_REJECTION_THRESHOLD: f64 = 8.0;

/// Sweeps between progress bar updates.
const PROGRESS_STRIDE: usize = 50;

/// Configuration of the sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Retained draws per chain.
    pub draws: usize,
    /// Discarded warm-up sweeps per chain.
    pub tune: usize,
    pub chains: usize,
    pub seed: u64,
    pub progress: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            draws: 1000,
            tune: 1000,
            chains: 4,
            seed: 42,
            progress: true,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.draws == 0 {
            return Err(FitError::InvalidSampler("draws must be at least 1".to_string()));
        }
        if self.chains == 0 {
            return Err(FitError::InvalidSampler("chains must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Retained draws of a single chain.
#[derive(Debug, Clone)]
pub struct ChainDraws {
    /// `(draws, terms)`
    pub beta: Array2<f64>,
    /// Residual standard deviation per draw.
    pub sigma: Array1<f64>,
    /// `(draws, censored rows)`; zero columns for the naive model.
    pub latent: Array2<f64>,
    /// `(draws, observed rows)`
    pub log_likelihood: Array2<f64>,
}

/// Runs all chains in parallel and returns them in chain order.
pub fn run_chains(
    data: &RegressionData,
    prior: &PriorConfig,
    config: &SamplerConfig,
    label: &str,
) -> Result<Vec<ChainDraws>, FitError> {
    config.validate()?;
    let sweeps = (config.tune + config.draws) as u64;
    let pb = create_progress_bar(
        sweeps * config.chains as u64,
        &format!("Sampling {label} model"),
        config.progress,
    );

    let chains = (0..config.chains)
        .into_par_iter()
        .map(|c| run_chain(data, prior, config, config.seed.wrapping_add(c as u64), &pb))
        .collect::<Result<Vec<_>, _>>();

    pb.finish_and_clear();
    let chains = chains?;
    log::info!(
        "Finished {} chains for the {label} model ({} retained draws each)",
        chains.len(),
        config.draws
    );
    Ok(chains)
}

fn create_progress_bar(len: u64, message: &str, enabled: bool) -> ProgressBar {
    let draw_target = if enabled && std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

/// Sufficient statistics that do not change across sweeps.
struct Precomputed {
    xtx: Array2<f64>,
    xty_observed: Array1<f64>,
    prior_precision: f64,
    n_total: f64,
}

impl Precomputed {
    fn new(data: &RegressionData, prior: &PriorConfig) -> Self {
        let mut xtx = data.x_observed.t().dot(&data.x_observed);
        if data.n_censored() > 0 {
            xtx += &data.x_censored.t().dot(&data.x_censored);
        }
        Self {
            xtx,
            xty_observed: data.x_observed.t().dot(&data.y_observed),
            prior_precision: 1.0 / (prior.beta_sd * prior.beta_sd),
            n_total: (data.n_observed() + data.n_censored()) as f64,
        }
    }
}

fn run_chain(
    data: &RegressionData,
    prior: &PriorConfig,
    config: &SamplerConfig,
    seed: u64,
    pb: &ProgressBar,
) -> Result<ChainDraws, FitError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let std_normal = Normal::new(0.0, 1.0).map_err(|e| FitError::Distribution(e.to_string()))?;
    let stats = Precomputed::new(data, prior);
    let p = data.n_terms();
    let n_obs = data.n_observed();
    let n_cens = data.n_censored();

    let mut beta = Array1::<f64>::zeros(p);
    let mut sigma2 = initial_variance(data.y_observed.view());
    let mut latent = match data.cutoff {
        Some(cutoff) => Array1::from_elem(n_cens, cutoff),
        None => Array1::zeros(0),
    };

    let mut out = ChainDraws {
        beta: Array2::zeros((config.draws, p)),
        sigma: Array1::zeros(config.draws),
        latent: Array2::zeros((config.draws, n_cens)),
        log_likelihood: Array2::zeros((config.draws, n_obs)),
    };

    let total = config.tune + config.draws;
    for it in 0..total {
        let sigma = sigma2.sqrt();
        if let Some(cutoff) = data.cutoff {
            let mean = data.x_censored.dot(&beta);
            for (z, &mu) in latent.iter_mut().zip(mean.iter()) {
                *z = sample_truncated_normal(mu, sigma, cutoff, &std_normal, &mut rng);
            }
        }

        beta = draw_coefficients(data, &stats, latent.view(), sigma2, &mut rng)?;
        sigma2 = draw_variance(data, &stats, prior, beta.view(), latent.view(), &mut rng)?;

        if it >= config.tune {
            let d = it - config.tune;
            out.beta.row_mut(d).assign(&beta);
            out.sigma[d] = sigma2.sqrt();
            out.latent.row_mut(d).assign(&latent);
            let fitted = data.x_observed.dot(&beta);
            let norm = -0.5 * (2.0 * PI * sigma2).ln();
            for (ll, (&y, &mu)) in out
                .log_likelihood
                .row_mut(d)
                .iter_mut()
                .zip(data.y_observed.iter().zip(fitted.iter()))
            {
                *ll = norm - (y - mu).powi(2) / (2.0 * sigma2);
            }
        }

        if (it + 1) % PROGRESS_STRIDE == 0 {
            pb.inc(PROGRESS_STRIDE as u64);
        }
    }
    pb.inc((total % PROGRESS_STRIDE) as u64);
    log::debug!("Chain with seed {seed} completed {total} sweeps");
    Ok(out)
}

/// Sample variance of the observed responses, or 1 when it is degenerate.
fn initial_variance(y: ArrayView1<f64>) -> f64 {
    if y.len() < 2 {
        return 1.0;
    }
    let v = y.var(1.0);
    if v.is_finite() && v > 0.0 { v } else { 1.0 }
}

fn draw_coefficients<R: Rng + ?Sized>(
    data: &RegressionData,
    stats: &Precomputed,
    latent: ArrayView1<f64>,
    sigma2: f64,
    rng: &mut R,
) -> Result<Array1<f64>, FitError> {
    let p = data.n_terms();
    let mut precision = &stats.xtx / sigma2;
    for j in 0..p {
        precision[(j, j)] += stats.prior_precision;
    }
    let mut xty = stats.xty_observed.clone();
    if !latent.is_empty() {
        xty += &data.x_censored.t().dot(&latent);
    }
    let chol = precision.cholesky_lower()?;
    let z: Array1<f64> = (0..p).map(|_| StandardNormal.sample(rng)).collect();
    // Q beta = b + L z has mean Q^-1 b and covariance Q^-1.
    let rhs = &xty / sigma2 + chol.lower_mul(z.view())?;
    Ok(chol.solve_vec(rhs.view())?)
}

fn draw_variance<R: Rng + ?Sized>(
    data: &RegressionData,
    stats: &Precomputed,
    prior: &PriorConfig,
    beta: ArrayView1<f64>,
    latent: ArrayView1<f64>,
    rng: &mut R,
) -> Result<f64, FitError> {
    let resid_obs = &data.y_observed - &data.x_observed.dot(&beta);
    let mut ssr = resid_obs.dot(&resid_obs);
    if !latent.is_empty() {
        let resid_cens = &latent - &data.x_censored.dot(&beta);
        ssr += resid_cens.dot(&resid_cens);
    }
    let shape = prior.sigma_shape + 0.5 * stats.n_total;
    let rate = prior.sigma_rate + 0.5 * ssr;
    let gamma = Gamma::new(shape, 1.0 / rate).map_err(|e| FitError::Distribution(e.to_string()))?;
    let precision: f64 = gamma.sample(rng);
    Ok(1.0 / precision)
}

/// Draws from `N(mu, sigma²)` truncated to `[lower, ∞)`.
///
/// Uses the inverse CDF of the upper tail for moderate truncation points and
/// Robert's exponential rejection sampler far in the tail. The result is
/// clamped to `lower` so rounding never leaves the support.
pub fn sample_truncated_normal<R: Rng + ?Sized>(
    mu: f64,
    sigma: f64,
    lower: f64,
    std_normal: &Normal,
    rng: &mut R,
) -> f64 {
    let alpha = (lower - mu) / sigma;
    let z = if alpha > TAIL_REJECTION_THRESHOLD {
        sample_normal_tail(alpha, rng)
    } else {
        let tail = std_normal.sf(alpha);
        let u: f64 = rng.sample(Open01);
        -std_normal.inverse_cdf(u * tail)
    };
    (mu + sigma * z).max(lower)
}

/// Standard normal restricted to `[alpha, ∞)` for large `alpha`.
fn sample_normal_tail<R: Rng + ?Sized>(alpha: f64, rng: &mut R) -> f64 {
    let lambda = 0.5 * (alpha + (alpha * alpha + 4.0).sqrt());
    loop {
        let e: f64 = Exp1.sample(rng);
        let z = alpha + e / lambda;
        let u: f64 = rng.sample(Open01);
        if u <= (-0.5 * (z - lambda).powi(2)).exp() {
            return z;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn quiet(draws: usize, tune: usize, chains: usize, seed: u64) -> SamplerConfig {
        SamplerConfig {
            draws,
            tune,
            chains,
            seed,
            progress: false,
        }
    }

    fn line_data(n: usize) -> RegressionData {
        let x: Vec<f64> = (0..n).map(|i| i as f64 / n as f64 * 4.0 - 2.0).collect();
        let mut design = Array2::<f64>::ones((n, 2));
        for (i, &v) in x.iter().enumerate() {
            design[(i, 1)] = v;
        }
        let y: Array1<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &v)| 1.0 + 2.0 * v + 0.3 * ((i as f64 * 1.7).sin()))
            .collect();
        RegressionData {
            x_observed: design,
            y_observed: y,
            x_censored: Array2::zeros((0, 2)),
            cutoff: None,
        }
    }

    #[test]
    fn truncated_draws_respect_the_bound() {
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for &(mu, lower) in &[(0.0, -3.0), (0.0, 1.5), (-2.0, 5.0), (0.0, 12.0)] {
            for _ in 0..500 {
                let z = sample_truncated_normal(mu, 1.0, lower, &normal, &mut rng);
                assert!(z >= lower, "draw {z} below bound {lower}");
                assert!(z.is_finite());
            }
        }
    }

    #[test]
    fn truncated_mean_matches_inverse_mills_ratio() {
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let n = 40_000;
        let mean: f64 = (0..n)
            .map(|_| sample_truncated_normal(0.0, 1.0, 1.0, &normal, &mut rng))
            .sum::<f64>()
            / n as f64;
        // E[Z | Z > 1] = phi(1) / (1 - Phi(1))
        let expected = (-0.5f64).exp() / (2.0 * PI).sqrt() / normal.sf(1.0);
        assert_abs_diff_eq!(mean, expected, epsilon = 0.02);
    }

    #[test]
    fn far_tail_draws_stay_close_to_the_bound() {
        let mut rng = StdRng::seed_from_u64(9);
        let n = 2000;
        let mean: f64 = (0..n).map(|_| sample_normal_tail(10.0, &mut rng)).sum::<f64>() / n as f64;
        assert!(mean > 10.0 && mean < 10.2, "tail mean {mean}");
    }

    #[test]
    fn recovers_line_coefficients() {
        let data = line_data(200);
        let chains = run_chains(&data, &PriorConfig::default(), &quiet(400, 200, 2, 1), "test").unwrap();
        assert_eq!(chains.len(), 2);
        let beta0: f64 = chains.iter().map(|c| c.beta.column(0).mean().unwrap()).sum::<f64>() / 2.0;
        let beta1: f64 = chains.iter().map(|c| c.beta.column(1).mean().unwrap()).sum::<f64>() / 2.0;
        assert_abs_diff_eq!(beta0, 1.0, epsilon = 0.1);
        assert_abs_diff_eq!(beta1, 2.0, epsilon = 0.1);
        assert!(chains.iter().all(|c| c.sigma.iter().all(|&s| s > 0.0)));
        assert_eq!(chains[0].log_likelihood.dim(), (400, 200));
    }

    #[test]
    fn runs_are_reproducible_from_the_seed() {
        let data = line_data(50);
        let config = quiet(30, 10, 3, 77);
        let a = run_chains(&data, &PriorConfig::default(), &config, "a").unwrap();
        let b = run_chains(&data, &PriorConfig::default(), &config, "b").unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.beta, y.beta);
            assert_eq!(x.sigma, y.sigma);
        }
        assert_ne!(a[0].beta, a[1].beta);
    }

    #[test]
    fn latent_draws_stay_above_cutoff() {
        let mut data = line_data(40);
        data.x_censored = array![[1.0, 2.5], [1.0, 3.0], [1.0, -1.0]];
        data.cutoff = Some(4.0);
        let chains = run_chains(&data, &PriorConfig::default(), &quiet(100, 50, 2, 4), "latent").unwrap();
        for chain in &chains {
            assert_eq!(chain.latent.dim(), (100, 3));
            assert!(chain.latent.iter().all(|&z| z >= 4.0));
        }
    }

    #[test]
    fn zero_chains_are_rejected() {
        let data = line_data(10);
        assert!(matches!(
            run_chains(&data, &PriorConfig::default(), &quiet(10, 0, 0, 1), "none"),
            Err(FitError::InvalidSampler(_))
        ));
    }
}
