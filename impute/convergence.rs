//! Convergence and interval statistics for MCMC draws.
//!
//! - split R-hat and its rank-normalized, folded variant
//! - bulk and tail effective sample size
//! - highest density intervals and interpolated quantiles
//!
//! Every function takes per-chain slices and is independent of how the draws
//! were produced.

use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;

/// Split R-hat for one scalar parameter.
///
/// Each chain is cut in half and the Gelman-Rubin ratio is computed over the
/// half-chains. Returns NaN when a chain has fewer than 4 draws or the
/// within-chain variance vanishes.
pub fn r_hat(chains: &[&[f64]]) -> f64 {
    let halves = match split_chains(chains) {
        Some(h) if h.len() >= 2 => h,
        _ => return f64::NAN,
    };
    let (w, b, n) = within_between(&halves);
    if w < 1e-30 {
        return f64::NAN;
    }
    let var_plus = (n - 1.0) / n * w + b / n;
    (var_plus / w).sqrt()
}

/// Rank-normalized, folded split R-hat: the larger of R-hat on normal scores of
/// the ranks and R-hat on normal scores of `|x - median|`.
pub fn r_hat_rank_folded(chains: &[&[f64]]) -> f64 {
    if chains.is_empty() || chains.iter().any(|c| c.len() < 4) {
        return f64::NAN;
    }
    let ranked = normal_scores(chains);
    let ranked_refs: Vec<&[f64]> = ranked.iter().map(Vec::as_slice).collect();
    let bulk = r_hat(&ranked_refs);

    let median = pooled_quantile(chains, 0.5);
    let folded: Vec<Vec<f64>> = chains
        .iter()
        .map(|c| c.iter().map(|x| (x - median).abs()).collect())
        .collect();
    let folded_refs: Vec<&[f64]> = folded.iter().map(Vec::as_slice).collect();
    let folded_scores = normal_scores(&folded_refs);
    let folded_score_refs: Vec<&[f64]> = folded_scores.iter().map(Vec::as_slice).collect();
    let tail = r_hat(&folded_score_refs);

    if bulk.is_nan() || tail.is_nan() {
        return f64::NAN;
    }
    bulk.max(tail)
}

/// Effective sample size of the draws themselves (no rank normalization).
///
/// Autocorrelations come from the variogram across split chains and are summed
/// with Geyer's initial monotone sequence estimator.
pub fn ess(chains: &[&[f64]]) -> f64 {
    let halves = match split_chains(chains) {
        Some(h) => h,
        None => return 0.0,
    };
    let m = halves.len();
    let n = halves[0].len();
    let total = (m * n) as f64;

    let (w, b, n_f) = within_between(&halves);
    let var_plus = (n_f - 1.0) / n_f * w + b / n_f;
    if !var_plus.is_finite() || var_plus < 1e-30 {
        return total;
    }

    let mut rho = Vec::with_capacity(n);
    for lag in 1..n {
        let mut sum = 0.0;
        let mut count = 0usize;
        for chain in &halves {
            for pair in chain.windows(lag + 1) {
                let d = pair[0] - pair[lag];
                sum += d * d;
                count += 1;
            }
        }
        let variogram = sum / count as f64;
        rho.push((1.0 - variogram / (2.0 * var_plus)).clamp(-1.0, 1.0));
        let k = rho.len();
        if k % 2 == 0 && rho[k - 2] + rho[k - 1] < 0.0 {
            break;
        }
    }

    let mut pair_sums: Vec<f64> = rho
        .chunks_exact(2)
        .map(|p| p[0] + p[1])
        .take_while(|&g| g >= 0.0)
        .collect();
    for k in 1..pair_sums.len() {
        if pair_sums[k] > pair_sums[k - 1] {
            pair_sums[k] = pair_sums[k - 1];
        }
    }
    let tau = 1.0 + 2.0 * pair_sums.iter().sum::<f64>();
    if !tau.is_finite() || tau <= 0.0 {
        return total;
    }
    (total / tau).clamp(1.0, total)
}

/// Bulk ESS: ESS of the rank-normalized draws.
pub fn ess_bulk(chains: &[&[f64]]) -> f64 {
    let scores = normal_scores(chains);
    let refs: Vec<&[f64]> = scores.iter().map(Vec::as_slice).collect();
    ess(&refs)
}

/// Tail ESS: the smaller ESS of the 5% and 95% quantile indicator chains.
pub fn ess_tail(chains: &[&[f64]]) -> f64 {
    if chains.is_empty() {
        return 0.0;
    }
    let q05 = pooled_quantile(chains, 0.05);
    let q95 = pooled_quantile(chains, 0.95);
    let indicator = |pred: &dyn Fn(f64) -> bool| -> Vec<Vec<f64>> {
        chains
            .iter()
            .map(|c| c.iter().map(|&x| if pred(x) { 1.0 } else { 0.0 }).collect())
            .collect()
    };
    let lower = indicator(&|x: f64| x <= q05);
    let upper = indicator(&|x: f64| x >= q95);
    let lower_refs: Vec<&[f64]> = lower.iter().map(Vec::as_slice).collect();
    let upper_refs: Vec<&[f64]> = upper.iter().map(Vec::as_slice).collect();
    ess(&lower_refs).min(ess(&upper_refs))
}

/// Highest density interval: the shortest interval containing
/// `floor(prob * n)` of the sorted draws. Non-finite draws are ignored.
pub fn hdi(samples: &[f64], prob: f64) -> (f64, f64) {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let included = ((prob.clamp(0.0, 1.0) * n as f64).floor() as usize).min(n - 1);
    let candidates = n - included;
    let mut best = 0usize;
    let mut best_width = f64::INFINITY;
    for i in 0..candidates {
        let width = sorted[i + included] - sorted[i];
        if width < best_width {
            best_width = width;
            best = i;
        }
    }
    (sorted[best], sorted[best + included])
}

/// Linear-interpolation quantile of sorted data, `q` in `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn pooled_quantile(chains: &[&[f64]], q: f64) -> f64 {
    let mut all: Vec<f64> = chains.iter().flat_map(|c| c.iter().copied()).collect();
    all.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Greater));
    quantile_sorted(&all, q)
}

fn split_chains<'a>(chains: &[&'a [f64]]) -> Option<Vec<&'a [f64]>> {
    if chains.is_empty() {
        return None;
    }
    let mut halves = Vec::with_capacity(chains.len() * 2);
    for &chain in chains {
        if chain.len() < 4 {
            return None;
        }
        let mid = chain.len() / 2;
        halves.push(&chain[..mid]);
        halves.push(&chain[mid..]);
    }
    let min_len = halves.iter().map(|h| h.len()).min().unwrap_or(0);
    if min_len < 2 {
        return None;
    }
    Some(halves.into_iter().map(|h| &h[..min_len]).collect())
}

/// Returns `(W, B, n)`: mean within-chain variance, between-chain variance
/// scaled by `n`, and the common chain length.
fn within_between(chains: &[&[f64]]) -> (f64, f64, f64) {
    let m = chains.len() as f64;
    let n = chains[0].len() as f64;
    let means: Vec<f64> = chains.iter().map(|c| c.iter().sum::<f64>() / n).collect();
    let grand = means.iter().sum::<f64>() / m;
    let b = if m > 1.0 {
        n / (m - 1.0) * means.iter().map(|mu| (mu - grand).powi(2)).sum::<f64>()
    } else {
        0.0
    };
    let w = chains
        .iter()
        .zip(&means)
        .map(|(c, mu)| c.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / (n - 1.0))
        .sum::<f64>()
        / m;
    (w, b, n)
}

/// Replaces every draw by the standard normal quantile of its fractional rank
/// across all chains, averaging ranks over ties.
fn normal_scores(chains: &[&[f64]]) -> Vec<Vec<f64>> {
    let mut out: Vec<Vec<f64>> = chains.iter().map(|c| vec![0.0; c.len()]).collect();
    let total: usize = chains.iter().map(|c| c.len()).sum();
    if total == 0 {
        return out;
    }
    let std_normal = match Normal::new(0.0, 1.0) {
        Ok(d) => d,
        Err(_) => return out,
    };

    let mut flat: Vec<(f64, usize, usize)> = Vec::with_capacity(total);
    for (ci, chain) in chains.iter().enumerate() {
        for (ti, &x) in chain.iter().enumerate() {
            flat.push((x, ci, ti));
        }
    }
    flat.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Greater));

    let mut i = 0;
    while i < total {
        let mut j = i + 1;
        while j < total && flat[j].0 == flat[i].0 {
            j += 1;
        }
        let rank = 0.5 * ((i + 1) as f64 + j as f64);
        let p = ((rank - 0.375) / (total as f64 + 0.25)).clamp(1e-12, 1.0 - 1e-12);
        let z = std_normal.inverse_cdf(p);
        for &(_, ci, ti) in &flat[i..j] {
            out[ci][ti] = z;
        }
        i = j;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, StandardNormal};

    fn iid_chains(n_chains: usize, n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n_chains)
            .map(|_| (0..n).map(|_| StandardNormal.sample(&mut rng)).collect())
            .collect()
    }

    #[test]
    fn r_hat_near_one_for_mixed_chains() {
        let chains = iid_chains(4, 500, 3);
        let refs: Vec<&[f64]> = chains.iter().map(Vec::as_slice).collect();
        let r = r_hat(&refs);
        assert!((r - 1.0).abs() < 0.02, "r_hat = {r}");
        let rf = r_hat_rank_folded(&refs);
        assert!((rf - 1.0).abs() < 0.02, "rank folded r_hat = {rf}");
    }

    #[test]
    fn r_hat_flags_chains_stuck_in_different_places() {
        let mut chains = iid_chains(2, 400, 5);
        for x in chains[1].iter_mut() {
            *x += 5.0;
        }
        let refs: Vec<&[f64]> = chains.iter().map(Vec::as_slice).collect();
        assert!(r_hat(&refs) > 1.5);
    }

    #[test]
    fn ess_of_independent_draws_is_close_to_total() {
        let chains = iid_chains(4, 500, 9);
        let refs: Vec<&[f64]> = chains.iter().map(Vec::as_slice).collect();
        let e = ess_bulk(&refs);
        assert!(e > 1200.0 && e <= 2000.0, "ess = {e}");
        assert!(ess_tail(&refs) > 500.0);
    }

    #[test]
    fn ess_drops_for_autocorrelated_chains() {
        let mut rng = StdRng::seed_from_u64(21);
        let chains: Vec<Vec<f64>> = (0..4)
            .map(|_| {
                let mut x = 0.0;
                (0..500)
                    .map(|_| {
                        let e: f64 = StandardNormal.sample(&mut rng);
                        x = 0.95 * x + e;
                        x
                    })
                    .collect()
            })
            .collect();
        let refs: Vec<&[f64]> = chains.iter().map(Vec::as_slice).collect();
        assert!(ess(&refs) < 400.0);
    }

    #[test]
    fn too_short_chains_give_nan_r_hat() {
        let a = [1.0, 2.0, 3.0];
        assert!(r_hat(&[&a, &a]).is_nan());
        assert_eq!(ess(&[&a]), 0.0);
    }

    #[test]
    fn hdi_picks_the_shortest_window() {
        let samples = [0.0, 1.0, 1.1, 1.2, 1.3, 10.0];
        assert_eq!(hdi(&samples, 0.5), (1.0, 1.3));
        let (lo, hi) = hdi(&[f64::NAN], 0.94);
        assert!(lo.is_nan() && hi.is_nan());
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&sorted, 0.0), 1.0);
        assert_eq!(quantile_sorted(&sorted, 1.0), 4.0);
        assert!((quantile_sorted(&sorted, 0.5) - 2.5).abs() < 1e-12);
    }
}
