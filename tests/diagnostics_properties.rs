use censorfit::censor::split_at_cutoff;
use censorfit::diagnostics::{
    DiagnosticsError, ModeConfig, SummaryOptions, posterior_mode, standardize, summarize,
};
use censorfit::qq::{DEFAULT_QQ_POINTS, qq_data};
use censorfit::simulate::{SimulationConfig, simulate};
use censorfit::trace::{PosteriorTrace, TraceError};

use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

fn normal_draws(mean: f64, sd: f64, n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Normal::new(mean, sd).unwrap();
    (0..n).map(|_| dist.sample(&mut rng)).collect()
}

#[test]
fn standardized_column_has_mean_zero_and_sd_half() {
    let x = Array1::from(normal_draws(3.0, 4.0, 2000, 1));
    let z = standardize(x.view());
    let mean = z.mean().unwrap();
    let sd = z.std(0.0);
    assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(sd, 0.5, epsilon = 1e-12);
}

#[test]
fn mode_of_a_large_normal_sample_is_near_its_center() {
    let draws = normal_draws(5.0, 1.0, 20_000, 7);
    let mode = posterior_mode(&draws, &ModeConfig::default()).unwrap();
    // With Scott's rule the grid argmax wanders up to about 0.25 from the true
    // mode across seeds at 10k draws, so 0.1 only holds for some seeds.
    assert_abs_diff_eq!(mode, 5.0, epsilon = 0.25);
}

#[test]
fn non_finite_values_do_not_move_the_mode() {
    let clean = normal_draws(-2.0, 0.5, 3000, 3);
    let mut dirty = clean.clone();
    dirty.insert(10, f64::NAN);
    dirty.push(f64::INFINITY);
    dirty.insert(0, f64::NEG_INFINITY);
    let config = ModeConfig::default();
    assert_eq!(
        posterior_mode(&clean, &config).unwrap(),
        posterior_mode(&dirty, &config).unwrap()
    );
    assert_eq!(
        posterior_mode(&[f64::NAN, f64::INFINITY], &config).unwrap_err(),
        DiagnosticsError::NoFiniteSamples
    );
}

#[test]
fn summary_has_one_row_per_parameter_with_matching_mode() {
    let a = normal_draws(1.0, 1.0, 800, 10);
    let b = normal_draws(-3.0, 2.0, 800, 11);
    let mut trace = PosteriorTrace::new();
    trace
        .insert_scalar("a", Array2::from_shape_vec((2, 400), a.clone()).unwrap())
        .unwrap();
    trace
        .insert_scalar("b", Array2::from_shape_vec((2, 400), b.clone()).unwrap())
        .unwrap();

    let options = SummaryOptions::default();
    let table = summarize(&trace, &options).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.rows[0].name, "a");
    assert_eq!(table.rows[1].name, "b");
    assert_eq!(table.row("a").unwrap().mode, posterior_mode(&a, &options.mode).unwrap());
    assert_eq!(table.row("b").unwrap().mode, posterior_mode(&b, &options.mode).unwrap());

    let missing = SummaryOptions {
        var_names: Some(vec!["c".to_string()]),
        ..SummaryOptions::default()
    };
    assert_eq!(
        summarize(&trace, &missing).unwrap_err(),
        DiagnosticsError::Trace(TraceError::ParameterNotFound("c".to_string()))
    );
}

#[test]
fn qq_of_one_to_hundred_lies_on_the_diagonal() {
    let x: Vec<f64> = (1..=100).map(f64::from).collect();
    let qq = qq_data(&x, &x, DEFAULT_QQ_POINTS).unwrap();
    assert_eq!(qq.points.len(), 101);
    for p in &qq.points {
        assert_eq!(p.predicted, p.observed);
    }
    assert_eq!(qq.reference, ((1.0, 1.0), (100.0, 100.0)));
}

#[test]
fn qq_reference_spans_both_quantile_sets() {
    let predicted = normal_draws(0.0, 1.0, 300, 4);
    let observed = normal_draws(1.0, 2.0, 150, 5);
    let qq = qq_data(&predicted, &observed, 21).unwrap();
    let lo = qq
        .points
        .iter()
        .flat_map(|p| [p.predicted, p.observed])
        .fold(f64::INFINITY, f64::min);
    let hi = qq
        .points
        .iter()
        .flat_map(|p| [p.predicted, p.observed])
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(qq.reference, ((lo, lo), (hi, hi)));
}

#[test]
fn split_partitions_every_row_exactly_once() {
    let table = simulate(&SimulationConfig::default()).unwrap();
    let split = split_at_cutoff(&table, 3.0).unwrap();
    assert_eq!(split.reconstruct(), (0..table.len()).collect::<Vec<_>>());
    assert!(split.observed().iter().all(|&i| table.y()[i] < 3.0));
    assert!(split.censored().iter().all(|&i| table.y()[i] >= 3.0));
    assert!(split.observed().iter().all(|i| !split.censored().contains(i)));
}

#[test]
fn simulation_is_reproducible_from_its_seed() {
    let config = SimulationConfig {
        n_samples: 64,
        seed: 99,
        ..SimulationConfig::default()
    };
    assert_eq!(simulate(&config).unwrap(), simulate(&config).unwrap());
    let other = SimulationConfig { seed: 100, ..config };
    assert_ne!(simulate(&other).unwrap(), simulate(&config).unwrap());
}
