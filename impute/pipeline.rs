//! # Analysis Pipeline
//!
//! Simulate, censor, fit both models, then summarize, compare and build the
//! plot data. Each stage consumes the plain data of the previous one; there is
//! no feedback between stages.

use crate::censor::{CensorError, CensoredSplit, split_at_cutoff};
use crate::compare::{CompareError, ComparisonTable, compare};
use crate::config::{AnalysisConfig, ConfigError};
use crate::diagnostics::{DiagnosticsError, SummaryOptions, SummaryTable, standardize, summarize};
use crate::forest::{ForestData, forest_data};
use crate::model::{FitError, FittedModel, Formula, ModelKind, SIGMA, fit};
use crate::qq::{QqData, QqError, qq_data};
use crate::report::{self, ReportError};
use crate::simulate::{ObservationTable, SimulationError, simulate};
use crate::trace::TraceError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Offset between the sampler seed and the posterior predictive RNG seed.
const PREDICTIVE_SEED_OFFSET: u64 = 7919;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Simulation failed: {0}")]
    Simulation(#[from] SimulationError),
    #[error("Censoring failed: {0}")]
    Censor(#[from] CensorError),
    #[error("Model fitting failed: {0}")]
    Fit(#[from] FitError),
    #[error("Diagnostics failed: {0}")]
    Diagnostics(#[from] DiagnosticsError),
    #[error("Posterior trace error: {0}")]
    Trace(#[from] TraceError),
    #[error("Model comparison failed: {0}")]
    Compare(#[from] CompareError),
    #[error("Quantile-quantile computation failed: {0}")]
    Qq(#[from] QqError),
    #[error("Report output failed: {0}")]
    Report(#[from] ReportError),
    #[error("Failed to create output directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything derived from one fitted model.
#[derive(Debug, Clone)]
pub struct ModelReport {
    pub model: FittedModel,
    pub summary: SummaryTable,
    pub forest: ForestData,
    pub qq: QqData,
}

impl ModelReport {
    pub fn kind(&self) -> ModelKind {
        self.model.kind
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub table: ObservationTable,
    pub split: CensoredSplit,
    pub naive: ModelReport,
    pub imputed: ModelReport,
    pub comparison: ComparisonTable,
}

impl AnalysisReport {
    pub fn models(&self) -> [&ModelReport; 2] {
        [&self.naive, &self.imputed]
    }

    /// Text rendering of every table and plot.
    pub fn render(&self, width: usize) -> String {
        let mut out = format!(
            "{} rows simulated; {} observed, {} censored at cutoff {:.3} ({:.1}% censored)\n\n",
            self.table.len(),
            self.split.n_observed(),
            self.split.n_censored(),
            self.split.cutoff(),
            100.0 * self.split.censored_fraction()
        );
        for m in self.models() {
            let kind = m.kind();
            out.push_str(&report::render_summary(
                &format!("Posterior summary ({kind} model: {})", m.model.formula),
                &m.summary,
            ));
            out.push('\n');
        }
        out.push_str(&report::render_comparison(&self.comparison));
        out.push('\n');
        for m in self.models() {
            out.push_str(&report::render_forest(
                &format!("Coefficients ({} model)", m.kind()),
                &m.forest,
                width,
            ));
            out.push('\n');
        }
        for m in self.models() {
            out.push_str(&report::render_qq(
                &format!("Posterior predictive QQ ({} model)", m.kind()),
                &m.qq,
                width,
            ));
            out.push('\n');
        }
        out
    }

    /// Writes CSV plot data and the resolved configuration into `dir`.
    pub fn write_outputs(&self, dir: &Path, config: &AnalysisConfig) -> Result<Vec<PathBuf>, PipelineError> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for m in self.models() {
            let kind = m.kind();
            let path = dir.join(format!("summary_{kind}.csv"));
            report::write_summary_csv(&path, &m.summary)?;
            written.push(path);
            let path = dir.join(format!("forest_{kind}.csv"));
            report::write_forest_csv(&path, &m.forest)?;
            written.push(path);
            let path = dir.join(format!("qq_{kind}.csv"));
            report::write_qq_csv(&path, &m.qq)?;
            written.push(path);
        }
        let path = dir.join("comparison.csv");
        report::write_comparison_csv(&path, &self.comparison)?;
        written.push(path);
        let path = dir.join("observations.csv");
        report::write_observations_csv(&path, &self.table, &self.split)?;
        written.push(path);
        let path = dir.join("config.toml");
        config.save(&path)?;
        written.push(path);
        log::info!("Wrote {} files to {}", written.len(), dir.display());
        Ok(written)
    }
}

/// Runs the whole analysis described by `config`.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisReport, PipelineError> {
    config.validate()?;
    let formula = config.parsed_formula()?;

    log::info!(
        "Simulating {} rows (seed {})",
        config.simulation.n_samples,
        config.simulation.seed
    );
    let table = simulate(&config.simulation)?;
    let split = split_at_cutoff(&table, config.cutoff)?;

    let fit_table = if config.standardize {
        log::info!("Standardizing predictors to mean 0 and sd 0.5");
        table.with_predictors(standardize(table.x1()), standardize(table.x2()))
    } else {
        table.clone()
    };

    let naive = fit(
        ModelKind::Naive,
        &formula,
        &fit_table,
        &split,
        &config.prior,
        &config.sampler,
    )?;
    let imputed = fit(
        ModelKind::Imputed,
        &formula,
        &fit_table,
        &split,
        &config.prior,
        &config.sampler,
    )?;

    log::info!("Comparing models by WAIC");
    let comparison = compare(&[&naive, &imputed])?;

    let naive = build_model_report(naive, &formula, &fit_table, config)?;
    let imputed = build_model_report(imputed, &formula, &fit_table, config)?;

    Ok(AnalysisReport {
        table,
        split,
        naive,
        imputed,
        comparison,
    })
}

fn build_model_report(
    model: FittedModel,
    formula: &Formula,
    table: &ObservationTable,
    config: &AnalysisConfig,
) -> Result<ModelReport, PipelineError> {
    log::info!("Summarizing the {} model", model.kind);
    let mut var_names = formula.terms.clone();
    var_names.push(SIGMA.to_string());
    let summary = summarize(
        &model.trace,
        &SummaryOptions {
            var_names: Some(var_names),
            hdi_prob: config.report.hdi_prob,
            mode: config.mode,
        },
    )?;
    let forest = forest_data(&model, config.report.forest_transform)?;

    let rows: Vec<usize> = (0..table.len()).collect();
    let design = formula.design_matrix(table, &rows)?;
    let mut rng = StdRng::seed_from_u64(config.sampler.seed.wrapping_add(PREDICTIVE_SEED_OFFSET));
    let replicated = model.posterior_predictive(design.view(), &mut rng)?;
    // Pooled replicated responses keep the residual noise of every draw.
    let predicted: Vec<f64> = replicated.iter().copied().collect();
    let qq = qq_data(&predicted, &table.y().to_vec(), config.report.qq_points)?;
    log::debug!(
        "Predictive check for the {} model uses {} replicated draws",
        model.kind,
        replicated.nrows()
    );

    Ok(ModelReport {
        model,
        summary,
        forest,
        qq,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.simulation.n_samples = 120;
        config.sampler.draws = 150;
        config.sampler.tune = 100;
        config.sampler.chains = 2;
        config.sampler.progress = false;
        config.mode.bins = 100;
        config
    }

    #[test]
    fn run_produces_both_models_and_a_comparison() {
        let report = run_analysis(&quick_config()).unwrap();
        assert_eq!(
            report.split.n_observed() + report.split.n_censored(),
            report.table.len()
        );
        assert_eq!(report.comparison.rows.len(), 2);
        for m in report.models() {
            assert_eq!(m.summary.len(), 4);
            assert!(m.summary.row("sigma").is_some());
            assert_eq!(m.forest.rows.len(), 3);
            assert_eq!(m.qq.points.len(), 101);
        }
        let text = report.render(40);
        assert!(text.contains("Model comparison"));
        assert!(text.contains("no effect"));
    }

    #[test]
    fn predictive_spread_matches_an_uncensored_fit() {
        let mut config = quick_config();
        config.simulation.n_samples = 400;
        let table = simulate(&config.simulation).unwrap();
        let split = split_at_cutoff(&table, f64::MAX).unwrap();
        assert_eq!(split.n_censored(), 0);
        let formula = config.parsed_formula().unwrap();
        let model = fit(
            ModelKind::Naive,
            &formula,
            &table,
            &split,
            &config.prior,
            &config.sampler,
        )
        .unwrap();
        let report = build_model_report(model, &formula, &table, &config).unwrap();

        let points = &report.qq.points;
        assert_eq!(points[25].level, 25.0);
        assert_eq!(points[75].level, 75.0);
        let predicted_iqr = points[75].predicted - points[25].predicted;
        let observed_iqr = points[75].observed - points[25].observed;
        let ratio = predicted_iqr / observed_iqr;
        assert!((0.85..1.15).contains(&ratio), "IQR ratio {ratio}");
    }

    #[test]
    fn comparison_names_each_model_kind() {
        let report = run_analysis(&quick_config()).unwrap();
        let naive = report.comparison.row_for_kind(ModelKind::Naive).unwrap();
        let imputed = report.comparison.row_for_kind(ModelKind::Imputed).unwrap();
        assert_ne!(naive.rank, imputed.rank);

        let text = report::render_comparison(&report.comparison);
        let lines_for = |kind: ModelKind| {
            text.lines()
                .filter(|l| l.starts_with(kind.label()))
                .count()
        };
        assert_eq!(lines_for(ModelKind::Naive), 1);
        assert_eq!(lines_for(ModelKind::Imputed), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comparison.csv");
        report::write_comparison_csv(&path, &report.comparison).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let kinds: Vec<&str> = content
            .lines()
            .skip(1)
            .filter_map(|l| l.split(',').next())
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&"naive"));
        assert!(kinds.contains(&"imputed"));
    }

    #[test]
    fn invalid_config_is_rejected_before_sampling() {
        let mut config = quick_config();
        config.cutoff = f64::NAN;
        assert!(matches!(run_analysis(&config), Err(PipelineError::Config(_))));
    }
}
