//! # Analysis Configuration
//!
//! One TOML document configures a whole run. Every section has defaults, so an
//! empty file is a valid configuration and a partial file only overrides the
//! keys it names.
//!
//! ```toml
//! cutoff = 3.0
//! formula = "y ~ x1 + x2"
//!
//! [simulation]
//! n_samples = 500
//! seed = 42
//!
//! [sampler]
//! draws = 1000
//! chains = 4
//! ```

use crate::diagnostics::{DEFAULT_HDI_PROB, ModeConfig};
use crate::forest::AxisTransform;
use crate::gibbs::SamplerConfig;
use crate::model::{Formula, PriorConfig};
use crate::qq::DEFAULT_QQ_POINTS;
use crate::simulate::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory receiving CSV plot data and the resolved configuration.
    pub output_dir: Option<PathBuf>,
    pub hdi_prob: f64,
    pub qq_points: usize,
    pub forest_transform: AxisTransform,
    /// Character width of the text plots.
    pub plot_width: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            hdi_prob: DEFAULT_HDI_PROB,
            qq_points: DEFAULT_QQ_POINTS,
            forest_transform: AxisTransform::Identity,
            plot_width: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Responses at or above this value are censored.
    pub cutoff: f64,
    pub formula: String,
    /// Rescale the predictors to mean 0 and sd 0.5 before fitting.
    pub standardize: bool,
    pub simulation: SimulationConfig,
    pub sampler: SamplerConfig,
    pub prior: PriorConfig,
    pub mode: ModeConfig,
    pub report: ReportConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cutoff: 3.0,
            formula: Formula::default().to_string(),
            standardize: false,
            simulation: SimulationConfig::default(),
            sampler: SamplerConfig::default(),
            prior: PriorConfig::default(),
            mode: ModeConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Checks the cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cutoff.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "cutoff must be finite, got {}",
                self.cutoff
            )));
        }
        self.parsed_formula()?;
        if !(self.report.hdi_prob > 0.0 && self.report.hdi_prob < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "report.hdi_prob must lie in (0, 1), got {}",
                self.report.hdi_prob
            )));
        }
        if self.report.qq_points < 2 {
            return Err(ConfigError::Invalid(format!(
                "report.qq_points must be at least 2, got {}",
                self.report.qq_points
            )));
        }
        if self.mode.bins < 2 {
            return Err(ConfigError::Invalid(format!(
                "mode.bins must be at least 2, got {}",
                self.mode.bins
            )));
        }
        self.sampler
            .validate()
            .and_then(|_| self.prior.validate())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn parsed_formula(&self) -> Result<Formula, ConfigError> {
        Formula::parse(&self.formula).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::Bandwidth;
    use tempfile::tempdir;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AnalysisConfig = toml::from_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.formula, "y ~ Intercept + x1 + x2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_document_overrides_only_named_keys() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            cutoff = 2.5

            [sampler]
            chains = 2

            [mode]
            bandwidth = "silverman"
            "#,
        )
        .unwrap();
        assert_eq!(config.cutoff, 2.5);
        assert_eq!(config.sampler.chains, 2);
        assert_eq!(config.sampler.draws, 1000);
        assert_eq!(config.mode.bandwidth, Bandwidth::Silverman);
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AnalysisConfig::default();
        config.standardize = true;
        config.report.output_dir = Some(dir.path().join("out"));
        config.mode.bandwidth = Bandwidth::Fixed(0.25);
        config.save(&path).unwrap();
        assert_eq!(AnalysisConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = AnalysisConfig::default();
        config.formula = "no tilde".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AnalysisConfig::default();
        config.report.qq_points = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AnalysisConfig::default();
        config.sampler.chains = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
