use censorfit::config::AnalysisConfig;
use censorfit::pipeline::run_analysis;

use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(
    name = "censorfit",
    about = "Bayesian imputation of right-censored regression data",
    long_about = "Simulates a linear regression dataset, censors responses at or above a cutoff, \
                 fits a naive model and a latent-variable imputation model with a Gibbs sampler, \
                 and compares their posteriors."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full simulate, censor, fit and compare analysis
    #[command(about = "Run the analysis (outputs: summaries, comparison, plots)")]
    Run(RunArgs),

    /// Write the default configuration to a TOML file
    #[command(about = "Write the default configuration (outputs: config TOML)")]
    InitConfig {
        /// Destination of the configuration file
        path: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML configuration file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seed for both the simulation and the sampler
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Number of simulated rows
    #[arg(long, value_name = "N")]
    samples: Option<usize>,

    /// Responses at or above this value are censored
    #[arg(long, value_name = "X")]
    cutoff: Option<f64>,

    /// Retained draws per chain
    #[arg(long, value_name = "N")]
    draws: Option<usize>,

    /// Warm-up sweeps per chain
    #[arg(long, value_name = "N")]
    tune: Option<usize>,

    /// Number of chains
    #[arg(long, value_name = "N")]
    chains: Option<usize>,

    /// Grid points of the posterior mode estimator
    #[arg(long, value_name = "N")]
    bins: Option<usize>,

    /// Rescale predictors to mean 0 and sd 0.5 before fitting
    #[arg(long)]
    standardize: bool,

    /// Directory for CSV plot data and the resolved configuration
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Disable the sampling progress bar
    #[arg(long)]
    no_progress: bool,
}

impl RunArgs {
    fn resolve(&self) -> Result<AnalysisConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
            config.sampler.seed = seed;
        }
        if let Some(samples) = self.samples {
            config.simulation.n_samples = samples;
        }
        if let Some(cutoff) = self.cutoff {
            config.cutoff = cutoff;
        }
        if let Some(draws) = self.draws {
            config.sampler.draws = draws;
        }
        if let Some(tune) = self.tune {
            config.sampler.tune = tune;
        }
        if let Some(chains) = self.chains {
            config.sampler.chains = chains;
        }
        if let Some(bins) = self.bins {
            config.mode.bins = bins;
        }
        if self.standardize {
            config.standardize = true;
        }
        if let Some(dir) = &self.output_dir {
            config.report.output_dir = Some(dir.clone());
        }
        if self.no_progress {
            config.sampler.progress = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run_command(&args),
        Commands::InitConfig { path } => init_config_command(&path),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let config = args.resolve()?;
    let report = run_analysis(&config)?;
    print!("{}", report.render(config.report.plot_width));

    if let Some(dir) = &config.report.output_dir {
        let written = report.write_outputs(dir, &config)?;
        println!("Wrote {} files to {}", written.len(), dir.display());
    }
    Ok(())
}

fn init_config_command(path: &Path) -> Result<(), Box<dyn Error>> {
    AnalysisConfig::default().save(path)?;
    println!("Default configuration written to {}", path.display());
    Ok(())
}
