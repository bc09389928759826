// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands `fit`, `report` and `inspect`
// and all their configurable flags.
//
// Every flag is optional: a value given on the command line
// overrides the one from --config, which overrides the defaults
// of PipelineConfig.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};

use crate::application::fit_use_case::PipelineConfig;
use crate::model::ModelFamily;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load, split, sample and evaluate one or both model families
    Fit(FitArgs),

    /// Print diagnostics for a saved fit and re-render its plots
    Report(ReportArgs),

    /// Load the dataset and print per-column summaries
    Inspect(InspectArgs),
}

/// Which model families to run
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelChoice {
    Linear,
    Gp,
    All,
}

impl ModelChoice {
    pub fn families(self) -> Vec<ModelFamily> {
        match self {
            ModelChoice::Linear => vec![ModelFamily::Linear],
            ModelChoice::Gp     => vec![ModelFamily::GaussianProcess],
            ModelChoice::All    => ModelFamily::ALL.to_vec(),
        }
    }
}

/// Data and output flags shared by every command.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// JSON file with a full or partial PipelineConfig
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dataset URL or file path
    #[arg(long)]
    pub source: Option<String>,

    /// Fraction of records used for training, in (0, 1)
    #[arg(long)]
    pub train_fraction: Option<f64>,

    /// Seed for the train/test shuffle
    #[arg(long)]
    pub split_seed: Option<u64>,

    /// Directory for fits, metrics and plots
    #[arg(long)]
    pub output_dir: Option<String>,
}

impl ConfigArgs {
    /// Defaults, then the --config file, then the individual flags.
    pub fn resolve(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(v) = &self.source {
            cfg.data.source = v.clone();
        }
        if let Some(v) = self.train_fraction {
            cfg.data.train_fraction = v;
        }
        if let Some(v) = self.split_seed {
            cfg.data.split_seed = Some(v);
        }
        if let Some(v) = &self.output_dir {
            cfg.output_dir = v.clone();
        }
        Ok(cfg)
    }
}

/// All arguments for the `fit` command.
#[derive(Args, Debug)]
pub struct FitArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Model family to fit
    #[arg(long, value_enum, default_value_t = ModelChoice::All)]
    pub model: ModelChoice,

    /// CmdStan installation directory (defaults to $CMDSTAN)
    #[arg(long)]
    pub cmdstan: Option<String>,

    /// Number of Markov chains, run in parallel
    #[arg(long)]
    pub chains: Option<usize>,

    /// Iterations per chain, warm-up included
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Warm-up iterations per chain (default: half of --iterations)
    #[arg(long)]
    pub warmup: Option<usize>,

    /// Target acceptance rate for step-size adaptation
    #[arg(long)]
    pub adapt_delta: Option<f64>,

    /// Initial integrator step size
    #[arg(long)]
    pub step_size: Option<f64>,

    /// Maximum NUTS tree depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Sampler seed shared by all chains
    #[arg(long)]
    pub seed: Option<u64>,

    /// Abort sampling after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Diagonal jitter added to the GP covariance
    #[arg(long)]
    pub gp_jitter: Option<f64>,

    /// Skip SVG rendering
    #[arg(long)]
    pub no_plots: bool,
}

/// Convert CLI FitArgs into the application-layer PipelineConfig.
/// The application layer never sees clap types.
impl TryFrom<&FitArgs> for PipelineConfig {
    type Error = anyhow::Error;

    fn try_from(a: &FitArgs) -> Result<Self> {
        let mut cfg = a.common.resolve()?;
        let s = &mut cfg.sampler;

        if let Some(v) = a.chains       { s.chains = v; }
        if let Some(v) = a.iterations   { s.iterations = v; }
        if let Some(v) = a.warmup       { s.warmup = Some(v); }
        if let Some(v) = a.adapt_delta  { s.adapt_delta = v; }
        if let Some(v) = a.step_size    { s.step_size = v; }
        if let Some(v) = a.max_depth    { s.max_depth = v; }
        if let Some(v) = a.seed         { s.seed = v; }
        if let Some(v) = a.timeout_secs { s.timeout_secs = Some(v); }

        if let Some(v) = a.gp_jitter {
            cfg.gp_jitter = v;
        }
        if let Some(v) = &a.cmdstan {
            cfg.cmdstan_home = Some(v.clone());
        }
        if a.no_plots {
            cfg.render_plots = false;
        }
        Ok(cfg)
    }
}

/// All arguments for the `report` command
#[derive(Args, Debug)]
pub struct ReportArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Model family whose saved fit to report on
    #[arg(long, value_enum, default_value_t = ModelChoice::All)]
    pub model: ModelChoice,

    /// Skip SVG rendering
    #[arg(long)]
    pub no_plots: bool,
}

/// All arguments for the `inspect` command
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub common: ConfigArgs,
}
