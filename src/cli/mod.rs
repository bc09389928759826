// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `fit`     — sample one or both model families and
//                  compare them with the OLS baseline
//   2. `report`  — diagnostics and plots for a saved fit
//   3. `inspect` — column summaries of the dataset
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use std::path::Path;

use anyhow::{bail, Result};
use clap::Parser;
use commands::{Commands, FitArgs, InspectArgs, ReportArgs};

use crate::application::fit_use_case::PipelineConfig;
use crate::model::engine::CmdStanEngine;

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "bayes-mpg",
    version = "0.1.0",
    about = "Bayesian linear and Gaussian-process regression of fuel economy with CmdStan."
)]
pub struct Cli {
    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Fit(args)     => run_fit(args),
            Commands::Report(args)  => run_report(args),
            Commands::Inspect(args) => run_inspect(args),
        }
    }
}

/// Handles the `fit` subcommand.
/// Exits with an error if any requested family failed.
fn run_fit(args: FitArgs) -> Result<()> {
    use crate::application::fit_use_case::FitUseCase;

    let cfg      = PipelineConfig::try_from(&args)?;
    let work_dir = Path::new(&cfg.output_dir).join("stan");
    let engine   = CmdStanEngine::locate(cfg.cmdstan_home.as_deref(), work_dir)?;

    let use_case = FitUseCase::new(cfg, engine);
    let runs     = use_case.execute(&args.model.families())?;

    println!(
        "\n{:<8} {:>7} {:>7} {:>9} {:>9} {:>9} {:>9} {:>6}",
        "model", "train", "test", "rmse", "mae", "ols_rmse", "ols_mae", "div"
    );
    for run in &runs {
        match &run.outcome {
            Ok(eval) => {
                let r = &eval.record;
                println!(
                    "{:<8} {:>7} {:>7} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>6}",
                    r.model, r.n_train, r.n_test, r.bayes.rmse, r.bayes.mae,
                    r.ols.rmse, r.ols.mae, r.divergences
                );
                for w in &eval.warnings {
                    println!("         warning: {w}");
                }
                println!("         fit: {}", eval.fit_path.display());
                for plot in &eval.plots {
                    println!("         plot: {}", plot.display());
                }
            }
            Err(e) => println!("{:<8} FAILED: {e:#}", run.family.name()),
        }
    }

    let failed = runs.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 {
        bail!("{failed} of {} model families failed", runs.len());
    }
    Ok(())
}

/// Handles the `report` subcommand.
fn run_report(args: ReportArgs) -> Result<()> {
    use crate::application::report_use_case::ReportUseCase;

    let cfg      = args.common.resolve()?;
    let use_case = ReportUseCase::new(&cfg.output_dir)?;

    for family in args.model.families() {
        let report = use_case.execute(family.name(), !args.no_plots)?;
        println!("\n{}", report.to_table());
    }
    Ok(())
}

/// Handles the `inspect` subcommand.
fn run_inspect(args: InspectArgs) -> Result<()> {
    use crate::application::inspect_use_case::InspectUseCase;

    let cfg     = args.common.resolve()?;
    let summary = InspectUseCase::new(cfg.data).execute()?;
    println!("{}", summary.to_table());
    Ok(())
}
