// ============================================================
// Layer 5 — CmdStan Engine
// ============================================================
// Drives an installed CmdStan toolchain as the posterior
// sampler. One call to sample() does, in order:
//
//   1. check every data slot is bound        (ModelSpec)
//   2. write <work>/<model>/<model>.stan and build it with
//      `make` inside the CmdStan home; skipped when the stamp
//      file <model>.built, written only after a successful
//      build, holds identical program text
//   3. write the bound data as <model>_data.json
//   4. start one child process per chain, all at once, each
//      with its own `id` and the shared seed
//   5. poll the children until they all exit or the timeout
//      expires; on expiry every chain is killed, partial
//      output files are removed and SamplingTimeout returned
//   6. read every chain's CSV and assemble a FitResult
//
// Chain stdout/stderr go to chain_<id>.log next to the output,
// and the tail of that log is attached to a SamplingError when
// a chain exits unsuccessfully.
//
// The sampling algorithm itself (NUTS with adaptation) belongs
// to CmdStan; this module only prepares inputs and reads outputs.
//
// Reference: CmdStan Guide, "MCMC Sampling" command arguments
//            Rust Book §16 (Processes and Threads)
//            std::process documentation

use std::{
    env, fs,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::domain::error::PipelineError;
use crate::domain::fit::FitResult;
use crate::domain::spec::{BoundData, ModelSpec, SamplerConfig};
use crate::domain::traits::PosteriorSampler;
use crate::model::stan_csv::{read_chain, ChainTable};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const LOG_TAIL_LINES: usize = 20;

/// Environment variable naming the CmdStan installation.
pub const CMDSTAN_ENV: &str = "CMDSTAN";

pub struct CmdStanEngine {
    /// CmdStan installation directory (holds its makefile)
    home:     PathBuf,
    /// Root directory for programs, executables, data and outputs
    work_dir: PathBuf,
}

struct ChainProcess {
    id:     usize,
    child:  Child,
    output: PathBuf,
    log:    PathBuf,
    status: Option<ExitStatus>,
}

impl CmdStanEngine {
    pub fn new(home: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            home:     home.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Use `explicit` if given, otherwise the CMDSTAN environment variable.
    pub fn locate(explicit: Option<&str>, work_dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let home = match explicit {
            Some(path) => PathBuf::from(path),
            None => env::var_os(CMDSTAN_ENV).map(PathBuf::from).ok_or_else(|| {
                PipelineError::InvalidConfig(format!(
                    "no CmdStan installation given; pass --cmdstan or set {CMDSTAN_ENV}"
                ))
            })?,
        };
        Ok(Self::new(home, work_dir))
    }

    fn model_dir(&self, spec: &ModelSpec) -> PathBuf {
        self.work_dir.join(&spec.name)
    }

    fn executable_path(&self, spec: &ModelSpec) -> PathBuf {
        self.model_dir(spec)
            .join(format!("{}{}", spec.name, env::consts::EXE_SUFFIX))
    }

    /// Program text of the last successful build.
    fn stamp_path(&self, spec: &ModelSpec) -> PathBuf {
        self.model_dir(spec).join(format!("{}.built", spec.name))
    }

    /// Build the model executable, reusing a cached build when the
    /// program text is unchanged.
    pub fn compile(&self, spec: &ModelSpec) -> Result<PathBuf, PipelineError> {
        let model_dir = self.model_dir(spec);
        fs::create_dir_all(&model_dir)?;

        let stan_path  = model_dir.join(format!("{}.stan", spec.name));
        let stamp_path = self.stamp_path(spec);
        let exe        = std::path::absolute(self.executable_path(spec))?;

        let cached = exe.exists()
            && fs::read_to_string(&stamp_path)
                .map(|text| text == spec.program)
                .unwrap_or(false);
        if cached {
            tracing::debug!("Reusing compiled model {}", exe.display());
            return Ok(exe);
        }

        if stamp_path.exists() {
            fs::remove_file(&stamp_path)?;
        }
        fs::write(&stan_path, &spec.program)?;
        tracing::info!("Compiling model '{}' with CmdStan at {}", spec.name, self.home.display());

        let output = Command::new("make")
            .arg(&exe)
            .current_dir(&self.home)
            .output()
            .map_err(|e| {
                PipelineError::compile(
                    &spec.name,
                    format!("cannot run make in '{}': {e}", self.home.display()),
                )
            })?;

        if !output.status.success() {
            let mut message = tail(&String::from_utf8_lossy(&output.stderr), LOG_TAIL_LINES);
            if message.trim().is_empty() {
                message = tail(&String::from_utf8_lossy(&output.stdout), LOG_TAIL_LINES);
            }
            // A stale executable must not be mistaken for this program
            let _ = fs::remove_file(&exe);
            return Err(PipelineError::compile(&spec.name, message));
        }

        fs::write(&stamp_path, &spec.program)?;
        Ok(exe)
    }

    fn write_data(&self, spec: &ModelSpec, data: &BoundData) -> Result<PathBuf, PipelineError> {
        let path = self.model_dir(spec).join(format!("{}_data.json", spec.name));
        fs::write(&path, serde_json::to_string(data)?)?;
        tracing::debug!("Wrote bound data to {}", path.display());
        Ok(path)
    }

    /// Command-line arguments for one chain, in CmdStan's argument
    /// tree order.
    pub fn chain_args(
        &self,
        chain:  usize,
        data:   &Path,
        output: &Path,
        config: &SamplerConfig,
    ) -> Vec<String> {
        vec![
            format!("id={chain}"),
            "random".to_string(),
            format!("seed={}", config.seed),
            "data".to_string(),
            format!("file={}", data.display()),
            "output".to_string(),
            format!("file={}", output.display()),
            "method=sample".to_string(),
            format!("num_samples={}", config.num_samples()),
            format!("num_warmup={}", config.num_warmup()),
            "algorithm=hmc".to_string(),
            "engine=nuts".to_string(),
            format!("max_depth={}", config.max_depth),
            format!("stepsize={}", config.step_size),
            "adapt".to_string(),
            format!("delta={}", config.adapt_delta),
        ]
    }

    fn spawn_chains(
        &self,
        spec:   &ModelSpec,
        exe:    &Path,
        data:   &Path,
        config: &SamplerConfig,
    ) -> Result<Vec<ChainProcess>, PipelineError> {
        let model_dir = self.model_dir(spec);
        let mut running: Vec<ChainProcess> = Vec::with_capacity(config.chains);

        for id in 1..=config.chains {
            let output = model_dir.join(format!("output_{id}.csv"));
            let log    = model_dir.join(format!("chain_{id}.log"));

            let spawned = fs::File::create(&log).and_then(|log_file| {
                let stderr = log_file.try_clone()?;
                Command::new(exe)
                    .args(self.chain_args(id, data, &output, config))
                    .stdin(Stdio::null())
                    .stdout(Stdio::from(log_file))
                    .stderr(Stdio::from(stderr))
                    .spawn()
            });

            match spawned {
                Ok(child) => running.push(ChainProcess { id, child, output, log, status: None }),
                Err(e) => {
                    abort(&mut running);
                    return Err(PipelineError::sampling(
                        &spec.name,
                        format!("cannot start chain {id}: {e}"),
                    ));
                }
            }
        }

        tracing::info!("Started {} chains for model '{}'", running.len(), spec.name);
        Ok(running)
    }

    fn wait_for_chains(
        &self,
        spec:    &ModelSpec,
        running: &mut [ChainProcess],
        config:  &SamplerConfig,
    ) -> Result<(), PipelineError> {
        let limit    = config.timeout_secs.map(Duration::from_secs);
        let deadline = limit.map(|l| Instant::now() + l);

        loop {
            let mut poll_error = None;
            for chain in running.iter_mut().filter(|c| c.status.is_none()) {
                match chain.child.try_wait() {
                    Ok(status) => chain.status = status,
                    Err(e) => {
                        poll_error = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = poll_error {
                abort(running);
                return Err(e.into());
            }

            if running.iter().all(|c| c.status.is_some()) {
                break;
            }

            if let (Some(deadline), Some(limit)) = (deadline, limit) {
                if Instant::now() >= deadline {
                    tracing::warn!("Model '{}' hit the {}s timeout; killing chains", spec.name, limit.as_secs());
                    abort(running);
                    return Err(PipelineError::SamplingTimeout {
                        model: spec.name.clone(),
                        limit,
                    });
                }
            }

            thread::sleep(POLL_INTERVAL);
        }

        for chain in running.iter() {
            let Some(status) = chain.status else { continue };
            if !status.success() {
                let log = fs::read_to_string(&chain.log).unwrap_or_default();
                return Err(PipelineError::sampling(
                    &spec.name,
                    format!("chain {} exited with {status}:\n{}", chain.id, tail(&log, LOG_TAIL_LINES)),
                ));
            }
        }
        Ok(())
    }

    fn collect(
        &self,
        spec:    &ModelSpec,
        running: &[ChainProcess],
        config:  &SamplerConfig,
    ) -> Result<FitResult, PipelineError> {
        let tables = running
            .iter()
            .map(|chain| read_chain(&chain.output, &spec.name))
            .collect::<Result<Vec<ChainTable>, _>>()?;

        let columns  = tables[0].columns.clone();
        let expected = config.num_samples();

        for (chain, table) in running.iter().zip(&tables) {
            if table.columns != columns {
                return Err(PipelineError::sampling(
                    &spec.name,
                    format!("chain {} reported different columns", chain.id),
                ));
            }
            if table.rows.len() != expected {
                return Err(PipelineError::sampling(
                    &spec.name,
                    format!("chain {} wrote {} draws, expected {expected}", chain.id, table.rows.len()),
                ));
            }
        }

        let chains: Vec<Vec<Vec<f64>>> = tables.into_iter().map(|t| t.rows).collect();
        FitResult::from_chains(&spec.name, &columns, &chains)
    }
}

impl PosteriorSampler for CmdStanEngine {
    fn sample(
        &self,
        spec:   &ModelSpec,
        data:   &BoundData,
        config: &SamplerConfig,
    ) -> Result<FitResult, PipelineError> {
        config.validate()?;
        spec.check_bound(data)?;

        let exe       = self.compile(spec)?;
        let data_path = self.write_data(spec, data)?;

        let started     = Instant::now();
        let mut running = self.spawn_chains(spec, &exe, &data_path, config)?;
        self.wait_for_chains(spec, &mut running, config)?;
        tracing::info!(
            "Model '{}' sampled {} × {} draws in {:.1}s",
            spec.name,
            config.chains,
            config.num_samples(),
            started.elapsed().as_secs_f64()
        );

        let fit = self.collect(spec, &running, config)?;

        let divergences = fit.divergences();
        if divergences > 0 {
            tracing::warn!(
                "Model '{}' had {} divergent transitions; consider a higher adapt_delta",
                spec.name,
                divergences
            );
        }
        Ok(fit)
    }
}

/// Kill every still-running chain and delete partial outputs.
fn abort(running: &mut [ChainProcess]) {
    for chain in running.iter_mut() {
        if chain.status.is_none() {
            let _ = chain.child.kill();
            let _ = chain.child.wait();
        }
        let _ = fs::remove_file(&chain.output);
    }
}

/// Last `n` lines of `text`.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::linear::LinearRegression;
    use crate::model::tests::toy_inputs;
    use crate::model::RegressionModel;

    #[test]
    fn test_chain_args_follow_config() {
        let engine = CmdStanEngine::new("/opt/cmdstan", "/tmp/work");
        let config = SamplerConfig {
            iterations:  1500,
            warmup:      Some(500),
            adapt_delta: 0.95,
            max_depth:   12,
            seed:        7,
            ..Default::default()
        };

        let args = engine.chain_args(3, Path::new("d.json"), Path::new("o.csv"), &config);

        assert_eq!(args[0], "id=3");
        assert!(args.contains(&"seed=7".to_string()));
        assert!(args.contains(&"num_samples=1000".to_string()));
        assert!(args.contains(&"num_warmup=500".to_string()));
        assert!(args.contains(&"max_depth=12".to_string()));
        assert!(args.contains(&"delta=0.95".to_string()));
        assert!(args.contains(&"file=d.json".to_string()));
        assert!(args.contains(&"file=o.csv".to_string()));
    }

    #[test]
    fn test_unbound_data_fails_before_compiling() {
        let work   = tempfile::tempdir().expect("temp dir");
        let engine = CmdStanEngine::new("/no/cmdstan/here", work.path());
        let spec   = LinearRegression.spec();

        let err = engine
            .sample(&spec, &BoundData::new(), &SamplerConfig::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Compile { .. }));
        assert!(!work.path().join("linear").exists());
    }

    #[test]
    fn test_missing_cmdstan_home_is_compile_error() {
        let work   = tempfile::tempdir().expect("temp dir");
        let engine = CmdStanEngine::new("/no/cmdstan/here", work.path());
        let model  = LinearRegression;
        let data   = model.bind(&toy_inputs()).unwrap();

        let err = engine
            .sample(&model.spec(), &data, &SamplerConfig::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Compile { .. }));
    }

    #[test]
    fn test_invalid_config_rejected_first() {
        let work   = tempfile::tempdir().expect("temp dir");
        let engine = CmdStanEngine::new("/no/cmdstan/here", work.path());
        let config = SamplerConfig { chains: 0, ..Default::default() };

        let err = engine
            .sample(&LinearRegression.spec(), &BoundData::new(), &config)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    /// Put a shell script where the compiled model would be and mark
    /// it as built from `spec.program`, so `compile` reuses it.
    #[cfg(unix)]
    fn install_script(engine: &CmdStanEngine, spec: &ModelSpec, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        fs::create_dir_all(engine.model_dir(spec)).expect("model dir");
        fs::write(engine.stamp_path(spec), &spec.program).expect("stamp");

        let exe = engine.executable_path(spec);
        let script = format!(
            "#!/bin/sh\nout=''\nprev=''\nfor a in \"$@\"; do\n  \
             if [ \"$prev\" = output ]; then out=\"${{a#file=}}\"; fi\n  prev=\"$a\"\ndone\n{body}\n"
        );
        fs::write(&exe, script).expect("script");
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    fn short_run(chains: usize) -> SamplerConfig {
        SamplerConfig {
            chains,
            iterations: 10,
            warmup:     Some(5),
            ..Default::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_chains_are_read_into_fit() {
        let work   = tempfile::tempdir().expect("temp dir");
        let engine = CmdStanEngine::new("/no/cmdstan/here", work.path());
        let model  = LinearRegression;
        let spec   = model.spec();
        install_script(
            &engine,
            &spec,
            "{ echo '# model = linear'\n  echo 'lp__,accept_stat__,divergent__,alpha,sigma'\n  \
             for i in 1 2 3 4 5; do echo \"-$i,0.9,0,1.$i,0.5\"; done\n  \
             echo '# Elapsed Time: 0.1 seconds'\n} > \"$out\"",
        );

        let data = model.bind(&toy_inputs()).unwrap();
        let fit  = engine.sample(&spec, &data, &short_run(2)).unwrap();

        assert_eq!(fit.num_chains(), 2);
        assert_eq!(fit.num_draws(), 5);
        assert_eq!(fit.divergences(), 0);
        assert!((fit.mean("alpha").unwrap() - 1.3).abs() < 1e-12);
        assert!(work.path().join("linear/linear_data.json").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_chain_is_sampling_error_with_log() {
        let work   = tempfile::tempdir().expect("temp dir");
        let engine = CmdStanEngine::new("/no/cmdstan/here", work.path());
        let model  = LinearRegression;
        let spec   = model.spec();
        install_script(&engine, &spec, "echo 'Rejecting initial value' >&2\nexit 1");

        let data = model.bind(&toy_inputs()).unwrap();
        let err  = engine.sample(&spec, &data, &short_run(2)).unwrap_err();

        match err {
            PipelineError::Sampling { message, .. } => {
                assert!(message.contains("Rejecting initial value"), "{message}");
            }
            other => panic!("expected a sampling error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_chains_and_removes_output() {
        let work   = tempfile::tempdir().expect("temp dir");
        let engine = CmdStanEngine::new("/no/cmdstan/here", work.path());
        let model  = LinearRegression;
        let spec   = model.spec();
        install_script(&engine, &spec, "echo 'lp__' > \"$out\"\nexec sleep 30");

        let data   = model.bind(&toy_inputs()).unwrap();
        let config = SamplerConfig { timeout_secs: Some(1), ..short_run(1) };

        let started = Instant::now();
        let err     = engine.sample(&spec, &data, &config).unwrap_err();

        assert!(matches!(err, PipelineError::SamplingTimeout { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!work.path().join("linear/output_1.csv").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_build_is_not_reused() {
        let work   = tempfile::tempdir().expect("temp dir");
        let engine = CmdStanEngine::new("/no/cmdstan/here", work.path());
        let spec   = LinearRegression.spec();
        install_script(&engine, &spec, "exit 0");
        assert!(engine.compile(&spec).is_ok());

        let mut edited = spec.clone();
        edited.program.push_str("\n// edited\n");
        assert!(matches!(engine.compile(&edited), Err(PipelineError::Compile { .. })));
        assert!(!engine.stamp_path(&spec).exists());

        // The old executable is still on disk but no longer trusted
        assert!(engine.executable_path(&spec).exists());
        assert!(matches!(engine.compile(&spec), Err(PipelineError::Compile { .. })));
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let engine = CmdStanEngine::locate(Some("/opt/cmdstan-2.36"), "runs").unwrap();
        assert_eq!(engine.home, PathBuf::from("/opt/cmdstan-2.36"));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("only", 5), "only");
    }
}
