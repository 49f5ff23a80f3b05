//! Running provider acceptance tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use magician_core::config::redact_env;
use magician_core::{merge_phase_runs, PhaseRun, ProviderVersion, TestRunMode, VcrConfig};

use crate::error::RunnerError;
use crate::exec::{execute, CommandOutput, CommandSpec};
use crate::invocation::{package_run, single_test_run};
use crate::parse::{parse_test_output, unexplained_exit};

/// What to run in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub mode: TestRunMode,
    pub version: ProviderVersion,
    pub cassette_dir: PathBuf,
    /// Packages to test; empty means every package in the repository.
    pub test_dirs: Vec<String>,
    /// Test names for [`TestRunner::run_parallel`].
    pub tests: Vec<String>,
}

impl RunOptions {
    pub fn new(mode: TestRunMode, version: ProviderVersion, cassette_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            version,
            cassette_dir: cassette_dir.into(),
            test_dirs: Vec::new(),
            tests: Vec::new(),
        }
    }

    pub fn with_test_dirs(mut self, test_dirs: Vec<String>) -> Self {
        self.test_dirs = test_dirs;
        self
    }

    pub fn with_tests(mut self, tests: Vec<String>) -> Self {
        self.tests = tests;
        self
    }
}

/// Executes acceptance tests in a given mode.
///
/// Both methods return `Err` only when the test binary could not be run at
/// all. Failing tests, panics and unexplained non-zero exits are part of the
/// returned [`PhaseRun`].
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// All acceptance tests in `test_dirs`, in one process.
    async fn run(&self, options: &RunOptions) -> Result<PhaseRun, RunnerError>;

    /// Each of `tests` in each of `test_dirs`, one process per pair, with
    /// bounded concurrency.
    async fn run_parallel(&self, options: &RunOptions) -> Result<PhaseRun, RunnerError>;
}

// ---------------------------------------------------------------------------
// GoTestRunner
// ---------------------------------------------------------------------------

/// [`TestRunner`] that drives `go test` in the provider checkout.
pub struct GoTestRunner {
    config: Arc<VcrConfig>,
    program: String,
}

impl GoTestRunner {
    pub fn new(config: VcrConfig) -> Self {
        Self {
            config: Arc::new(config),
            program: "go".to_string(),
        }
    }

    /// Use a different executable in place of `go`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Write the service account key where `GOOGLE_APPLICATION_CREDENTIALS`
    /// points.
    pub async fn install_credentials(&self) -> Result<PathBuf, RunnerError> {
        let path = self.config.layout.sa_key_path();
        let key = self.config.service_account_key().unwrap_or_default();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, key).await?;
        debug!(path = %path.display(), "service account key installed");
        Ok(path)
    }

    /// Remove the service account key. Missing keys are fine.
    pub async fn cleanup(&self) -> Result<(), RunnerError> {
        match tokio::fs::remove_file(self.config.layout.sa_key_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every package in the repository except helper scripts.
    pub async fn discover_test_dirs(&self) -> Result<Vec<String>, RunnerError> {
        let spec = CommandSpec::new(&self.program)
            .args(["list", "./..."])
            .current_dir(&self.config.layout.repo_path);
        let output = execute(&spec).await?;
        if !output.success() {
            return Err(RunnerError::PackageDiscovery(output.stderr.trim().to_string()));
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.contains("/scripts"))
            .map(str::to_string)
            .collect())
    }

    async fn prepare(&self, options: &RunOptions) -> Result<Vec<String>, RunnerError> {
        let repo = &self.config.layout.repo_path;
        if !repo.is_dir() {
            return Err(RunnerError::RepoNotConfigured(repo.clone()));
        }

        let test_dirs = if options.test_dirs.is_empty() {
            self.discover_test_dirs().await?
        } else {
            options.test_dirs.clone()
        };

        if options.mode == TestRunMode::Recording {
            reset_dir(&options.cassette_dir).await?;
        }
        tokio::fs::create_dir_all(self.config.layout.debug_log_dir(options.mode, options.version))
            .await?;
        Ok(test_dirs)
    }

    fn log_invocation(&self, spec: &CommandSpec) {
        info!(command = %spec.display(), "running tests");
        debug!(env = ?redact_env(&spec.env), "test environment");
    }
}

#[async_trait]
impl TestRunner for GoTestRunner {
    async fn run(&self, options: &RunOptions) -> Result<PhaseRun, RunnerError> {
        let test_dirs = self.prepare(options).await?;
        let spec = package_run(
            &self.config,
            &self.program,
            options.mode,
            &test_dirs,
            &options.cassette_dir,
        );
        self.log_invocation(&spec);

        let output = execute(&spec).await?;
        let text = output.combined();
        append_file(&self.config.layout.build_log_path(options.mode), &text).await?;

        let result = parse_test_output(&text);
        let exit_error = unexplained_exit(&output, &result);
        if let Some(err) = &exit_error {
            warn!(mode = %options.mode, error = %err, "test process failed");
        }
        Ok(PhaseRun { result, exit_error })
    }

    async fn run_parallel(&self, options: &RunOptions) -> Result<PhaseRun, RunnerError> {
        let test_dirs = self.prepare(options).await?;
        let layout = &self.config.layout;
        tokio::fs::create_dir_all(layout.parallel_build_log_dir(options.mode)).await?;

        let jobs = self.config.parallelism.jobs_for(options.mode);
        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut set: JoinSet<Result<(usize, CommandOutput), RunnerError>> = JoinSet::new();

        info!(
            mode = %options.mode,
            tests = options.tests.len(),
            packages = test_dirs.len(),
            jobs,
            "running tests in parallel"
        );

        let pairs = test_dirs
            .iter()
            .flat_map(|dir| options.tests.iter().map(move |test| (dir, test)));
        for (idx, (dir, test)) in pairs.enumerate() {
            let spec = single_test_run(
                &self.config,
                &self.program,
                options.mode,
                dir,
                test,
                &options.cassette_dir,
            );
            let log_path = layout.parallel_build_log_path(options.mode, test);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| RunnerError::Io(std::io::Error::other(e)))?;
                debug!(command = %spec.display(), "worker started");
                let output = execute(&spec).await?;
                append_file(&log_path, &output.combined()).await?;
                Ok((idx, output))
            });
        }

        let mut outputs = Vec::new();
        while let Some(joined) = set.join_next().await {
            outputs.push(joined??);
        }
        outputs.sort_by_key(|(idx, _)| *idx);

        let mut combined = String::new();
        let mut runs = Vec::with_capacity(outputs.len());
        for (_, output) in &outputs {
            let text = output.combined();
            let result = parse_test_output(&text);
            let exit_error = unexplained_exit(output, &result);
            combined.push_str(&text);
            runs.push(PhaseRun { result, exit_error });
        }
        let merged = merge_phase_runs(runs);
        tokio::fs::write(layout.build_log_path(options.mode), &combined).await?;

        if let Some(err) = &merged.exit_error {
            warn!(mode = %options.mode, error = %err, "test worker failed");
        }
        Ok(merged)
    }
}

async fn reset_dir(dir: &Path) -> Result<(), RunnerError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

async fn append_file(path: &Path, text: &str) -> Result<(), RunnerError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
