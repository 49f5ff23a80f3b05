//! `go test` invocations for replaying and recording.

use std::collections::BTreeMap;
use std::path::Path;

use magician_core::{TestRunMode, VcrConfig};

use crate::exec::CommandSpec;

/// Environment handed to the provider test binary.
///
/// The passthrough variables from the config are applied first, so the VCR
/// settings always win.
pub fn test_env(
    config: &VcrConfig,
    mode: TestRunMode,
    cassette_dir: &Path,
    test_dirs: &[String],
    parallelism: usize,
) -> BTreeMap<String, String> {
    let log_mask = config
        .layout
        .debug_log_dir(mode, config.version)
        .join("%s.log");

    let mut env = config.test_env.clone();
    let vcr = [
        ("VCR_PATH", cassette_dir.to_string_lossy().into_owned()),
        ("VCR_MODE", mode.upper().to_string()),
        ("ACCTEST_PARALLELISM", parallelism.to_string()),
        (
            "GOOGLE_CREDENTIALS",
            config.service_account_key().unwrap_or_default().to_string(),
        ),
        (
            "GOOGLE_APPLICATION_CREDENTIALS",
            config.layout.sa_key_path().to_string_lossy().into_owned(),
        ),
        ("GOOGLE_TEST_DIRECTORY", test_dirs.join(" ")),
        ("TF_LOG", "DEBUG".to_string()),
        ("TF_LOG_SDK_FRAMEWORK", "INFO".to_string()),
        ("TF_LOG_PATH_MASK", log_mask.to_string_lossy().into_owned()),
        ("TF_ACC", "1".to_string()),
        ("TF_SCHEMA_PANIC_ON_ERROR", "1".to_string()),
    ];
    env.extend(vcr.into_iter().map(|(k, v)| (k.to_string(), v)));
    env
}

fn go_flags(config: &VcrConfig, parallel: usize, run: &str) -> Vec<String> {
    vec![
        "-parallel".to_string(),
        parallel.to_string(),
        "-v".to_string(),
        format!("-run={run}"),
        "-timeout".to_string(),
        config.go_timeout_arg(),
        format!(
            "-ldflags=-X={}/version.ProviderVersion=acc",
            config.version.module_path()
        ),
        "-vet=off".to_string(),
    ]
}

/// Every acceptance test in `test_dirs`, in one process.
pub fn package_run(
    config: &VcrConfig,
    program: &str,
    mode: TestRunMode,
    test_dirs: &[String],
    cassette_dir: &Path,
) -> CommandSpec {
    let parallelism = config.parallelism.acc_test_parallelism;
    CommandSpec::new(program)
        .arg("test")
        .args(test_dirs.iter().cloned())
        .args(go_flags(config, parallelism, "TestAcc"))
        .envs(test_env(config, mode, cassette_dir, test_dirs, parallelism))
        .current_dir(&config.layout.repo_path)
        .timeout(config.process_timeout())
}

/// A single named test in a single package, run serially.
pub fn single_test_run(
    config: &VcrConfig,
    program: &str,
    mode: TestRunMode,
    test_dir: &str,
    test: &str,
    cassette_dir: &Path,
) -> CommandSpec {
    let dirs = [test_dir.to_string()];
    CommandSpec::new(program)
        .arg("test")
        .arg(test_dir)
        .args(go_flags(config, 1, &format!("{test}$")))
        .envs(test_env(config, mode, cassette_dir, &dirs, 1))
        .current_dir(&config.layout.repo_path)
        .timeout(config.process_timeout())
}
