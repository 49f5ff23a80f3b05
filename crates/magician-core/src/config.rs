//! Immutable run configuration.
//!
//! Built once at the process boundary from an explicit environment map and
//! passed by reference to everything downstream. Nothing below this module
//! reads `std::env`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{ProviderVersion, Result, TestRunMode, VcrError};

/// Variables a presubmit VCR run refuses to start without.
pub const REQUIRED_ENV_VARS: &[&str] = &[
    "GITHUB_TOKEN",
    "GOCACHE",
    "GOPATH",
    "GOOGLE_BILLING_ACCOUNT",
    "GOOGLE_CUST_ID",
    "GOOGLE_FIRESTORE_PROJECT",
    "GOOGLE_IDENTITY_USER",
    "GOOGLE_MASTER_BILLING_ACCOUNT",
    "GOOGLE_ORG",
    "GOOGLE_ORG_2",
    "GOOGLE_ORG_DOMAIN",
    "GOOGLE_PROJECT",
    "GOOGLE_PROJECT_NUMBER",
    "GOOGLE_REGION",
    "GOOGLE_SERVICE_ACCOUNT",
    "GOOGLE_PUBLIC_AVERTISED_PREFIX_DESCRIPTION",
    "GOOGLE_TPU_V2_VM_RUNTIME_VERSION",
    "GOOGLE_ZONE",
    "HOME",
    "PATH",
    "SA_KEY",
    "USER",
];

/// Variables the nightly cassette update refuses to start without.
pub const CASSETTE_UPDATE_ENV_VARS: &[&str] = &[
    "GOCACHE",
    "GOPATH",
    "GOOGLE_BILLING_ACCOUNT",
    "GOOGLE_CUST_ID",
    "GOOGLE_IDENTITY_USER",
    "GOOGLE_MASTER_BILLING_ACCOUNT",
    "GOOGLE_ORG",
    "GOOGLE_ORG_2",
    "GOOGLE_ORG_DOMAIN",
    "GOOGLE_PROJECT",
    "GOOGLE_PROJECT_NUMBER",
    "GOOGLE_REGION",
    "GOOGLE_SERVICE_ACCOUNT",
    "GOOGLE_PUBLIC_AVERTISED_PREFIX_DESCRIPTION",
    "GOOGLE_ZONE",
    "HOME",
    "PATH",
    "SA_KEY",
    "USER",
    "GITHUB_TOKEN_CLASSIC",
];

pub const NIGHTLY_BUCKET: &str = "vcr-nightly";

pub const DEFAULT_CHECK_NAME: &str = "VCR-test";
pub const DEFAULT_LOG_BUCKET: &str = "ci-vcr-logs";
pub const DEFAULT_CASSETTE_BUCKET: &str = "ci-vcr-cassettes";

const PROCESS_GRACE: Duration = Duration::from_secs(10 * 60);

/// Environment keys never written to logs verbatim.
pub fn is_secret_env(key: &str) -> bool {
    key == "SA_KEY" || key == "GOOGLE_CREDENTIALS" || key.starts_with("GITHUB_TOKEN")
}

/// Copy of `env` with secret values replaced, for logging.
pub fn redact_env(env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .map(|(k, v)| {
            let v = if is_secret_env(k) {
                "<redacted>".to_string()
            } else {
                v.clone()
            };
            (k.clone(), v)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Review target and build identity
// ---------------------------------------------------------------------------

/// The pull request a run reports to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTarget {
    pub number: String,
    pub commit_sha: String,
}

impl ReviewTarget {
    pub fn new(number: impl Into<String>, commit_sha: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            commit_sha: commit_sha.into(),
        }
    }

    /// Branch name the generated downstream commit lives on.
    pub fn head_ref(&self) -> String {
        format!("auto-pr-{}", self.number)
    }
}

/// The CI build that is executing this run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIdentity {
    pub build_id: String,
    pub project_id: String,
    pub build_step: String,
}

impl BuildIdentity {
    /// Link attached to commit statuses.
    pub fn status_target_url(&self) -> String {
        format!(
            "https://console.cloud.google.com/cloud-build/builds;region=global/{};step={}?project={}",
            self.build_id, self.build_step, self.project_id
        )
    }
}

// ---------------------------------------------------------------------------
// Parallelism and layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelismConfig {
    /// `-parallel` for whole-package runs and `ACCTEST_PARALLELISM`.
    pub acc_test_parallelism: usize,
    /// Concurrent single-test processes while replaying.
    pub replaying_jobs: usize,
    /// Concurrent single-test processes while recording; lower because every
    /// test hits live APIs.
    pub recording_jobs: usize,
}

impl Default for ParallelismConfig {
    fn default() -> Self {
        Self {
            acc_test_parallelism: 32,
            replaying_jobs: 16,
            recording_jobs: 8,
        }
    }
}

impl ParallelismConfig {
    pub fn jobs_for(&self, mode: TestRunMode) -> usize {
        match mode {
            TestRunMode::Replaying => self.replaying_jobs.max(1),
            TestRunMode::Recording => self.recording_jobs.max(1),
        }
    }
}

/// Where cassettes, logs and credentials live on the build machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceLayout {
    /// Working directory of the run.
    pub base_dir: PathBuf,
    /// Checkout of the generated provider repository.
    pub repo_path: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(base_dir: impl Into<PathBuf>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            repo_path: repo_path.into(),
        }
    }

    pub fn cassette_dir(&self, version: ProviderVersion) -> PathBuf {
        self.base_dir.join("cassettes").join(version.as_str())
    }

    pub fn test_log_root(&self) -> PathBuf {
        self.base_dir.join("testlogs")
    }

    /// Per-test debug logs written by the provider (`TF_LOG_PATH_MASK`).
    pub fn debug_log_dir(&self, mode: TestRunMode, version: ProviderVersion) -> PathBuf {
        self.test_log_root().join(mode.lower()).join(version.as_str())
    }

    /// Combined `go test` output for a mode.
    pub fn build_log_path(&self, mode: TestRunMode) -> PathBuf {
        self.test_log_root().join(format!("{}_test.log", mode.lower()))
    }

    /// Directory of per-test `go test` output for parallel runs.
    pub fn parallel_build_log_dir(&self, mode: TestRunMode) -> PathBuf {
        self.test_log_root().join(format!("{}_build", mode.lower()))
    }

    pub fn parallel_build_log_path(&self, mode: TestRunMode, test: &str) -> PathBuf {
        self.parallel_build_log_dir(mode)
            .join(format!("{}_{}_test.log", test, mode.lower()))
    }

    pub fn sa_key_path(&self) -> PathBuf {
        self.base_dir.join("sa_key.json")
    }
}

// ---------------------------------------------------------------------------
// VcrConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcrConfig {
    pub version: ProviderVersion,
    pub base_branch: String,
    pub build: BuildIdentity,
    pub log_bucket: String,
    pub cassette_bucket: String,
    pub check_name: String,
    pub parallelism: ParallelismConfig,
    /// Per-process `go test` timeout.
    pub timeout_secs: u64,
    pub layout: WorkspaceLayout,
    /// Passed through to every test process.
    pub test_env: BTreeMap<String, String>,
}

impl VcrConfig {
    pub fn new(version: ProviderVersion, layout: WorkspaceLayout, test_env: BTreeMap<String, String>) -> Self {
        Self {
            version,
            base_branch: "main".to_string(),
            build: BuildIdentity::default(),
            log_bucket: DEFAULT_LOG_BUCKET.to_string(),
            cassette_bucket: DEFAULT_CASSETTE_BUCKET.to_string(),
            check_name: DEFAULT_CHECK_NAME.to_string(),
            parallelism: ParallelismConfig::default(),
            timeout_secs: 240 * 60,
            layout,
            test_env,
        }
    }

    /// Validate `env` against `required` and build a config from it.
    pub fn from_env_map(
        env: &BTreeMap<String, String>,
        required: &[&str],
        version: ProviderVersion,
        layout: WorkspaceLayout,
    ) -> Result<Self> {
        let missing: Vec<String> = required
            .iter()
            .filter(|k| !env.contains_key(**k))
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(VcrError::MissingEnv(missing));
        }

        let test_env = required
            .iter()
            .filter_map(|k| env.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect();
        Ok(Self::new(version, layout, test_env))
    }

    pub fn with_base_branch(mut self, base_branch: impl Into<String>) -> Self {
        let base_branch = base_branch.into();
        if !base_branch.is_empty() {
            self.base_branch = base_branch;
        }
        self
    }

    pub fn with_build(mut self, build: BuildIdentity) -> Self {
        self.build = build;
        self
    }

    pub fn with_parallelism(mut self, parallelism: ParallelismConfig) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Outer kill deadline for a `go test` process. Leaves room for
    /// compilation so the test binary's own timeout panic gets reported.
    pub fn process_timeout(&self) -> Duration {
        self.timeout() + PROCESS_GRACE
    }

    /// `go test -timeout` argument.
    pub fn go_timeout_arg(&self) -> String {
        if self.timeout_secs % 60 == 0 {
            format!("{}m", self.timeout_secs / 60)
        } else {
            format!("{}s", self.timeout_secs)
        }
    }

    pub fn service_account_key(&self) -> Option<&str> {
        self.test_env.get("SA_KEY").map(String::as_str)
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_bucket.is_empty() || self.cassette_bucket.is_empty() {
            return Err(VcrError::InvalidConfig("bucket names cannot be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(VcrError::InvalidConfig("timeout must be positive".into()));
        }
        if self.parallelism.acc_test_parallelism == 0 {
            return Err(VcrError::InvalidConfig(
                "acc_test_parallelism must be positive".into(),
            ));
        }
        Ok(())
    }
}
