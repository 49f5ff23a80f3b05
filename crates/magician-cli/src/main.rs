//! Magician - VCR test orchestration for the generated Terraform providers
//!
//! ## Commands
//!
//! - `test-terraform-vcr`: replay, re-record and report the acceptance tests
//!   a pull request affects
//! - `vcr-cassette-update`: nightly refresh of the shared cassette fixtures

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use magician_core::telemetry::{init_tracing, LogFormat};
use magician_core::{
    BuildIdentity, ProviderVersion, ReviewTarget, VcrConfig, WorkspaceLayout,
    CASSETTE_UPDATE_ENV_VARS, REQUIRED_ENV_VARS,
};
use magician_services::{GithubClient, GithubConfig, GsutilStore};
use magician_vcr::exec::{execute, CommandSpec};
use magician_vcr::{
    CassetteUpdate, CassetteUpdateRequest, GoTestRunner, VcrOrchestrator, VcrRequest,
};

#[derive(Parser)]
#[command(name = "magician")]
#[command(author = "Magic Modules Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Record/replay acceptance test orchestration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run VCR tests for a pull request and report the result on it
    TestTerraformVcr {
        /// Pull request number
        pr_number: String,

        /// Commit SHA the status is posted on
        commit_sha: String,

        /// Cloud Build ID
        build_id: String,

        /// Cloud Build project
        project_id: String,

        /// Cloud Build step number
        build_step: String,

        /// Branch the pull request targets
        #[arg(long, env = "BASE_BRANCH", default_value = "main")]
        base_branch: String,

        /// Provider flavour under test
        #[arg(long, default_value = "beta")]
        provider_version: ProviderVersion,

        /// Working directory for cassettes, logs and credentials
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,

        /// Provider checkout (default: <base-dir>/tpgb)
        #[arg(long)]
        repo_path: Option<PathBuf>,

        /// File listing changed paths, one per line (default: git diff of
        /// the generated branches)
        #[arg(long)]
        changed_files: Option<PathBuf>,

        /// Unified diff of the GA provider
        #[arg(long)]
        ga_diff: Option<PathBuf>,

        /// Unified diff of the beta provider
        #[arg(long)]
        beta_diff: Option<PathBuf>,
    },

    /// Refresh the shared cassettes nightly
    VcrCassetteUpdate {
        /// Cloud Build ID
        build_id: String,

        /// Working directory for cassettes, logs and credentials
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,

        /// Provider checkout (default: <base-dir>/tpgb)
        #[arg(long)]
        repo_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_flag(cli.json), level);

    let env: BTreeMap<String, String> = std::env::vars().collect();

    match cli.command {
        Commands::TestTerraformVcr {
            pr_number,
            commit_sha,
            build_id,
            project_id,
            build_step,
            base_branch,
            provider_version,
            base_dir,
            repo_path,
            changed_files,
            ga_diff,
            beta_diff,
        } => {
            let layout = layout(base_dir, repo_path);
            let config = VcrConfig::from_env_map(&env, REQUIRED_ENV_VARS, provider_version, layout)
                .context("Environment is not set up for VCR tests")?
                .with_base_branch(base_branch)
                .with_build(BuildIdentity {
                    build_id,
                    project_id,
                    build_step,
                });
            let target = ReviewTarget::new(pr_number, commit_sha);
            cmd_test_terraform_vcr(
                config,
                target,
                changed_files.as_deref(),
                ga_diff.as_deref(),
                beta_diff.as_deref(),
            )
            .await
        }
        Commands::VcrCassetteUpdate {
            build_id,
            base_dir,
            repo_path,
        } => {
            let layout = layout(base_dir, repo_path);
            let config = VcrConfig::from_env_map(
                &env,
                CASSETTE_UPDATE_ENV_VARS,
                ProviderVersion::Beta,
                layout,
            )
            .context("Environment is not set up for the cassette update")?;
            cmd_vcr_cassette_update(config, &build_id).await
        }
    }
}

fn layout(base_dir: PathBuf, repo_path: Option<PathBuf>) -> WorkspaceLayout {
    let repo_path = repo_path.unwrap_or_else(|| base_dir.join("tpgb"));
    WorkspaceLayout::new(base_dir, repo_path)
}

fn read_optional(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read {}", p.display())),
        None => Ok(String::new()),
    }
}

/// Files changed between the generated branch of the pull request and the
/// branch generated from its base.
async fn changed_files(config: &VcrConfig, target: &ReviewTarget) -> Result<Vec<String>> {
    let head = target.head_ref();
    let old = format!("{head}-old");

    let refspec = format!("{old}:{old}");
    let fetch = CommandSpec::new("git")
        .args(["fetch", "origin", refspec.as_str(), "--depth", "1"])
        .current_dir(&config.layout.repo_path);
    let fetched = execute(&fetch).await.context("Failed to run git fetch")?;
    if !fetched.success() {
        warn!(branch = %old, "could not fetch base branch, diffing local state");
    }

    let diff = CommandSpec::new("git")
        .args(["diff", head.as_str(), old.as_str(), "--name-only"])
        .current_dir(&config.layout.repo_path);
    let output = execute(&diff).await.context("Failed to run git diff")?;
    if !output.success() {
        bail!("git diff failed: {}", output.stderr.trim());
    }
    Ok(output.stdout.lines().map(str::to_string).collect())
}

async fn cmd_test_terraform_vcr(
    config: VcrConfig,
    target: ReviewTarget,
    changed_files_path: Option<&Path>,
    ga_diff: Option<&Path>,
    beta_diff: Option<&Path>,
) -> Result<()> {
    config.validate().context("Invalid VCR configuration")?;

    let files = match changed_files_path {
        Some(path) => read_optional(Some(path))?
            .lines()
            .map(str::to_string)
            .collect(),
        None => changed_files(&config, &target).await?,
    };
    let request = VcrRequest::new(target, files)
        .with_diffs(read_optional(ga_diff)?, read_optional(beta_diff)?);

    let token = config.test_env.get("GITHUB_TOKEN").cloned().unwrap_or_default();
    let review = GithubClient::new(GithubConfig::new(token)).context("Failed to build GitHub client")?;
    let store = Arc::new(GsutilStore::from_config(&config));
    let runner = Arc::new(GoTestRunner::new(config.clone()));

    runner
        .install_credentials()
        .await
        .context("Failed to install service account key")?;

    let orchestrator = VcrOrchestrator::new(
        config,
        runner.clone(),
        store.clone(),
        store,
        Arc::new(review),
    );
    let result = orchestrator.run(&request).await;

    if let Err(e) = runner.cleanup().await {
        warn!(error = %e, "failed to remove service account key");
    }

    let outcome = result.context("VCR run aborted")?;
    info!(
        terminal = ?outcome.terminal(),
        passed = outcome.verdict.passed,
        "{}",
        outcome.verdict.message
    );
    if let Some(report) = &outcome.report {
        println!("{report}");
    }
    Ok(())
}

async fn cmd_vcr_cassette_update(config: VcrConfig, build_id: &str) -> Result<()> {
    config.validate().context("Invalid VCR configuration")?;

    let store = Arc::new(GsutilStore::from_config(&config));
    let runner = Arc::new(GoTestRunner::new(config.clone()));
    runner
        .install_credentials()
        .await
        .context("Failed to install service account key")?;

    let update = CassetteUpdate::new(config, runner.clone(), store.clone(), store);
    let result = update.run(&CassetteUpdateRequest::today(build_id)).await;

    if let Err(e) = runner.cleanup().await {
        warn!(error = %e, "failed to remove service account key");
    }

    let outcome = result.context("Cassette update aborted")?;
    println!("{}", outcome.replay_summary);
    if let Some(summary) = &outcome.record_summary {
        println!("{summary}");
    }
    if let Some(mode) = outcome.crashed {
        bail!(
            "provider crashed while running the VCR tests in {} mode",
            mode.upper()
        );
    }
    Ok(())
}
