//! Google Cloud Storage backend driven through the `gsutil` CLI.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use magician_core::config::NIGHTLY_BUCKET;
use magician_core::{ProviderVersion, VcrConfig, WorkspaceLayout};

use crate::error::{ServiceError, ServiceResult};
use crate::traits::{
    CassetteStore, LogDestination, LogStore, LogUpload, UploadTarget, MAJOR_RELEASE_BRANCH,
};

/// Bucket names used by [`GsutilStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsBuckets {
    pub cassettes: String,
    pub logs: String,
    pub nightly: String,
}

impl GcsBuckets {
    pub fn from_config(config: &VcrConfig) -> Self {
        Self {
            cassettes: config.cassette_bucket.clone(),
            logs: config.log_bucket.clone(),
            nightly: NIGHTLY_BUCKET.to_string(),
        }
    }
}

/// Cassette and log store backed by `gsutil`.
pub struct GsutilStore {
    buckets: GcsBuckets,
    layout: WorkspaceLayout,
    program: String,
}

impl GsutilStore {
    pub fn new(buckets: GcsBuckets, layout: WorkspaceLayout) -> Self {
        Self {
            buckets,
            layout,
            program: "gsutil".to_string(),
        }
    }

    pub fn from_config(config: &VcrConfig) -> Self {
        Self::new(GcsBuckets::from_config(config), config.layout.clone())
    }

    /// Use a different executable in place of `gsutil`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Bucket globs to fetch, in overwrite order.
    pub fn fetch_sources(
        &self,
        version: ProviderVersion,
        base_branch: &str,
        head: Option<&str>,
    ) -> Vec<String> {
        let prefix = format!("gs://{}/{}", self.buckets.cassettes, version.bucket_path());
        let mut sources = Vec::new();
        if base_branch != MAJOR_RELEASE_BRANCH {
            sources.push(format!("{prefix}fixtures/*"));
        }
        if base_branch != "main" {
            sources.push(format!("{prefix}refs/branches/{base_branch}/fixtures/*"));
        }
        if let Some(head) = head.filter(|h| !h.is_empty()) {
            sources.push(format!("{prefix}refs/heads/{head}/fixtures/*"));
        }
        sources
    }

    pub fn upload_destination(&self, target: &UploadTarget, version: ProviderVersion) -> String {
        let prefix = format!("gs://{}/{}", self.buckets.cassettes, version.bucket_path());
        match target {
            UploadTarget::Head(head) => format!("{prefix}refs/heads/{head}/fixtures/"),
            UploadTarget::Main => format!("{prefix}fixtures/"),
            UploadTarget::Backup { date, build_id } => format!(
                "{}/main_cassettes_backup/fixtures/",
                self.nightly_prefix(version, date, build_id)
            ),
        }
    }

    fn nightly_prefix(&self, version: ProviderVersion, date: &str, build_id: &str) -> String {
        format!("gs://{}/{}/{}/{}", self.buckets.nightly, version, date, build_id)
    }

    /// `gsutil` argument lists for one log upload.
    pub fn log_commands(&self, upload: &LogUpload) -> Vec<Vec<String>> {
        let mode = upload.mode.lower();
        let build_log = path_arg(&self.layout.build_log_path(upload.mode));
        let debug_logs = glob_arg(&self.layout.debug_log_dir(upload.mode, upload.version));
        let text = ["-h", "Content-Type:text/plain"];

        match &upload.destination {
            LogDestination::Review { head, build_id } => {
                let root = format!(
                    "gs://{}/{}/refs/heads/{}/artifacts/{}/",
                    self.buckets.logs, upload.version, head, build_id
                );
                let suffix = upload.suffix();
                let mut commands = vec![args(
                    &text,
                    &["-q", "cp", "-r"],
                    [build_log, format!("{root}build-log/")],
                )];
                if upload.parallel {
                    commands.push(args(
                        &text,
                        &["-m", "-q", "cp", "-r"],
                        [
                            glob_arg(&self.layout.parallel_build_log_dir(upload.mode)),
                            format!("{root}build-log/{mode}_build{suffix}/"),
                        ],
                    ));
                }
                commands.push(args(
                    &text,
                    &["-m", "-q", "cp", "-r"],
                    [debug_logs, format!("{root}{mode}{suffix}/")],
                ));
                commands
            }
            LogDestination::Nightly { date, build_id } => {
                let prefix = self.nightly_prefix(upload.version, date, build_id);
                vec![
                    args(
                        &text,
                        &["-q", "cp", "-r"],
                        [build_log, format!("{prefix}/logs/{mode}/")],
                    ),
                    args(
                        &text,
                        &["-q", "cp", "-r"],
                        [debug_logs, format!("{prefix}/logs/build-log/")],
                    ),
                ]
            }
        }
    }

    async fn gsutil(&self, args: &[String]) -> ServiceResult<()> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command, "running gsutil");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| ServiceError::CommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ServiceError::CommandFailed {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn glob_arg(dir: &Path) -> String {
    path_arg(&dir.join("*"))
}

fn args<const N: usize>(headers: &[&str], flags: &[&str], operands: [String; N]) -> Vec<String> {
    headers
        .iter()
        .chain(flags.iter())
        .map(|s| s.to_string())
        .chain(operands)
        .collect()
}

#[async_trait]
impl CassetteStore for GsutilStore {
    async fn fetch(
        &self,
        version: ProviderVersion,
        base_branch: &str,
        head: Option<&str>,
    ) -> ServiceResult<PathBuf> {
        let dest = self.layout.cassette_dir(version);
        tokio::fs::create_dir_all(&dest).await?;
        let dest_arg = path_arg(&dest);

        for source in self.fetch_sources(version, base_branch, head) {
            let cp = ["-m", "-q", "cp"]
                .into_iter()
                .map(String::from)
                .chain([source.clone(), dest_arg.clone()])
                .collect::<Vec<_>>();
            if let Err(e) = self.gsutil(&cp).await {
                warn!(source = %source, error = %e, "cassette layer unavailable");
            }
        }

        info!(version = %version, base_branch, dest = %dest.display(), "cassettes fetched");
        Ok(dest)
    }

    async fn upload(
        &self,
        local: &Path,
        target: &UploadTarget,
        version: ProviderVersion,
    ) -> ServiceResult<()> {
        let destination = self.upload_destination(target, version);
        let cp = ["-m", "-q", "cp"]
            .into_iter()
            .map(String::from)
            .chain([glob_arg(local), destination.clone()])
            .collect::<Vec<_>>();
        self.gsutil(&cp).await?;
        info!(destination = %destination, "cassettes uploaded");
        Ok(())
    }
}

#[async_trait]
impl LogStore for GsutilStore {
    /// Attempts every copy; returns the first failure.
    async fn upload_logs(&self, upload: &LogUpload) -> ServiceResult<()> {
        let mut first_err = None;
        for command in self.log_commands(upload) {
            if let Err(e) = self.gsutil(&command).await {
                warn!(mode = %upload.mode, error = %e, "log upload failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
