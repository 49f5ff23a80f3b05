//! Collaborator traits for VCR orchestration.
//!
//! - `CassetteStore`: fetch and publish recorded HTTP cassettes
//! - `LogStore`: publish build and debug logs
//! - `ReviewPlatform`: post comments and commit statuses
//!
//! All traits are async and backend-agnostic. In-memory fakes live in the
//! `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use magician_core::{BuildState, ProviderVersion, ReviewTarget, TestRunMode};

use crate::error::ServiceResult;

/// Branch name that keeps its own cassettes as the primary layer.
pub const MAJOR_RELEASE_BRANCH: &str = "FEATURE-BRANCH-major-release-6.0.0";

// ---------------------------------------------------------------------------
// CassetteStore
// ---------------------------------------------------------------------------

/// Where freshly recorded cassettes are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadTarget {
    /// Per-change overlay, read back by later runs of the same change.
    Head(String),
    /// The shared fixtures every run starts from.
    Main,
    /// Dated copy of the shared fixtures taken before a nightly refresh.
    Backup { date: String, build_id: String },
}

#[async_trait]
pub trait CassetteStore: Send + Sync {
    /// Materialise cassettes locally and return the directory.
    ///
    /// Layers are applied in order, later ones overwriting earlier ones:
    /// main fixtures, base-branch fixtures (when the base is not `main`),
    /// then head fixtures (when `head` is set). A missing layer is not an
    /// error.
    async fn fetch(
        &self,
        version: ProviderVersion,
        base_branch: &str,
        head: Option<&str>,
    ) -> ServiceResult<PathBuf>;

    /// Publish every cassette under `local`.
    async fn upload(
        &self,
        local: &Path,
        target: &UploadTarget,
        version: ProviderVersion,
    ) -> ServiceResult<()>;
}

// ---------------------------------------------------------------------------
// LogStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogDestination {
    /// Artifacts of a presubmit build for one change.
    Review { head: String, build_id: String },
    /// Artifacts of a nightly cassette refresh.
    Nightly { date: String, build_id: String },
}

/// One log upload after a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogUpload {
    pub mode: TestRunMode,
    pub version: ProviderVersion,
    pub destination: LogDestination,
    /// The phase ran one process per test, so per-test build logs exist.
    pub parallel: bool,
    /// The phase was the confirming replay after recording.
    pub after_recording: bool,
}

impl LogUpload {
    /// `_after_recording` for the confirming replay, empty otherwise.
    pub fn suffix(&self) -> &'static str {
        if self.after_recording {
            "_after_recording"
        } else {
            ""
        }
    }
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn upload_logs(&self, upload: &LogUpload) -> ServiceResult<()>;
}

// ---------------------------------------------------------------------------
// ReviewPlatform
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReviewPlatform: Send + Sync {
    async fn post_report(&self, target: &ReviewTarget, text: &str) -> ServiceResult<()>;

    async fn post_status(
        &self,
        target: &ReviewTarget,
        check: &str,
        state: BuildState,
        target_url: &str,
    ) -> ServiceResult<()>;
}
