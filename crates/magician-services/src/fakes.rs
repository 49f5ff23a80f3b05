//! In-memory fakes for collaborator traits (testing only)
//!
//! Each fake records the calls it receives so tests can assert on side
//! effects without touching cloud storage or GitHub.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use magician_core::{BuildState, ProviderVersion, ReviewTarget};

use crate::error::{ServiceError, ServiceResult};
use crate::traits::*;

// ---------------------------------------------------------------------------
// MemoryCassetteStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub version: ProviderVersion,
    pub base_branch: String,
    pub head: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CassetteUploadCall {
    pub local: PathBuf,
    pub target: UploadTarget,
    pub version: ProviderVersion,
}

/// Cassette store that hands out a fixed local directory.
#[derive(Debug)]
pub struct MemoryCassetteStore {
    dir: PathBuf,
    fail_fetch: bool,
    fail_upload: bool,
    fetches: Mutex<Vec<FetchCall>>,
    uploads: Mutex<Vec<CassetteUploadCall>>,
}

impl MemoryCassetteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fail_fetch: false,
            fail_upload: false,
            fetches: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Make every `fetch` fail, as if the bucket were unreachable.
    pub fn failing() -> Self {
        Self {
            fail_fetch: true,
            ..Self::new("/nonexistent")
        }
    }

    /// Record uploads but report each one as failed.
    pub fn with_failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn fetches(&self) -> Vec<FetchCall> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<CassetteUploadCall> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl CassetteStore for MemoryCassetteStore {
    async fn fetch(
        &self,
        version: ProviderVersion,
        base_branch: &str,
        head: Option<&str>,
    ) -> ServiceResult<PathBuf> {
        self.fetches.lock().unwrap().push(FetchCall {
            version,
            base_branch: base_branch.to_string(),
            head: head.map(str::to_string),
        });
        if self.fail_fetch {
            return Err(ServiceError::MissingCassettes(self.dir.display().to_string()));
        }
        Ok(self.dir.clone())
    }

    async fn upload(
        &self,
        local: &Path,
        target: &UploadTarget,
        version: ProviderVersion,
    ) -> ServiceResult<()> {
        self.uploads.lock().unwrap().push(CassetteUploadCall {
            local: local.to_path_buf(),
            target: target.clone(),
            version,
        });
        if self.fail_upload {
            return Err(ServiceError::CommandFailed {
                command: "gsutil cp".to_string(),
                reason: "AccessDeniedException: 403".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryLogStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryLogStore {
    uploads: Mutex<Vec<LogUpload>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> Vec<LogUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn upload_logs(&self, upload: &LogUpload) -> ServiceResult<()> {
        self.uploads.lock().unwrap().push(upload.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryReviewPlatform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedStatus {
    pub target: ReviewTarget,
    pub check: String,
    pub state: BuildState,
    pub target_url: String,
}

#[derive(Debug, Default)]
pub struct MemoryReviewPlatform {
    reports: Mutex<Vec<(ReviewTarget, String)>>,
    statuses: Mutex<Vec<PostedStatus>>,
}

impl MemoryReviewPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn statuses(&self) -> Vec<PostedStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<BuildState> {
        self.statuses().into_iter().map(|s| s.state).collect()
    }
}

#[async_trait]
impl ReviewPlatform for MemoryReviewPlatform {
    async fn post_report(&self, target: &ReviewTarget, text: &str) -> ServiceResult<()> {
        self.reports
            .lock()
            .unwrap()
            .push((target.clone(), text.to_string()));
        Ok(())
    }

    async fn post_status(
        &self,
        target: &ReviewTarget,
        check: &str,
        state: BuildState,
        target_url: &str,
    ) -> ServiceResult<()> {
        self.statuses.lock().unwrap().push(PostedStatus {
            target: target.clone(),
            check: check.to_string(),
            state,
            target_url: target_url.to_string(),
        });
        Ok(())
    }
}
