//! Nightly refresh of the shared cassette fixtures.
//!
//! Backs up the current fixtures, replays everything against them and
//! re-records whatever no longer replays. Nothing is posted to a review
//! platform; the summaries are plain text for the build log.

use std::sync::Arc;
use tracing::{info, warn, Instrument};

use magician_core::obs::{emit_phase_finished, emit_phase_started, emit_side_effect_failed};
use magician_core::report::{format_nightly_record, format_nightly_replay};
use magician_core::{has_terminated_tests, PhaseRun, Result, TestRunMode, VcrConfig, VcrError};
use magician_services::{CassetteStore, LogDestination, LogStore, LogUpload, UploadTarget};

use crate::runner::{RunOptions, TestRunner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CassetteUpdateRequest {
    /// `YYYY-MM-DD`, used in the nightly bucket paths.
    pub date: String,
    pub build_id: String,
}

impl CassetteUpdateRequest {
    pub fn new(date: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            build_id: build_id.into(),
        }
    }

    /// Request dated today (UTC).
    pub fn today(build_id: impl Into<String>) -> Self {
        Self::new(chrono::Utc::now().format("%Y-%m-%d").to_string(), build_id)
    }
}

#[derive(Debug, Clone)]
pub struct CassetteUpdateOutcome {
    pub replay: PhaseRun,
    pub record: Option<PhaseRun>,
    pub replay_summary: String,
    pub record_summary: Option<String>,
    pub cassettes_uploaded: bool,
    /// Phase in which the provider panicked, if any.
    pub crashed: Option<TestRunMode>,
}

impl CassetteUpdateOutcome {
    /// Replay was clean, or recording fixed every failure.
    pub fn all_passed(&self) -> bool {
        if self.crashed.is_some() {
            return false;
        }
        match &self.record {
            None => self.replay.is_clean(),
            Some(record) => {
                record.is_clean()
                    && !has_terminated_tests(&self.replay.result, &record.result)
            }
        }
    }
}

pub struct CassetteUpdate {
    config: VcrConfig,
    runner: Arc<dyn TestRunner>,
    cassettes: Arc<dyn CassetteStore>,
    logs: Arc<dyn LogStore>,
}

impl CassetteUpdate {
    pub fn new(
        config: VcrConfig,
        runner: Arc<dyn TestRunner>,
        cassettes: Arc<dyn CassetteStore>,
        logs: Arc<dyn LogStore>,
    ) -> Self {
        Self {
            config,
            runner,
            cassettes,
            logs,
        }
    }

    /// Run the refresh.
    ///
    /// Fetch and backup failures abort with [`VcrError::Setup`]. A panic in
    /// either phase stops the flow early and is reported through
    /// [`CassetteUpdateOutcome::crashed`].
    pub async fn run(&self, request: &CassetteUpdateRequest) -> Result<CassetteUpdateOutcome> {
        let span = tracing::info_span!(
            "vcr_cassette_update",
            date = %request.date,
            build_id = %request.build_id
        );
        self.drive(request).instrument(span).await
    }

    async fn drive(&self, request: &CassetteUpdateRequest) -> Result<CassetteUpdateOutcome> {
        let version = self.config.version;
        let run_id = request.build_id.as_str();

        let cassette_dir = self
            .cassettes
            .fetch(version, "main", None)
            .await
            .map_err(|e| VcrError::setup("cassette fetch", e))?;

        let backup = UploadTarget::Backup {
            date: request.date.clone(),
            build_id: request.build_id.clone(),
        };
        self.cassettes
            .upload(&cassette_dir, &backup, version)
            .await
            .map_err(|e| VcrError::setup("cassette backup", e))?;
        info!(date = %request.date, "main cassettes backed up");

        let options = RunOptions::new(TestRunMode::Replaying, version, &cassette_dir);
        emit_phase_started(run_id, TestRunMode::Replaying, false, 0);
        let replay = self.runner.run(&options).await?;
        emit_phase_finished(run_id, TestRunMode::Replaying, &replay.result, replay.exit_error.as_deref());
        self.upload_logs(request, TestRunMode::Replaying, false).await;

        let replay_summary = format_nightly_replay(&replay);
        let mut outcome = CassetteUpdateOutcome {
            replay_summary,
            replay,
            record: None,
            record_summary: None,
            cassettes_uploaded: false,
            crashed: None,
        };

        if outcome.replay.result.has_crashed() {
            warn!("provider crashed while replaying");
            outcome.crashed = Some(TestRunMode::Replaying);
            return Ok(outcome);
        }

        let failed = outcome.replay.result.failed_tests();
        if failed.is_empty() {
            return Ok(outcome);
        }

        let options = RunOptions::new(TestRunMode::Recording, version, &cassette_dir).with_tests(failed);
        emit_phase_started(run_id, TestRunMode::Recording, true, options.tests.len());
        let record = self.runner.run_parallel(&options).await?;
        emit_phase_finished(run_id, TestRunMode::Recording, &record.result, record.exit_error.as_deref());
        // Logs go up before cassettes so they survive a failed upload.
        self.upload_logs(request, TestRunMode::Recording, true).await;

        if record.result.passed.is_empty() {
            warn!("no tests passed in RECORDING mode, not uploading cassettes");
        } else {
            match self
                .cassettes
                .upload(&cassette_dir, &UploadTarget::Main, version)
                .await
            {
                Ok(()) => outcome.cassettes_uploaded = true,
                Err(e) => emit_side_effect_failed(run_id, "cassette upload", &e),
            }
        }

        let terminated = has_terminated_tests(&outcome.replay.result, &record.result);
        outcome.record_summary = Some(format_nightly_record(&record, terminated));
        if record.result.has_crashed() {
            warn!("provider crashed while recording");
            outcome.crashed = Some(TestRunMode::Recording);
        }
        outcome.record = Some(record);
        Ok(outcome)
    }

    async fn upload_logs(&self, request: &CassetteUpdateRequest, mode: TestRunMode, parallel: bool) {
        let upload = LogUpload {
            mode,
            version: self.config.version,
            destination: LogDestination::Nightly {
                date: request.date.clone(),
                build_id: request.build_id.clone(),
            },
            parallel,
            after_recording: false,
        };
        if let Err(e) = self.logs.upload_logs(&upload).await {
            emit_side_effect_failed(&request.build_id, "log upload", &e);
        }
    }
}
