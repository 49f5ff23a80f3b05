//! Presubmit VCR orchestration.
//!
//! Replays the affected packages against stored cassettes. When replay
//! fails, re-records the failing tests against live APIs, publishes the new
//! cassettes, replays the recorded tests once more to catch non-determinism,
//! and reports every step back to the pull request.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use magician_core::obs::{
    emit_phase_finished, emit_phase_started, emit_run_finished, emit_side_effect_failed,
    emit_status_posted, emit_surface_computed, run_span,
};
use magician_core::{
    compute_surface, merge_phase_runs, not_run_tests, render_report, BuildState,
    OrchestrationState, PhaseRun, ReportContext, Result, ReviewTarget, SurfaceRules,
    TerminalState, TestRunMode, VcrConfig, VcrError, VcrGate, Verdict,
};
use magician_services::{
    CassetteStore, LogDestination, LogStore, LogUpload, ReviewPlatform, UploadTarget,
};

use crate::runner::{RunOptions, TestRunner};

/// Input describing one change under test.
#[derive(Debug, Clone)]
pub struct VcrRequest {
    pub target: ReviewTarget,
    /// Paths touched by the change, relative to the provider repository.
    pub changed_files: Vec<String>,
    /// Unified diff of the GA provider, for spotting added tests.
    pub ga_diff: String,
    /// Unified diff of the beta provider.
    pub beta_diff: String,
}

impl VcrRequest {
    pub fn new(target: ReviewTarget, changed_files: Vec<String>) -> Self {
        Self {
            target,
            changed_files,
            ga_diff: String::new(),
            beta_diff: String::new(),
        }
    }

    pub fn with_diffs(mut self, ga_diff: impl Into<String>, beta_diff: impl Into<String>) -> Self {
        self.ga_diff = ga_diff.into();
        self.beta_diff = beta_diff.into();
        self
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct VcrOutcome {
    pub state: OrchestrationState,
    pub verdict: Verdict,
    /// The comment posted to the pull request, if any.
    pub report: Option<String>,
}

impl VcrOutcome {
    pub fn terminal(&self) -> Option<TerminalState> {
        self.state.terminal
    }
}

pub struct VcrOrchestrator {
    config: VcrConfig,
    rules: SurfaceRules,
    runner: Arc<dyn TestRunner>,
    cassettes: Arc<dyn CassetteStore>,
    logs: Arc<dyn LogStore>,
    review: Arc<dyn ReviewPlatform>,
}

impl VcrOrchestrator {
    pub fn new(
        config: VcrConfig,
        runner: Arc<dyn TestRunner>,
        cassettes: Arc<dyn CassetteStore>,
        logs: Arc<dyn LogStore>,
        review: Arc<dyn ReviewPlatform>,
    ) -> Self {
        let rules = SurfaceRules::for_version(config.version);
        Self {
            config,
            rules,
            runner,
            cassettes,
            logs,
            review,
        }
    }

    /// Replace the path rules used for change-surface analysis.
    pub fn with_rules(mut self, rules: SurfaceRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &VcrConfig {
        &self.config
    }

    /// Run the full replay/record cycle for one change.
    ///
    /// A change that touches nothing test-relevant finishes immediately in
    /// [`TerminalState::NothingToTest`] without posting anything. A failed
    /// cassette fetch aborts before any status is posted; later collaborator
    /// and launch failures abort with [`VcrError::Setup`] after a best-effort
    /// failure status.
    pub async fn run(&self, request: &VcrRequest) -> Result<VcrOutcome> {
        let surface = compute_surface(&request.changed_files, &self.rules);
        let state = OrchestrationState::new(surface);
        let span = run_span(&state.run_id.to_string(), &request.target.number);
        self.run_in_span(request, state).instrument(span).await
    }

    async fn run_in_span(&self, request: &VcrRequest, mut state: OrchestrationState) -> Result<VcrOutcome> {
        let run_id = state.run_id.to_string();
        emit_surface_computed(&run_id, &state.surface);

        if state.surface.is_empty() {
            info!("no test-relevant files changed, skipping VCR");
            state.finish(TerminalState::NothingToTest);
            return Ok(self.finish(state, None));
        }

        let cassette_dir = self
            .cassettes
            .fetch(
                self.config.version,
                &self.config.base_branch,
                Some(&request.target.head_ref()),
            )
            .await
            .map_err(|e| VcrError::setup("cassette fetch", e))?;

        self.post_status(&request.target, &run_id, BuildState::Pending).await;

        match self.drive(request, &mut state, &cassette_dir).await {
            Ok(report) => Ok(self.finish(state, report)),
            Err(e) => {
                self.post_status(&request.target, &run_id, BuildState::Failure).await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        request: &VcrRequest,
        state: &mut OrchestrationState,
        cassette_dir: &Path,
    ) -> Result<Option<String>> {
        let target = &request.target;
        let run_id = state.run_id.to_string();
        let head = target.head_ref();
        let ctx = ReportContext::new(&self.config, target);

        // Replay
        let replay = self.replay_surface(state, cassette_dir, &run_id).await?;
        self.upload_logs(&run_id, &head, TestRunMode::Replaying, false, false).await;
        let replay_failed = replay.result.failed_tests();
        let replay_crashed = replay.result.has_crashed();
        state.replay = Some(replay);

        if replay_crashed {
            warn!("provider crashed while replaying");
            state.finish(TerminalState::ReplayPanicked);
            return self.report(state, &ctx, target).await;
        }

        if let Some(replay) = &state.replay {
            state.non_exercised = not_run_tests(&request.ga_diff, &request.beta_diff, &replay.result);
        }

        if replay_failed.is_empty() {
            state.finish(TerminalState::ReplayedClean);
            return self.report(state, &ctx, target).await;
        }

        // Record
        state.mode = TestRunMode::Recording;
        let options = RunOptions::new(TestRunMode::Recording, self.config.version, cassette_dir)
            .with_test_dirs(state.test_dirs.clone())
            .with_tests(replay_failed);
        emit_phase_started(&run_id, TestRunMode::Recording, true, options.tests.len());
        let record = self.runner.run_parallel(&options).await?;
        emit_phase_finished(&run_id, TestRunMode::Recording, &record.result, record.exit_error.as_deref());
        self.upload_logs(&run_id, &head, TestRunMode::Recording, true, false).await;

        let record_crashed = record.result.has_crashed();
        let recorded = record.result.passed_tests();
        state.record = Some(record);

        if record_crashed {
            warn!("provider crashed while recording");
            state.finish(TerminalState::RecordPanicked);
            return self.report(state, &ctx, target).await;
        }

        if recorded.is_empty() {
            warn!("no tests passed in RECORDING mode, not uploading cassettes");
        } else {
            self.upload_cassettes(state, cassette_dir, &head).await?;

            // Confirm the fresh cassettes replay cleanly.
            state.mode = TestRunMode::Replaying;
            let options = RunOptions::new(TestRunMode::Replaying, self.config.version, cassette_dir)
                .with_test_dirs(state.test_dirs.clone())
                .with_tests(recorded);
            emit_phase_started(&run_id, TestRunMode::Replaying, true, options.tests.len());
            let confirm = self.runner.run_parallel(&options).await?;
            emit_phase_finished(&run_id, TestRunMode::Replaying, &confirm.result, confirm.exit_error.as_deref());
            self.upload_logs(&run_id, &head, TestRunMode::Replaying, true, true).await;
            if confirm.result.has_crashed() {
                warn!("provider crashed while replaying recorded cassettes");
            }
            state.replay_after_record = Some(confirm);
        }

        state.finish(TerminalState::Done);
        self.report(state, &ctx, target).await
    }

    /// Replay every affected package, or the whole repository on a full sweep.
    async fn replay_surface(
        &self,
        state: &mut OrchestrationState,
        cassette_dir: &Path,
        run_id: &str,
    ) -> Result<PhaseRun> {
        let base = RunOptions::new(TestRunMode::Replaying, self.config.version, cassette_dir);
        emit_phase_started(run_id, TestRunMode::Replaying, false, 0);

        let replay = if state.surface.run_full_sweep {
            state.test_dirs.clear();
            self.runner.run(&base).await?
        } else {
            state.test_dirs = state
                .surface
                .affected_packages
                .iter()
                .map(|svc| self.rules.package_dir(svc))
                .collect();
            let mut runs = Vec::with_capacity(state.test_dirs.len());
            for dir in &state.test_dirs {
                let options = base.clone().with_test_dirs(vec![dir.clone()]);
                runs.push(self.runner.run(&options).await?);
            }
            merge_phase_runs(runs)
        };

        emit_phase_finished(run_id, TestRunMode::Replaying, &replay.result, replay.exit_error.as_deref());
        Ok(replay)
    }

    /// Publish recorded cassettes to the change's head overlay. A failed
    /// upload aborts the run.
    async fn upload_cassettes(
        &self,
        state: &mut OrchestrationState,
        cassette_dir: &Path,
        head: &str,
    ) -> Result<()> {
        self.cassettes
            .upload(cassette_dir, &UploadTarget::Head(head.to_string()), self.config.version)
            .await
            .map_err(|e| VcrError::setup("cassette upload", e))?;
        info!(event = "vcr.cassettes_uploaded", run_id = %state.run_id, head);
        state.cassettes_uploaded = true;
        Ok(())
    }

    async fn upload_logs(&self, run_id: &str, head: &str, mode: TestRunMode, parallel: bool, after_recording: bool) {
        let upload = LogUpload {
            mode,
            version: self.config.version,
            destination: LogDestination::Review {
                head: head.to_string(),
                build_id: self.config.build.build_id.clone(),
            },
            parallel,
            after_recording,
        };
        if let Err(e) = self.logs.upload_logs(&upload).await {
            emit_side_effect_failed(run_id, "log upload", &e);
        }
    }

    async fn post_status(&self, target: &ReviewTarget, run_id: &str, state: BuildState) {
        let url = self.config.build.status_target_url();
        match self
            .review
            .post_status(target, &self.config.check_name, state, &url)
            .await
        {
            Ok(()) => emit_status_posted(run_id, state),
            Err(e) => emit_side_effect_failed(run_id, "status post", &e),
        }
    }

    /// Post the comment and the final status for a terminal state.
    async fn report(
        &self,
        state: &OrchestrationState,
        ctx: &ReportContext,
        target: &ReviewTarget,
    ) -> Result<Option<String>> {
        let run_id = state.run_id.to_string();
        let report = render_report(state, ctx);
        if let Some(text) = &report {
            if let Err(e) = self.review.post_report(target, text).await {
                emit_side_effect_failed(&run_id, "report post", &e);
            }
        }
        let verdict = VcrGate::evaluate(state);
        self.post_status(target, &run_id, verdict.build_state()).await;
        Ok(report)
    }

    fn finish(&self, state: OrchestrationState, report: Option<String>) -> VcrOutcome {
        let verdict = if state.terminal == Some(TerminalState::NothingToTest) {
            Verdict {
                passed: true,
                violations: Vec::new(),
                message: "Nothing to test".to_string(),
            }
        } else {
            VcrGate::evaluate(&state)
        };
        let duration_ms = (chrono::Utc::now() - state.started_at).num_milliseconds();
        if let Some(terminal) = state.terminal {
            emit_run_finished(&state.run_id.to_string(), terminal, verdict.passed, duration_ms);
        }
        for violation in &verdict.violations {
            info!(violation = %violation, "VCR violation");
        }
        VcrOutcome {
            state,
            verdict,
            report,
        }
    }
}
