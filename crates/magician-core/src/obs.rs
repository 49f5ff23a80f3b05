//! Structured lifecycle events for VCR runs.
//!
//! Every event carries an `event` field so runs can be followed in JSON logs
//! by filtering on `event = "vcr.*"`.

use tracing::{info, warn};

use crate::domain::{BuildState, RunResult, TerminalState, TestRunMode};
use crate::surface::ChangeSurface;

/// Span covering one orchestrated run. Attach with `Instrument::instrument`.
pub fn run_span(run_id: &str, pr_number: &str) -> tracing::Span {
    tracing::info_span!("vcr.run", run_id = %run_id, pr = %pr_number)
}

pub fn emit_surface_computed(run_id: &str, surface: &ChangeSurface) {
    info!(
        event = "vcr.surface_computed",
        run_id = %run_id,
        full_sweep = surface.run_full_sweep,
        packages = surface.affected_packages.len(),
    );
}

pub fn emit_phase_started(run_id: &str, mode: TestRunMode, parallel: bool, tests: usize) {
    info!(
        event = "vcr.phase_started",
        run_id = %run_id,
        mode = %mode.upper(),
        parallel = parallel,
        tests = tests,
    );
}

pub fn emit_phase_finished(run_id: &str, mode: TestRunMode, result: &RunResult, exit_error: Option<&str>) {
    info!(
        event = "vcr.phase_finished",
        run_id = %run_id,
        mode = %mode.upper(),
        passed = result.passed.len(),
        failed = result.failed.len(),
        skipped = result.skipped.len(),
        crashed = result.has_crashed(),
        exit_error = exit_error.unwrap_or(""),
    );
}

pub fn emit_status_posted(run_id: &str, state: BuildState) {
    info!(event = "vcr.status_posted", run_id = %run_id, state = state.as_str());
}

pub fn emit_run_finished(run_id: &str, terminal: TerminalState, passed: bool, duration_ms: i64) {
    info!(
        event = "vcr.run_finished",
        run_id = %run_id,
        terminal = ?terminal,
        passed = passed,
        duration_ms = duration_ms,
    );
}

/// Non-fatal side-effect failure (log upload, report posting).
pub fn emit_side_effect_failed(run_id: &str, action: &str, error: &dyn std::fmt::Display) {
    warn!(event = "vcr.side_effect_failed", run_id = %run_id, action = action, error = %error);
}
