//! Orchestration state carried through one VCR run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PhaseRun, TestRunMode};
use crate::classify::has_terminated_tests;
use crate::non_exercised::NonExercisedTests;
use crate::surface::ChangeSurface;

/// Commit status reported to the review platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Pending,
    Success,
    Failure,
}

impl BuildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::Pending => "pending",
            BuildState::Success => "success",
            BuildState::Failure => "failure",
        }
    }
}

/// Where a run stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// No test-relevant file changed; nothing ran and nothing was posted.
    NothingToTest,
    ReplayPanicked,
    /// Replay had no failures; recording was skipped.
    ReplayedClean,
    RecordPanicked,
    /// Recording ran, and the confirming replay ran if anything was recorded.
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,

    /// Mode of the phase currently running (or last run).
    pub mode: TestRunMode,
    pub surface: ChangeSurface,

    /// Package directories handed to `go test`; empty for a full sweep.
    pub test_dirs: Vec<String>,

    pub replay: Option<PhaseRun>,
    pub record: Option<PhaseRun>,
    pub replay_after_record: Option<PhaseRun>,

    pub non_exercised: NonExercisedTests,
    pub cassettes_uploaded: bool,
    pub terminal: Option<TerminalState>,
}

impl OrchestrationState {
    pub fn new(surface: ChangeSurface) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            mode: TestRunMode::Replaying,
            surface,
            test_dirs: Vec::new(),
            replay: None,
            record: None,
            replay_after_record: None,
            non_exercised: NonExercisedTests::default(),
            cassettes_uploaded: false,
            terminal: None,
        }
    }

    pub fn finish(&mut self, terminal: TerminalState) {
        self.terminal = Some(terminal);
    }

    /// Recording accounted for fewer tests than replay handed it.
    pub fn has_terminated_tests(&self) -> bool {
        match (&self.replay, &self.record) {
            (Some(replay), Some(record)) => has_terminated_tests(&replay.result, &record.result),
            _ => false,
        }
    }

    /// Tests that recorded fine but failed again when their fresh cassettes
    /// were replayed.
    pub fn non_deterministic_tests(&self) -> Vec<String> {
        self.replay_after_record
            .as_ref()
            .map(|r| r.result.failed_tests())
            .unwrap_or_default()
    }

    /// Recording reported no failures, no terminated tests and no process error.
    pub fn recording_clean(&self) -> bool {
        self.record.as_ref().is_some_and(|record| {
            record.result.failed.is_empty()
                && !record.result.has_crashed()
                && record.exit_error.is_none()
        }) && !self.has_terminated_tests()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunResult;

    #[test]
    fn test_terminated_requires_both_phases() {
        let mut state = OrchestrationState::new(ChangeSurface::full_sweep());
        assert!(!state.has_terminated_tests());

        state.replay = Some(PhaseRun::new(
            RunResult::new().with_failed(["TestAccA", "TestAccB", "TestAccC"]),
        ));
        assert!(!state.has_terminated_tests());

        state.record = Some(PhaseRun::new(RunResult::new().with_passed(["TestAccA"])));
        assert!(state.has_terminated_tests());
        assert!(!state.recording_clean());
    }

    #[test]
    fn test_non_deterministic_tests() {
        let mut state = OrchestrationState::new(ChangeSurface::packages(["compute"]));
        assert!(state.non_deterministic_tests().is_empty());
        state.replay_after_record =
            Some(PhaseRun::new(RunResult::new().with_failed(["TestAccFlaky"])));
        assert_eq!(state.non_deterministic_tests(), vec!["TestAccFlaky"]);
    }

    #[test]
    fn test_build_state_strings() {
        assert_eq!(BuildState::Pending.as_str(), "pending");
        assert_eq!(
            serde_json::to_string(&BuildState::Failure).expect("serialize"),
            "\"failure\""
        );
    }
}
