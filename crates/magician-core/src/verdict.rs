//! Final pass/fail evaluation of a VCR run.

use serde::{Deserialize, Serialize};

use crate::domain::{BuildState, OrchestrationState};

/// Outcome of evaluating a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,

    /// Reasons the run failed (empty if passed).
    pub violations: Vec<String>,

    pub message: String,
}

impl Verdict {
    pub fn build_state(&self) -> BuildState {
        if self.passed {
            BuildState::Success
        } else {
            BuildState::Failure
        }
    }
}

pub struct VcrGate;

impl VcrGate {
    /// Evaluate a run.
    ///
    /// Rules:
    /// - A crash in any phase fails the run
    /// - A clean replay (no failures, no process error) passes
    /// - Otherwise recording must report no failures, no terminated tests and
    ///   no process error, and every test it recorded must pass the
    ///   confirming replay
    pub fn evaluate(state: &OrchestrationState) -> Verdict {
        let mut violations = Vec::new();

        match &state.replay {
            None => violations.push("Replay phase did not run".to_string()),
            Some(replay) if replay.result.has_crashed() => {
                violations.push("Provider crashed during REPLAYING mode".to_string());
            }
            Some(replay) if replay.result.failed.is_empty() => {
                if let Some(err) = &replay.exit_error {
                    violations.push(format!("REPLAYING mode error: {err}"));
                }
            }
            Some(replay) => Self::evaluate_recording(state, replay.result.failed.len(), &mut violations),
        }

        let passed = violations.is_empty();
        let message = if passed {
            "All tests passed".to_string()
        } else {
            format!("VCR failed with {} violation(s)", violations.len())
        };

        Verdict {
            passed,
            violations,
            message,
        }
    }

    fn evaluate_recording(state: &OrchestrationState, replay_failures: usize, violations: &mut Vec<String>) {
        let Some(record) = &state.record else {
            violations.push(format!(
                "{replay_failures} test(s) failed in REPLAYING mode and were never recorded"
            ));
            return;
        };

        if record.result.has_crashed() {
            violations.push("Provider crashed during RECORDING mode".to_string());
            return;
        }
        if !record.result.failed.is_empty() {
            violations.push(format!(
                "{} test(s) failed in RECORDING mode",
                record.result.failed.len()
            ));
        }
        if state.has_terminated_tests() {
            violations.push(format!(
                "RECORDING mode accounted for {} of {} test(s)",
                record.result.passed.len() + record.result.failed.len(),
                replay_failures
            ));
        }
        if let Some(err) = &record.exit_error {
            violations.push(format!("RECORDING mode error: {err}"));
        }

        if record.result.passed.is_empty() {
            return;
        }
        match &state.replay_after_record {
            None => violations.push("Recorded tests were never replayed".to_string()),
            Some(confirm) if confirm.result.has_crashed() => {
                violations.push("Provider crashed during REPLAYING mode after recording".to_string());
            }
            Some(confirm) => {
                if !confirm.result.failed.is_empty() {
                    violations.push(format!(
                        "{} test(s) are non-deterministic when replayed",
                        confirm.result.failed.len()
                    ));
                }
                if let Some(err) = &confirm.exit_error {
                    violations.push(format!("REPLAYING mode error after recording: {err}"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PhaseRun, RunResult};
    use crate::surface::ChangeSurface;

    fn state_with_replay(replay: PhaseRun) -> OrchestrationState {
        let mut state = OrchestrationState::new(ChangeSurface::packages(["compute"]));
        state.replay = Some(replay);
        state
    }

    #[test]
    fn test_clean_replay_passes() {
        let state = state_with_replay(PhaseRun::new(RunResult::new().with_passed(["TestAccA"])));
        let verdict = VcrGate::evaluate(&state);
        assert!(verdict.passed);
        assert_eq!(verdict.build_state(), BuildState::Success);
    }

    #[test]
    fn test_replay_error_fails() {
        let state = state_with_replay(PhaseRun::new(RunResult::new()).with_error("build failed"));
        let verdict = VcrGate::evaluate(&state);
        assert!(!verdict.passed);
        assert_eq!(verdict.violations, vec!["REPLAYING mode error: build failed"]);
    }

    #[test]
    fn test_recovered_by_recording() {
        let mut state = state_with_replay(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])));
        state.record = Some(PhaseRun::new(RunResult::new().with_passed(["TestAccA"])));
        state.replay_after_record = Some(PhaseRun::new(RunResult::new().with_passed(["TestAccA"])));
        assert!(VcrGate::evaluate(&state).passed);
    }

    #[test]
    fn test_non_deterministic_fails() {
        let mut state = state_with_replay(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])));
        state.record = Some(PhaseRun::new(RunResult::new().with_passed(["TestAccA"])));
        state.replay_after_record = Some(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])));
        let verdict = VcrGate::evaluate(&state);
        assert!(!verdict.passed);
        assert_eq!(verdict.violations.len(), 1);
    }

    #[test]
    fn test_terminated_tests_fail() {
        let mut state = state_with_replay(PhaseRun::new(
            RunResult::new().with_failed(["TestAccA", "TestAccB", "TestAccC"]),
        ));
        state.record = Some(PhaseRun::new(RunResult::new().with_passed(["TestAccA"])));
        state.replay_after_record = Some(PhaseRun::new(RunResult::new().with_passed(["TestAccA"])));
        let verdict = VcrGate::evaluate(&state);
        assert!(!verdict.passed);
        assert!(verdict.violations[0].contains("1 of 3"));
    }

    #[test]
    fn test_confirming_replay_crash_fails() {
        let mut state = state_with_replay(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])));
        state.record = Some(PhaseRun::new(RunResult::new().with_passed(["TestAccA"])));
        state.replay_after_record = Some(PhaseRun::new(
            RunResult::new().with_passed(["TestAccA"]).with_panic("panic: assignment to entry in nil map"),
        ));
        let verdict = VcrGate::evaluate(&state);
        assert!(!verdict.passed);
        assert_eq!(
            verdict.violations,
            vec!["Provider crashed during REPLAYING mode after recording"]
        );
    }

    #[test]
    fn test_recording_crash_fails() {
        let mut state = state_with_replay(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])));
        state.record = Some(PhaseRun::new(RunResult::new().with_panic("panic: nil map")));
        let verdict = VcrGate::evaluate(&state);
        assert_eq!(verdict.message, "VCR failed with 1 violation(s)");
    }
}
