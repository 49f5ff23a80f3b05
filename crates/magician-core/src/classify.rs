//! Aggregation and crash/termination checks over phase results.

use crate::domain::{PhaseRun, RunResult};

/// Union of several results. Commutative and associative.
pub fn merge<I>(results: I) -> RunResult
where
    I: IntoIterator<Item = RunResult>,
{
    results.into_iter().fold(RunResult::new(), |mut acc, r| {
        acc.absorb(r);
        acc
    })
}

/// Merge phase runs; the first captured exit error is kept.
pub fn merge_phase_runs<I>(runs: I) -> PhaseRun
where
    I: IntoIterator<Item = PhaseRun>,
{
    let mut merged = PhaseRun::default();
    for run in runs {
        merged.result.absorb(run.result);
        if merged.exit_error.is_none() {
            merged.exit_error = run.exit_error;
        }
    }
    merged
}

pub fn has_crashed(result: &RunResult) -> bool {
    result.has_crashed()
}

/// Heuristic: the recording phase accounted for fewer tests than it was asked
/// to record, so some workers must have died without reporting.
pub fn has_terminated_tests(replay: &RunResult, record: &RunResult) -> bool {
    record.passed.len() + record.failed.len() < replay.failed.len()
}
