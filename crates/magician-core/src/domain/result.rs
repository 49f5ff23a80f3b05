//! Per-phase test outcomes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outcome of a single test as reported by `go test -v`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TestOutcome {
    Pass,
    Fail,
    Skip,
}

/// Classified result of one execution phase.
///
/// The three name sets are kept pairwise disjoint. When the same test is
/// reported with different outcomes (retries, merged worker output) a failure
/// wins over a pass, and a pass wins over a skip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub passed: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub skipped: BTreeSet<String>,

    /// Raw `panic:` lines; a non-empty list means the binary crashed.
    pub panics: Vec<String>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome for `name`, honouring fail > pass > skip.
    pub fn record(&mut self, outcome: TestOutcome, name: impl Into<String>) {
        let name = name.into();
        match outcome {
            TestOutcome::Fail => {
                self.passed.remove(&name);
                self.skipped.remove(&name);
                self.failed.insert(name);
            }
            TestOutcome::Pass => {
                if !self.failed.contains(&name) {
                    self.skipped.remove(&name);
                    self.passed.insert(name);
                }
            }
            TestOutcome::Skip => {
                if !self.failed.contains(&name) && !self.passed.contains(&name) {
                    self.skipped.insert(name);
                }
            }
        }
    }

    pub fn with_passed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.record(TestOutcome::Pass, name);
        }
        self
    }

    pub fn with_failed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.record(TestOutcome::Fail, name);
        }
        self
    }

    pub fn with_skipped<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.record(TestOutcome::Skip, name);
        }
        self
    }

    pub fn with_panic(mut self, line: impl Into<String>) -> Self {
        self.panics.push(line.into());
        self
    }

    /// Union of two results, applying the same precedence as [`RunResult::record`].
    pub fn absorb(&mut self, other: RunResult) {
        for name in other.skipped {
            self.record(TestOutcome::Skip, name);
        }
        for name in other.passed {
            self.record(TestOutcome::Pass, name);
        }
        for name in other.failed {
            self.record(TestOutcome::Fail, name);
        }
        self.panics.extend(other.panics);
    }

    /// Tests that produced a result line of any kind.
    pub fn total(&self) -> usize {
        self.passed.len() + self.failed.len() + self.skipped.len()
    }

    pub fn has_crashed(&self) -> bool {
        !self.panics.is_empty()
    }

    pub fn failed_tests(&self) -> Vec<String> {
        self.failed.iter().cloned().collect()
    }

    pub fn passed_tests(&self) -> Vec<String> {
        self.passed.iter().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.passed.contains(name) || self.failed.contains(name) || self.skipped.contains(name)
    }
}

/// A phase's result together with a non-test failure of the test process.
///
/// `exit_error` carries a build failure, a timeout or a non-zero exit that no
/// test line explains. It never aborts orchestration on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRun {
    pub result: RunResult,
    pub exit_error: Option<String>,
}

impl PhaseRun {
    pub fn new(result: RunResult) -> Self {
        Self {
            result,
            exit_error: None,
        }
    }

    pub fn with_error(mut self, err: impl Into<String>) -> Self {
        self.exit_error = Some(err.into());
        self
    }

    pub fn is_clean(&self) -> bool {
        self.result.failed.is_empty() && !self.result.has_crashed() && self.exit_error.is_none()
    }
}
