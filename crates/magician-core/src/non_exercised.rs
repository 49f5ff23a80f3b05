//! Tests added by a change that VCR never ran.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::domain::RunResult;

fn added_test_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\+func (TestAcc\w+)\(t \*testing\.T\) \{").expect("static regex")
    })
}

/// Acceptance tests whose function declaration was added in `diff`.
///
/// Commented-out declarations (`+//func ...`) do not count.
pub fn added_tests(diff: &str) -> BTreeSet<String> {
    added_test_regex()
        .captures_iter(diff)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonExercisedTests {
    /// Added to the beta provider but absent from the replay results.
    pub not_run_beta: Vec<String>,

    /// Added to GA only, so the beta VCR run can never exercise them.
    pub not_run_ga: Vec<String>,
}

impl NonExercisedTests {
    pub fn is_empty(&self) -> bool {
        self.not_run_beta.is_empty() && self.not_run_ga.is_empty()
    }
}

pub fn not_run_tests(ga_diff: &str, beta_diff: &str, replay: &RunResult) -> NonExercisedTests {
    let beta_added = added_tests(beta_diff);
    let ga_added = added_tests(ga_diff);

    let not_run_beta = beta_added
        .iter()
        .filter(|t| !replay.passed.contains(*t) && !replay.failed.contains(*t))
        .cloned()
        .collect();
    let not_run_ga = ga_added.difference(&beta_added).cloned().collect();

    NonExercisedTests {
        not_run_beta,
        not_run_ga,
    }
}
