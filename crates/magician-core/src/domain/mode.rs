//! Test execution modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the provider test binary reads cassettes or talks to live APIs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestRunMode {
    /// Only reads cassettes; no live API calls.
    Replaying,

    /// Makes live API calls and writes fresh cassettes.
    Recording,
}

impl TestRunMode {
    /// Lowercase name, used in log file and bucket paths.
    pub fn lower(&self) -> &'static str {
        match self {
            TestRunMode::Replaying => "replaying",
            TestRunMode::Recording => "recording",
        }
    }

    /// Uppercase name, the value of `VCR_MODE` and the wording used in reports.
    pub fn upper(&self) -> &'static str {
        match self {
            TestRunMode::Replaying => "REPLAYING",
            TestRunMode::Recording => "RECORDING",
        }
    }
}

impl fmt::Display for TestRunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lower())
    }
}
