//! Magician VCR core library
//!
//! Domain model, change-surface analysis, result classification, verdicts and
//! report rendering for record/replay acceptance tests. Everything here is
//! pure; process execution and remote services live in sibling crates.

pub mod classify;
pub mod config;
pub mod domain;
pub mod non_exercised;
pub mod obs;
pub mod report;
pub mod surface;
pub mod telemetry;
pub mod verdict;

pub use classify::{has_crashed, has_terminated_tests, merge, merge_phase_runs};

pub use config::{
    redact_env, BuildIdentity, ParallelismConfig, ReviewTarget, VcrConfig, WorkspaceLayout,
    CASSETTE_UPDATE_ENV_VARS, REQUIRED_ENV_VARS,
};

pub use domain::{
    BuildState, OrchestrationState, PhaseRun, ProviderVersion, Result, RunResult, TerminalState,
    TestOutcome, TestRunMode, VcrError,
};

pub use non_exercised::{added_tests, not_run_tests, NonExercisedTests};

pub use report::{render_report, ReportContext};

pub use surface::{compute_surface, is_test_relevant, ChangeSurface, SurfaceRules};

pub use verdict::{VcrGate, Verdict};
