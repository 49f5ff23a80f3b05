//! Domain models for VCR orchestration.
//!
//! - `TestRunMode`: replaying or recording
//! - `ProviderVersion`: which generated provider is under test
//! - `RunResult` / `PhaseRun`: classified outcome of one phase
//! - `OrchestrationState`: everything a run has learned so far

pub mod error;
pub mod mode;
pub mod result;
pub mod state;
pub mod version;

pub use error::{Result, VcrError};
pub use mode::TestRunMode;
pub use result::{PhaseRun, RunResult, TestOutcome};
pub use state::{BuildState, OrchestrationState, TerminalState};
pub use version::ProviderVersion;
