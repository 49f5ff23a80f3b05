//! Magician VCR execution
//!
//! Drives `go test` in REPLAYING and RECORDING mode and sequences the
//! presubmit record/replay cycle and the nightly cassette refresh on top of
//! the collaborator traits from `magician-services`.

pub mod error;
pub mod exec;
pub mod fakes;
pub mod invocation;
pub mod nightly;
pub mod orchestrator;
pub mod parse;
pub mod runner;

pub use error::RunnerError;
pub use exec::{execute, CommandOutput, CommandSpec};
pub use nightly::{CassetteUpdate, CassetteUpdateOutcome, CassetteUpdateRequest};
pub use orchestrator::{VcrOrchestrator, VcrOutcome, VcrRequest};
pub use parse::{parse_test_output, unexplained_exit};
pub use runner::{GoTestRunner, RunOptions, TestRunner};
