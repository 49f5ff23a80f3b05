//! Scripted [`TestRunner`] for driving the orchestrator in tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use magician_core::PhaseRun;

use crate::error::RunnerError;
use crate::runner::{RunOptions, TestRunner};

/// One call received by [`ScriptedRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCall {
    pub parallel: bool,
    pub options: RunOptions,
}

type Scripted = Result<PhaseRun, String>;

/// Runner that answers from queues of canned results.
///
/// `run` and `run_parallel` have separate queues. An `Err` entry becomes a
/// launch failure. An empty queue answers with an empty, clean run.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    runs: Mutex<VecDeque<Scripted>>,
    parallel_runs: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<RunnerCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for the next `run`.
    pub fn on_run(self, run: PhaseRun) -> Self {
        self.runs.lock().unwrap().push_back(Ok(run));
        self
    }

    /// Queue a result for the next `run_parallel`.
    pub fn on_run_parallel(self, run: PhaseRun) -> Self {
        self.parallel_runs.lock().unwrap().push_back(Ok(run));
        self
    }

    /// Make the next `run` fail to launch.
    pub fn fail_run(self, reason: impl Into<String>) -> Self {
        self.runs.lock().unwrap().push_back(Err(reason.into()));
        self
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, queue: &Mutex<VecDeque<Scripted>>, parallel: bool, options: &RunOptions) -> Result<PhaseRun, RunnerError> {
        self.calls.lock().unwrap().push(RunnerCall {
            parallel,
            options: options.clone(),
        });
        match queue.lock().unwrap().pop_front() {
            Some(Ok(run)) => Ok(run),
            Some(Err(reason)) => Err(RunnerError::Launch {
                program: "go".to_string(),
                source: std::io::Error::other(reason),
            }),
            None => Ok(PhaseRun::default()),
        }
    }
}

#[async_trait]
impl TestRunner for ScriptedRunner {
    async fn run(&self, options: &RunOptions) -> Result<PhaseRun, RunnerError> {
        self.answer(&self.runs, false, options)
    }

    async fn run_parallel(&self, options: &RunOptions) -> Result<PhaseRun, RunnerError> {
        self.answer(&self.parallel_runs, true, options)
    }
}
