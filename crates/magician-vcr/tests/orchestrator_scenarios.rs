//! End-to-end orchestration scenarios against in-memory collaborators.

use std::sync::Arc;

use magician_core::{
    BuildIdentity, BuildState, PhaseRun, ProviderVersion, ReviewTarget, RunResult, SurfaceRules,
    TerminalState, TestRunMode, VcrConfig, VcrError, WorkspaceLayout,
};
use magician_services::fakes::{MemoryCassetteStore, MemoryLogStore, MemoryReviewPlatform};
use magician_services::{LogDestination, UploadTarget};
use magician_vcr::fakes::ScriptedRunner;
use magician_vcr::{VcrOrchestrator, VcrRequest};

const CASSETTES: &str = "/work/cassettes/beta";

struct Harness {
    runner: Arc<ScriptedRunner>,
    cassettes: Arc<MemoryCassetteStore>,
    logs: Arc<MemoryLogStore>,
    review: Arc<MemoryReviewPlatform>,
}

impl Harness {
    fn new(runner: ScriptedRunner) -> Self {
        Self::with_store(runner, MemoryCassetteStore::new(CASSETTES))
    }

    fn with_store(runner: ScriptedRunner, store: MemoryCassetteStore) -> Self {
        Self {
            runner: Arc::new(runner),
            cassettes: Arc::new(store),
            logs: Arc::new(MemoryLogStore::new()),
            review: Arc::new(MemoryReviewPlatform::new()),
        }
    }

    fn orchestrator(&self) -> VcrOrchestrator {
        let config = VcrConfig::new(
            ProviderVersion::Beta,
            WorkspaceLayout::new("/work", "/work/tpgb"),
            Default::default(),
        )
        .with_build(BuildIdentity {
            build_id: "build-1".to_string(),
            project_id: "graphite-docker-images".to_string(),
            build_step: "17".to_string(),
        });
        VcrOrchestrator::new(
            config,
            self.runner.clone(),
            self.cassettes.clone(),
            self.logs.clone(),
            self.review.clone(),
        )
    }
}

fn request(files: &[&str]) -> VcrRequest {
    VcrRequest::new(
        ReviewTarget::new("1234", "abc123"),
        files.iter().map(|f| f.to_string()).collect(),
    )
}

fn compute_change() -> VcrRequest {
    request(&["google-beta/services/compute/resource_compute_instance.go"])
}

fn passed(names: &[&str]) -> PhaseRun {
    PhaseRun::new(RunResult::new().with_passed(names.iter().copied()))
}

/// Test: clean replay posts the analytics report and a success status
#[tokio::test]
async fn test_clean_replay() {
    let runner = ScriptedRunner::new().on_run(passed(&["TestAccFoo_x", "TestAccFoo_y"]));
    let h = Harness::new(runner);
    let rules = SurfaceRules {
        service_roots: vec!["services/".to_string()],
        ignored_files: Default::default(),
    };

    let outcome = h
        .orchestrator()
        .with_rules(rules)
        .run(&request(&["services/compute/resource_foo.go"]))
        .await
        .expect("run failed");

    assert_eq!(outcome.terminal(), Some(TerminalState::ReplayedClean));
    assert!(outcome.verdict.passed);
    assert_eq!(h.review.states(), vec![BuildState::Pending, BuildState::Success]);

    let calls = h.runner.calls();
    assert_eq!(calls.len(), 1, "no recording after a clean replay");
    assert!(!calls[0].parallel);
    assert_eq!(calls[0].options.mode, TestRunMode::Replaying);
    assert_eq!(calls[0].options.test_dirs, vec!["./services/compute"]);

    let reports = h.review.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("Total tests: 2"));
    assert!(reports[0].contains("All tests passed!"));
    assert!(h.cassettes.uploads().is_empty());

    let fetches = h.cassettes.fetches();
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].base_branch, "main");
    assert_eq!(fetches[0].head.as_deref(), Some("auto-pr-1234"));
}

/// Test: beta layout maps service files onto provider packages
#[tokio::test]
async fn test_beta_layout_package_dirs() {
    let h = Harness::new(ScriptedRunner::new().on_run(passed(&["TestAccComputeInstance_basic"])));

    h.orchestrator().run(&compute_change()).await.expect("run failed");

    let calls = h.runner.calls();
    assert_eq!(calls[0].options.test_dirs, vec!["./google-beta/services/compute"]);
}

/// Test: replay failures recovered by recording upload cassettes to the head
#[tokio::test]
async fn test_failures_recovered_by_recording() {
    let runner = ScriptedRunner::new()
        .on_run(PhaseRun::new(
            RunResult::new()
                .with_passed(["TestAccComputeInstance_basic"])
                .with_failed(["TestAccComputeDisk_update"]),
        ))
        .on_run_parallel(passed(&["TestAccComputeDisk_update"]))
        .on_run_parallel(passed(&["TestAccComputeDisk_update"]));
    let h = Harness::new(runner);

    let outcome = h.orchestrator().run(&compute_change()).await.expect("run failed");

    assert_eq!(outcome.terminal(), Some(TerminalState::Done));
    assert!(outcome.verdict.passed, "{:?}", outcome.verdict.violations);
    assert!(outcome.state.cassettes_uploaded);

    let calls = h.runner.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].options.mode, TestRunMode::Recording);
    assert!(calls[1].parallel);
    assert_eq!(calls[1].options.tests, vec!["TestAccComputeDisk_update"]);
    assert_eq!(calls[1].options.test_dirs, vec!["./google-beta/services/compute"]);
    assert_eq!(calls[2].options.mode, TestRunMode::Replaying);
    assert_eq!(calls[2].options.tests, vec!["TestAccComputeDisk_update"]);

    let uploads = h.cassettes.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].target, UploadTarget::Head("auto-pr-1234".to_string()));

    let report = &h.review.reports()[0];
    assert!(report.contains("Found 1 affected test(s)"));
    assert!(report.contains("Tests passed during RECORDING mode:"));
    assert!(report.contains("No issues found for passed tests after REPLAYING rerun."));
    assert_eq!(h.review.states(), vec![BuildState::Pending, BuildState::Success]);
}

/// Test: a panic while replaying posts a crash report and stops
#[tokio::test]
async fn test_replay_panic() {
    let runner = ScriptedRunner::new().on_run(PhaseRun::new(
        RunResult::new()
            .with_failed(["TestAccComputeDisk_update"])
            .with_panic("panic: runtime error: index out of range"),
    ));
    let h = Harness::new(runner);

    let outcome = h.orchestrator().run(&compute_change()).await.expect("run failed");

    assert_eq!(outcome.terminal(), Some(TerminalState::ReplayPanicked));
    assert!(!outcome.verdict.passed);
    assert_eq!(h.runner.calls().len(), 1, "no recording after a crash");
    assert!(h.review.reports()[0]
        .contains("The provider crashed while running the VCR tests in REPLAYING mode"));
    assert_eq!(h.review.states(), vec![BuildState::Pending, BuildState::Failure]);
}

/// Test: recording that loses tests is reported as terminated
#[tokio::test]
async fn test_terminated_recording() {
    let runner = ScriptedRunner::new()
        .on_run(PhaseRun::new(
            RunResult::new().with_failed(["TestAccA", "TestAccB", "TestAccC"]),
        ))
        .on_run_parallel(passed(&["TestAccA"]))
        .on_run_parallel(passed(&["TestAccA"]));
    let h = Harness::new(runner);

    let outcome = h.orchestrator().run(&compute_change()).await.expect("run failed");

    assert_eq!(outcome.terminal(), Some(TerminalState::Done));
    assert!(outcome.state.has_terminated_tests());
    assert!(!outcome.verdict.passed);
    assert!(outcome
        .verdict
        .violations
        .iter()
        .any(|v| v == "RECORDING mode accounted for 1 of 3 test(s)"));
    assert!(h.review.reports()[0].contains("Several tests got terminated during RECORDING mode."));
    assert_eq!(h.review.states().last(), Some(&BuildState::Failure));
}

/// Test: documentation-only change posts nothing and runs nothing
#[tokio::test]
async fn test_docs_only_change() {
    let h = Harness::new(ScriptedRunner::new());

    let outcome = h
        .orchestrator()
        .run(&request(&["website/docs/r/compute_instance.html.markdown", "README.md"]))
        .await
        .expect("run failed");

    assert_eq!(outcome.terminal(), Some(TerminalState::NothingToTest));
    assert!(outcome.report.is_none());
    assert!(h.runner.calls().is_empty());
    assert!(h.cassettes.fetches().is_empty());
    assert!(h.review.statuses().is_empty());
    assert!(h.review.reports().is_empty());
}

/// Test: change outside service packages replays everything in one process
#[tokio::test]
async fn test_full_sweep() {
    let h = Harness::new(ScriptedRunner::new().on_run(passed(&["TestAccA"])));

    let outcome = h
        .orchestrator()
        .run(&request(&["google-beta/transport/transport.go"]))
        .await
        .expect("run failed");

    assert!(outcome.state.surface.run_full_sweep);
    let calls = h.runner.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].options.test_dirs.is_empty());
    assert!(h.review.reports()[0].contains("All service packages are affected"));
}

/// Test: every affected package is replayed separately and merged
#[tokio::test]
async fn test_per_package_replay_merges() {
    let runner = ScriptedRunner::new()
        .on_run(passed(&["TestAccComputeInstance_basic"]))
        .on_run(passed(&["TestAccStorageBucket_basic"]));
    let h = Harness::new(runner);

    let outcome = h
        .orchestrator()
        .run(&request(&[
            "google-beta/services/storage/resource_storage_bucket.go",
            "google-beta/services/compute/resource_compute_instance.go",
        ]))
        .await
        .expect("run failed");

    let dirs: Vec<_> = h
        .runner
        .calls()
        .into_iter()
        .flat_map(|c| c.options.test_dirs)
        .collect();
    assert_eq!(
        dirs,
        vec!["./google-beta/services/compute", "./google-beta/services/storage"]
    );
    let replay = outcome.state.replay.expect("replay");
    assert_eq!(replay.result.passed.len(), 2);
}

/// Test: fetch failure aborts without posting anything
#[tokio::test]
async fn test_fetch_failure_is_fatal() {
    let h = Harness::with_store(ScriptedRunner::new(), MemoryCassetteStore::failing());

    let err = h
        .orchestrator()
        .run(&compute_change())
        .await
        .expect_err("fetch should fail");

    assert!(matches!(err, VcrError::Setup { ref stage, .. } if stage == "cassette fetch"));
    assert!(h.runner.calls().is_empty());
    assert!(h.review.statuses().is_empty());
}

/// Test: launch failure after the pending status posts a failure status
#[tokio::test]
async fn test_launch_failure_posts_failure() {
    let h = Harness::new(ScriptedRunner::new().fail_run("go: executable file not found"));

    let err = h
        .orchestrator()
        .run(&compute_change())
        .await
        .expect_err("launch should fail");

    assert!(matches!(err, VcrError::Setup { .. }));
    assert_eq!(h.review.states(), vec![BuildState::Pending, BuildState::Failure]);
    assert!(h.review.reports().is_empty());
}

/// Test: a crash while replaying fresh cassettes fails the run
#[tokio::test]
async fn test_confirming_replay_panic() {
    let runner = ScriptedRunner::new()
        .on_run(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])))
        .on_run_parallel(passed(&["TestAccA"]))
        .on_run_parallel(PhaseRun::new(
            RunResult::new().with_panic("panic: assignment to entry in nil map"),
        ));
    let h = Harness::new(runner);

    let outcome = h.orchestrator().run(&compute_change()).await.expect("run failed");

    assert_eq!(outcome.terminal(), Some(TerminalState::Done));
    assert!(!outcome.verdict.passed);
    assert_eq!(h.review.states(), vec![BuildState::Pending, BuildState::Failure]);

    let report = &h.review.reports()[0];
    assert!(report.contains("The provider crashed while running the VCR tests in REPLAYING mode"));
    assert!(!report.contains("No issues found for passed tests after REPLAYING rerun."));
    assert!(!report.contains("All tests passed!"));
}

/// Test: a failed cassette upload aborts before the confirming replay
#[tokio::test]
async fn test_cassette_upload_failure_is_fatal() {
    let runner = ScriptedRunner::new()
        .on_run(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])))
        .on_run_parallel(passed(&["TestAccA"]));
    let h = Harness::with_store(
        runner,
        MemoryCassetteStore::new(CASSETTES).with_failing_upload(),
    );

    let err = h
        .orchestrator()
        .run(&compute_change())
        .await
        .expect_err("upload should fail");

    assert!(matches!(err, VcrError::Setup { ref stage, .. } if stage == "cassette upload"));
    assert_eq!(h.runner.calls().len(), 2, "no confirming replay");
    assert!(h.review.reports().is_empty());
    assert_eq!(h.review.states(), vec![BuildState::Pending, BuildState::Failure]);
}

/// Test: a panic while recording skips the cassette upload
#[tokio::test]
async fn test_record_panic() {
    let runner = ScriptedRunner::new()
        .on_run(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])))
        .on_run_parallel(PhaseRun::new(
            RunResult::new()
                .with_passed(["TestAccA"])
                .with_panic("panic: assignment to entry in nil map"),
        ));
    let h = Harness::new(runner);

    let outcome = h.orchestrator().run(&compute_change()).await.expect("run failed");

    assert_eq!(outcome.terminal(), Some(TerminalState::RecordPanicked));
    assert!(h.cassettes.uploads().is_empty());
    assert_eq!(h.runner.calls().len(), 2);
    assert!(h.review.reports()[0]
        .contains("The provider crashed while running the VCR tests in RECORDING mode"));
    assert_eq!(h.review.states().last(), Some(&BuildState::Failure));
}

/// Test: a recorded test that fails the confirming replay fails the run
#[tokio::test]
async fn test_non_deterministic_test_fails() {
    let runner = ScriptedRunner::new()
        .on_run(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])))
        .on_run_parallel(passed(&["TestAccA"]))
        .on_run_parallel(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])));
    let h = Harness::new(runner);

    let outcome = h.orchestrator().run(&compute_change()).await.expect("run failed");

    assert_eq!(outcome.state.non_deterministic_tests(), vec!["TestAccA"]);
    assert!(!outcome.verdict.passed);
    assert!(outcome.state.cassettes_uploaded);
    let report = &h.review.reports()[0];
    assert!(report.contains("Tests failed when rerunning REPLAYING mode:"));
    assert!(!report.contains("All tests passed!"));
    assert_eq!(h.review.states().last(), Some(&BuildState::Failure));
}

/// Test: nothing recorded means no upload and no confirming replay
#[tokio::test]
async fn test_recording_all_failed() {
    let runner = ScriptedRunner::new()
        .on_run(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])))
        .on_run_parallel(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])));
    let h = Harness::new(runner);

    let outcome = h.orchestrator().run(&compute_change()).await.expect("run failed");

    assert_eq!(outcome.terminal(), Some(TerminalState::Done));
    assert!(outcome.state.replay_after_record.is_none());
    assert!(h.cassettes.uploads().is_empty());
    assert_eq!(h.runner.calls().len(), 2);
    assert!(h.review.reports()[0].contains("Tests failed during RECORDING mode:"));
    assert!(!outcome.verdict.passed);
}

/// Test: logs are uploaded after each phase to the review artifacts
#[tokio::test]
async fn test_log_upload_sequence() {
    let runner = ScriptedRunner::new()
        .on_run(PhaseRun::new(RunResult::new().with_failed(["TestAccA"])))
        .on_run_parallel(passed(&["TestAccA"]))
        .on_run_parallel(passed(&["TestAccA"]));
    let h = Harness::new(runner);

    h.orchestrator().run(&compute_change()).await.expect("run failed");

    let uploads = h.logs.uploads();
    let phases: Vec<_> = uploads
        .iter()
        .map(|u| (u.mode, u.parallel, u.after_recording))
        .collect();
    assert_eq!(
        phases,
        vec![
            (TestRunMode::Replaying, false, false),
            (TestRunMode::Recording, true, false),
            (TestRunMode::Replaying, true, true),
        ]
    );
    assert!(uploads.iter().all(|u| u.destination
        == LogDestination::Review {
            head: "auto-pr-1234".to_string(),
            build_id: "build-1".to_string(),
        }));
}

/// Test: added tests that replay never ran are listed as non-exercised
#[tokio::test]
async fn test_non_exercised_tests_reported() {
    let beta_diff = "+func TestAccComputeInstance_new(t *testing.T) {\n";
    let h = Harness::new(ScriptedRunner::new().on_run(passed(&["TestAccComputeInstance_basic"])));

    let outcome = h
        .orchestrator()
        .run(&compute_change().with_diffs("", beta_diff))
        .await
        .expect("run failed");

    assert_eq!(
        outcome.state.non_exercised.not_run_beta,
        vec!["TestAccComputeInstance_new"]
    );
    assert!(h.review.reports()[0].contains("#### Non-exercised tests"));
}
