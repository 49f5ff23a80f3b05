use magician_core::{
    compute_surface, is_test_relevant, merge, ProviderVersion, RunResult, SurfaceRules,
    TestOutcome,
};
use proptest::prelude::*;

fn rules() -> SurfaceRules {
    SurfaceRules::for_version(ProviderVersion::Beta)
}

fn changed_path() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{2,8}".prop_map(|svc| format!("google-beta/services/{svc}/resource_{svc}.go")),
        "[a-z]{2,8}".prop_map(|svc| format!("google-beta/services/{svc}/test-fixtures/data.json")),
        "[a-z]{2,8}".prop_map(|page| format!("website/docs/r/{page}.html.markdown")),
        "[a-z]{2,8}".prop_map(|f| format!("{f}.md")),
        Just("google-beta/provider/provider_mmv1_resources.go".to_string()),
        Just("google-beta/transport/config.go".to_string()),
        Just("go.mod".to_string()),
    ]
}

fn outcome() -> impl Strategy<Value = TestOutcome> {
    prop_oneof![
        Just(TestOutcome::Pass),
        Just(TestOutcome::Fail),
        Just(TestOutcome::Skip),
    ]
}

fn run_result() -> impl Strategy<Value = RunResult> {
    prop::collection::vec(("TestAcc[A-E]", outcome()), 0..12).prop_map(|entries| {
        let mut r = RunResult::new();
        for (name, o) in entries {
            r.record(o, name);
        }
        r
    })
}

proptest! {
    #[test]
    fn surface_is_order_insensitive(files in prop::collection::vec(changed_path(), 0..10)) {
        let mut reversed = files.clone();
        reversed.reverse();
        let mut sorted = files.clone();
        sorted.sort();

        let a = compute_surface(&files, &rules());
        prop_assert_eq!(&a, &compute_surface(&reversed, &rules()));
        prop_assert_eq!(&a, &compute_surface(&sorted, &rules()));
    }

    #[test]
    fn irrelevant_files_never_force_a_sweep(names in prop::collection::vec("[a-z/]{1,20}\\.(md|txt|yaml|erb)", 0..10)) {
        let surface = compute_surface(&names, &rules());
        prop_assert!(surface.is_empty());
        for n in &names {
            prop_assert!(!is_test_relevant(n));
        }
    }

    #[test]
    fn full_sweep_has_no_packages(files in prop::collection::vec(changed_path(), 0..10)) {
        let surface = compute_surface(&files, &rules());
        if surface.run_full_sweep {
            prop_assert!(surface.affected_packages.is_empty());
        }
    }

    #[test]
    fn merge_is_commutative(a in run_result(), b in run_result()) {
        prop_assert_eq!(merge([a.clone(), b.clone()]), merge([b, a]));
    }

    #[test]
    fn merge_is_associative(a in run_result(), b in run_result(), c in run_result()) {
        let left = merge([merge([a.clone(), b.clone()]), c.clone()]);
        let right = merge([a, merge([b, c])]);
        prop_assert_eq!(left, right);
    }

    #[test]
    fn merged_sets_stay_disjoint(results in prop::collection::vec(run_result(), 0..5)) {
        let m = merge(results);
        prop_assert!(m.passed.is_disjoint(&m.failed));
        prop_assert!(m.passed.is_disjoint(&m.skipped));
        prop_assert!(m.failed.is_disjoint(&m.skipped));
    }
}

#[test]
fn merge_of_nothing_is_empty() {
    assert_eq!(merge(Vec::<RunResult>::new()), RunResult::default());
}
