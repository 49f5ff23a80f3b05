//! Classification of `go test -v` output.

use regex::Regex;
use std::sync::OnceLock;

use magician_core::{RunResult, TestOutcome};

use crate::exec::CommandOutput;

fn result_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^--- (PASS|FAIL|SKIP): (TestAcc\w+)").expect("static regex")
    })
}

fn panic_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^panic: .*").expect("static regex"))
}

/// Parse the combined stdout and stderr of one or more test processes.
///
/// Only top-level acceptance tests are counted; indented subtest lines are
/// ignored.
pub fn parse_test_output(output: &str) -> RunResult {
    let mut result = RunResult::new();
    for caps in result_regex().captures_iter(output) {
        let outcome = match &caps[1] {
            "PASS" => TestOutcome::Pass,
            "FAIL" => TestOutcome::Fail,
            _ => TestOutcome::Skip,
        };
        result.record(outcome, &caps[2]);
    }
    result.panics = panic_regex()
        .find_iter(output)
        .map(|m| m.as_str().trim_end().to_string())
        .collect();
    result
}

/// Explain a failed process exit that the parsed results do not.
///
/// Returns `None` when the process succeeded, or when failing tests or a
/// panic already account for the non-zero exit.
pub fn unexplained_exit(output: &CommandOutput, parsed: &RunResult) -> Option<String> {
    if output.timed_out {
        return Some(format!("timed out after {}s", output.duration_ms / 1000));
    }
    if output.success() {
        return None;
    }
    let text = output.combined();
    if text.contains("[build failed]") {
        return Some("build failed".to_string());
    }
    if text.contains("[setup failed]") {
        return Some("setup failed".to_string());
    }
    if !parsed.failed.is_empty() || parsed.has_crashed() {
        return None;
    }
    Some(match output.exit_code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
=== RUN   TestAccComputeInstance_basic
=== PAUSE TestAccComputeInstance_basic
--- PASS: TestAccComputeInstance_basic (12.34s)
--- FAIL: TestAccComputeDisk_update (3.21s)
--- SKIP: TestAccComputeImage_windows (0.00s)
    --- PASS: TestAccComputeDisk_update/subtest (0.10s)
--- PASS: TestComputeUnit (0.00s)
FAIL
FAIL\tgithub.com/hashicorp/terraform-provider-google-beta/google-beta/services/compute\t20.1s
";

    fn failed_output(code: i32, stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code: Some(code),
            stdout: stdout.to_string(),
            ..CommandOutput::default()
        }
    }

    #[test]
    fn test_parse_sample() {
        let result = parse_test_output(SAMPLE);
        assert_eq!(result.passed_tests(), vec!["TestAccComputeInstance_basic"]);
        assert_eq!(result.failed_tests(), vec!["TestAccComputeDisk_update"]);
        assert!(result.skipped.contains("TestAccComputeImage_windows"));
        assert!(!result.has_crashed());
    }

    #[test]
    fn test_parse_panic() {
        let out = "--- PASS: TestAccA (1.00s)\npanic: runtime error: invalid memory address\n\ngoroutine 1 [running]:\n";
        let result = parse_test_output(out);
        assert_eq!(result.panics, vec!["panic: runtime error: invalid memory address"]);
        assert!(result.passed.contains("TestAccA"));
    }

    #[test]
    fn test_empty_output() {
        assert_eq!(parse_test_output(""), RunResult::new());
    }

    #[test]
    fn test_retry_reports_failure() {
        let out = "--- PASS: TestAccA (1s)\n--- FAIL: TestAccA (1s)\n";
        assert_eq!(parse_test_output(out).failed_tests(), vec!["TestAccA"]);
    }

    #[test]
    fn test_failures_explain_exit() {
        let output = failed_output(1, SAMPLE);
        let parsed = parse_test_output(SAMPLE);
        assert_eq!(unexplained_exit(&output, &parsed), None);
    }

    #[test]
    fn test_build_failure_is_unexplained() {
        let stdout = "FAIL\tgithub.com/x/services/compute [build failed]\n";
        let output = failed_output(2, stdout);
        assert_eq!(
            unexplained_exit(&output, &parse_test_output(stdout)).as_deref(),
            Some("build failed")
        );
    }

    #[test]
    fn test_bare_nonzero_exit() {
        let output = failed_output(1, "ok\n");
        assert_eq!(
            unexplained_exit(&output, &RunResult::new()).as_deref(),
            Some("exit status 1")
        );
    }

    #[test]
    fn test_timeout() {
        let output = CommandOutput {
            timed_out: true,
            duration_ms: 5_000,
            ..CommandOutput::default()
        };
        assert_eq!(
            unexplained_exit(&output, &RunResult::new()).as_deref(),
            Some("timed out after 5s")
        );
    }

    #[test]
    fn test_success_has_no_error() {
        assert_eq!(unexplained_exit(&failed_output(0, SAMPLE), &RunResult::new()), None);
    }
}
