//! Human-readable reports.
//!
//! Pull-request comments are GitHub-flavoured markdown; nightly cassette
//! update summaries are plain text for the build log.

use crate::config::{ReviewTarget, VcrConfig};
use crate::domain::{OrchestrationState, PhaseRun, ProviderVersion, RunResult, TerminalState, TestRunMode};
use crate::non_exercised::NonExercisedTests;
use crate::surface::ChangeSurface;

pub const CONTRIBUTING_LINK: &str = "[Get to know how VCR tests work](https://googlecloudplatform.github.io/magic-modules/docs/getting-started/contributing/#general-contributing-steps)";

const NIGHTLY_BANNER: &str = "#################################";

/// Where a run's logs were uploaded, for building links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    pub log_bucket: String,
    pub version: ProviderVersion,
    pub head_ref: String,
    pub build_id: String,
}

impl ReportContext {
    pub fn new(config: &VcrConfig, target: &ReviewTarget) -> Self {
        Self {
            log_bucket: config.log_bucket.clone(),
            version: config.version,
            head_ref: target.head_ref(),
            build_id: config.build.build_id.clone(),
        }
    }

    fn artifacts_path(&self) -> String {
        format!(
            "{}/{}/refs/heads/{}/artifacts/{}",
            self.log_bucket, self.version, self.head_ref, self.build_id
        )
    }

    /// Direct link to an uploaded log object.
    pub fn log_url(&self, relative: &str) -> String {
        format!(
            "https://storage.cloud.google.com/{}/{}",
            self.artifacts_path(),
            relative
        )
    }

    /// Console link to an uploaded log directory.
    pub fn browser_url(&self, relative: &str) -> String {
        format!(
            "https://console.cloud.google.com/storage/browser/{}/{}",
            self.artifacts_path(),
            relative
        )
    }
}

/// Inline LaTeX colour, the only colour GitHub markdown renders.
pub fn color(color: &str, text: &str) -> String {
    format!("$\\textcolor{{{color}}}{{\\textsf{{{text}}}}}$")
}

fn list_items(tests: &[String]) -> String {
    let mut out = String::from("<ul>\n");
    for t in tests {
        out.push_str(&format!("<li>{t}</li>\n"));
    }
    out.push_str("</ul>");
    out
}

// ---------------------------------------------------------------------------
// Pull-request sections
// ---------------------------------------------------------------------------

pub fn format_tests_analytics(result: &RunResult) -> String {
    format!(
        "#### Tests analytics\nTotal tests: {}\nPassed tests: {}\nSkipped tests: {}\nAffected tests: {}",
        result.total(),
        result.passed.len(),
        result.skipped.len(),
        result.failed.len()
    )
}

pub fn format_affected_packages(surface: &ChangeSurface) -> String {
    let body = if surface.run_full_sweep {
        "All service packages are affected".to_string()
    } else if surface.affected_packages.is_empty() {
        "None".to_string()
    } else {
        let packages: Vec<String> = surface.affected_packages.iter().cloned().collect();
        list_items(&packages)
    };
    format!(
        "<details>\n<summary>Click here to see the affected service packages</summary>\n<blockquote>\n\n{body}\n\n</blockquote>\n</details>"
    )
}

/// `None` when every added test was exercised.
pub fn format_non_exercised(tests: &NonExercisedTests) -> Option<String> {
    if tests.is_empty() {
        return None;
    }
    let mut blocks = vec!["#### Non-exercised tests".to_string()];
    if !tests.not_run_beta.is_empty() {
        let mut block = String::from("Tests were added that are skipped in VCR:");
        for t in &tests.not_run_beta {
            block.push_str(&format!("\n- {t}"));
        }
        blocks.push(block);
    }
    if !tests.not_run_ga.is_empty() {
        let mut block =
            String::from("Tests were added that are GA-only additions and require manual runs:");
        for t in &tests.not_run_ga {
            block.push_str(&format!("\n- {t}"));
        }
        blocks.push(block);
    }
    Some(blocks.join("\n\n"))
}

pub fn format_action_taken(replay: &RunResult) -> String {
    format!(
        "#### Action taken\n<details>\n<summary>Found {} affected test(s) by replaying old test recordings. Starting RECORDING based on the most recent commit. Click here to see the affected tests</summary>\n<blockquote>\n{}\n</blockquote>\n</details>\n\n{}",
        replay.failed.len(),
        list_items(&replay.failed_tests()),
        CONTRIBUTING_LINK
    )
}

/// Trailer for a run whose replay had no failures.
pub fn format_without_replay_failures(replay: &PhaseRun, ctx: &ReportContext) -> String {
    let status = if replay.exit_error.is_some() {
        color(
            "red",
            "Errors occurred during REPLAYING mode. Please fix them to complete your PR.",
        )
    } else {
        color("green", "All tests passed!")
    };
    format!(
        "{status}\n\nView the [build log]({})",
        ctx.log_url("build-log/replaying_test.log")
    )
}

/// Recording outcome, confirming-replay outcome and trailing links.
pub fn format_record_replay(state: &OrchestrationState, ctx: &ReportContext) -> String {
    let empty = PhaseRun::default();
    let record = state.record.as_ref().unwrap_or(&empty);
    let confirm = state.replay_after_record.as_ref().unwrap_or(&empty);
    let terminated = state.has_terminated_tests();
    let non_deterministic = state.non_deterministic_tests();
    let confirm_crashed = confirm.result.has_crashed();

    let mut lines: Vec<String> = Vec::new();

    if !record.result.passed.is_empty() {
        lines.push(color("green", "Tests passed during RECORDING mode:"));
        for t in &record.result.passed {
            lines.push(format!(
                "`{t}`[[Debug log]({})]",
                ctx.log_url(&format!("recording/{t}.log"))
            ));
        }
        lines.push(String::new());

        if confirm_crashed {
            lines.push(color(
                "red",
                "The provider crashed while running the VCR tests in REPLAYING mode after recording",
            ));
            lines.push(color("red", "Please fix it to complete your PR"));
            lines.push(String::new());
            lines.push(format!(
                "View the [build log]({})",
                ctx.log_url("build-log/replaying_test.log")
            ));
        } else if !non_deterministic.is_empty() {
            lines.push(color("red", "Tests failed when rerunning REPLAYING mode:"));
            for t in &non_deterministic {
                lines.push(format!(
                    "`{t}`[[Error message]({})] [[Debug log]({})]",
                    ctx.log_url(&format!(
                        "build-log/replaying_build_after_recording/{t}_replaying_test.log"
                    )),
                    ctx.log_url(&format!("replaying_after_recording/{t}.log"))
                ));
            }
            lines.push(String::new());
            lines.push("Tests failed due to non-determinism or randomness when the VCR replayed the response after the HTTP request was made.".to_string());
            lines.push(String::new());
            lines.push("Please fix these to complete your PR. If you believe these test failures to be incorrect or unrelated to your change, or if you have any questions, please raise the concern with your reviewer.".to_string());
        } else if confirm.exit_error.is_some() {
            lines.push(color(
                "red",
                "Errors occurred during REPLAYING mode after recording. Please fix them to complete your PR.",
            ));
        } else {
            lines.push(color(
                "green",
                "No issues found for passed tests after REPLAYING rerun.",
            ));
        }
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }

    if !record.result.failed.is_empty() {
        lines.push(color("red", "Tests failed during RECORDING mode:"));
        for t in &record.result.failed {
            lines.push(format!(
                "`{t}`[[Error message]({})] [[Debug log]({})]",
                ctx.log_url(&format!("build-log/recording_build/{t}_recording_test.log")),
                ctx.log_url(&format!("recording/{t}.log"))
            ));
        }
        lines.push(String::new());
        if terminated {
            lines.push(color("red", "Several tests got terminated during RECORDING mode."));
        }
        if record.exit_error.is_some() {
            lines.push(color(
                "red",
                "Errors occurred during RECORDING mode. Please fix them to complete your PR.",
            ));
        }
        lines.push(color("red", "Please fix these to complete your PR."));
    } else if terminated {
        lines.push(color("red", "Several tests got terminated during RECORDING mode."));
    } else if record.exit_error.is_some() {
        lines.push(color(
            "red",
            "Errors occurred during RECORDING mode. Please fix them to complete your PR.",
        ));
    } else if non_deterministic.is_empty() && confirm.exit_error.is_none() && !confirm_crashed {
        lines.push(color("green", "All tests passed!"));
    }

    lines.push(String::new());
    lines.push(format!(
        "View the [build log]({}) or the [debug log]({}) for each test",
        ctx.log_url("build-log/recording_test.log"),
        ctx.browser_url("recording")
    ));

    lines.join("\n")
}

pub fn format_crash(mode: TestRunMode, ctx: &ReportContext) -> String {
    format!(
        "{}\n\n{}\n\nView the [build log]({})",
        color(
            "red",
            &format!(
                "The provider crashed while running the VCR tests in {} mode",
                mode.upper()
            )
        ),
        color("red", "Please fix it to complete your PR"),
        ctx.log_url(&format!("build-log/{}_test.log", mode.lower()))
    )
}

/// The full pull-request comment for a finished run.
///
/// `None` for [`TerminalState::NothingToTest`], which posts nothing.
pub fn render_report(state: &OrchestrationState, ctx: &ReportContext) -> Option<String> {
    let terminal = state.terminal?;
    match terminal {
        TerminalState::NothingToTest => None,
        TerminalState::ReplayPanicked => Some(format_crash(TestRunMode::Replaying, ctx)),
        TerminalState::RecordPanicked => Some(format_crash(TestRunMode::Recording, ctx)),
        TerminalState::ReplayedClean | TerminalState::Done => {
            let replay = state.replay.clone().unwrap_or_default();
            let mut sections = vec![
                format_tests_analytics(&replay.result),
                format_affected_packages(&state.surface),
            ];
            if let Some(section) = format_non_exercised(&state.non_exercised) {
                sections.push(section);
            }
            if replay.result.failed.is_empty() {
                sections.push(format_without_replay_failures(&replay, ctx));
            } else {
                sections.push(format_action_taken(&replay.result));
                sections.push(format_record_replay(state, ctx));
            }
            Some(sections.join("\n\n"))
        }
    }
}

// ---------------------------------------------------------------------------
// Nightly cassette update summaries
// ---------------------------------------------------------------------------

pub fn format_nightly_replay(replay: &PhaseRun) -> String {
    if replay.result.has_crashed() {
        return "The provider crashed while running the VCR tests in REPLAYING mode".to_string();
    }
    let result = &replay.result;
    let mut lines = vec![
        NIGHTLY_BANNER.to_string(),
        "Tests Analytics".to_string(),
        NIGHTLY_BANNER.to_string(),
        String::new(),
        format!("Total tests: {}", result.total()),
        format!("Passed tests: {}", result.passed.len()),
        format!("Skipped tests: {}", result.skipped.len()),
        format!("Affected tests: {}", result.failed.len()),
    ];
    if !result.failed.is_empty() {
        lines.push(String::new());
        lines.push("Affected tests list:".to_string());
        for t in &result.failed {
            lines.push(format!("- {t}"));
        }
    }
    lines.push(String::new());
    lines.push(NIGHTLY_BANNER.to_string());

    let status = match &replay.exit_error {
        Some(err) => Some(format!("Errors occurred during REPLAYING mode: {err}.")),
        None if result.failed.is_empty() => Some("All tests passed in REPLAYING mode.".to_string()),
        None => None,
    };
    if let Some(status) = status {
        lines.push(String::new());
        lines.push(NIGHTLY_BANNER.to_string());
        lines.push(status);
        lines.push(NIGHTLY_BANNER.to_string());
    }
    lines.join("\n")
}

pub fn format_nightly_record(record: &PhaseRun, has_terminated_tests: bool) -> String {
    if record.result.has_crashed() {
        return [
            NIGHTLY_BANNER,
            "The provider crashed while running the VCR tests in RECORDING mode",
            NIGHTLY_BANNER,
        ]
        .join("\n");
    }
    let result = &record.result;
    let mut lines = vec![
        NIGHTLY_BANNER.to_string(),
        "RECORDING Tests Report".to_string(),
        NIGHTLY_BANNER.to_string(),
    ];
    if !result.passed.is_empty() {
        lines.push(String::new());
        lines.push("Tests passed during RECORDING mode:".to_string());
        lines.extend(result.passed.iter().map(|t| format!("- {t}")));
    }
    if !result.failed.is_empty() {
        lines.push(String::new());
        lines.push("Tests failed during RECORDING mode:".to_string());
        lines.extend(result.failed.iter().map(|t| format!("- {t}")));
    }

    let mut trailer = Vec::new();
    if has_terminated_tests {
        trailer.push("Several tests got terminated during RECORDING mode".to_string());
    }
    if let Some(err) = &record.exit_error {
        trailer.push(format!("Errors occurred during RECORDING mode: {err}."));
    }
    if result.failed.is_empty() && !has_terminated_tests && record.exit_error.is_none() {
        trailer.push("All tests passed!".to_string());
    }
    if !trailer.is_empty() {
        lines.push(String::new());
        lines.extend(trailer);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color() {
        assert_eq!(
            color("green", "All tests passed!"),
            "$\\textcolor{green}{\\textsf{All tests passed!}}$"
        );
    }

    #[test]
    fn test_analytics() {
        let result = RunResult::new()
            .with_passed(["a", "b", "c"])
            .with_skipped(["d", "e"])
            .with_failed(["f"]);
        assert_eq!(
            format_tests_analytics(&result),
            "#### Tests analytics\nTotal tests: 6\nPassed tests: 3\nSkipped tests: 2\nAffected tests: 1"
        );
    }

    #[test]
    fn test_affected_packages_variants() {
        assert!(format_affected_packages(&ChangeSurface::default()).contains("\n\nNone\n\n"));
        assert!(format_affected_packages(&ChangeSurface::full_sweep())
            .contains("All service packages are affected"));
        assert!(format_affected_packages(&ChangeSurface::packages(["compute", "storage"]))
            .contains("<ul>\n<li>compute</li>\n<li>storage</li>\n</ul>"));
    }

    #[test]
    fn test_non_exercised_omitted_when_empty() {
        assert_eq!(format_non_exercised(&NonExercisedTests::default()), None);
    }

    #[test]
    fn test_nightly_replay_failure_without_error_has_no_status() {
        let replay = PhaseRun::new(RunResult::new().with_failed(["c"]));
        let text = format_nightly_replay(&replay);
        assert!(text.ends_with("- c\n\n#################################"));
    }
}
