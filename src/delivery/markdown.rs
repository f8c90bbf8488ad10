use crate::report::{ApprovalReport, ValidationSummary};
use std::fmt::Write as _;

fn cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn summary_row(out: &mut String, label: &str, summary: &ValidationSummary) {
    let _ = writeln!(
        out,
        "| {label} | {} | {} | {} | {} | {} |",
        summary.total_tests, summary.passed, summary.warnings, summary.failures, summary.exceptions
    );
}

/// Pull-request description summarizing an approval report.
pub fn render_pull_request_body(report: &ApprovalReport, remote_path: &str) -> String {
    let mut out = String::from("## Automated remediation\n\n");
    let _ = writeln!(out, "- **File:** `{remote_path}`");
    let _ = writeln!(
        out,
        "- **Policy:** `{}`",
        report.policy_compliance.policy_file_used
    );
    let _ = writeln!(
        out,
        "- **Violations detected:** {}",
        report.policy_compliance.violations_detected
    );
    let _ = writeln!(
        out,
        "- **Validation after patch:** {}",
        report.policy_compliance.validation_status
    );

    if !report.policy_details.specific_rules.is_empty() {
        out.push_str("\n### Violated rules\n\n");
        for rule in &report.policy_details.specific_rules {
            let _ = writeln!(out, "- {rule}");
        }
    }

    let _ = writeln!(
        out,
        "\n### Changes ({})\n",
        report.changes_summary.total_changes
    );
    if report.changes_summary.changes.is_empty() {
        out.push_str("No line-level changes.\n");
    } else {
        out.push_str("| Type | Line |\n|---|---|\n");
        for change in &report.changes_summary.changes {
            let _ = writeln!(out, "| {} | `{}` |", change.kind, cell(&change.content));
        }
    }

    out.push_str("\n### Validator summary\n\n");
    out.push_str("| | Tests | Passed | Warnings | Failures | Exceptions |\n|---|---|---|---|---|---|\n");
    summary_row(
        &mut out,
        "Before",
        &report.validation_details.original_tests_summary,
    );
    summary_row(
        &mut out,
        "After",
        &report.validation_details.patched_tests_summary,
    );

    let _ = writeln!(
        out,
        "\n_Run {} in {:.2}s._",
        report.completion, report.timing.total_duration_seconds
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{
        ChangeSet, CompletionStatus, PolicyCompliance, ValidationStatus,
        builder::{PolicyDetails, Timing, ValidationDetails, ViolationsAnalysis},
    };

    fn report() -> ApprovalReport {
        ApprovalReport {
            original_filename: "app.json".to_string(),
            patched_content: "port=8080".to_string(),
            policy_compliance: PolicyCompliance {
                violations_detected: 1,
                validation_status: ValidationStatus::Passed,
                policy_file_used: "policy/deny-application-properties.rego".to_string(),
            },
            changes_summary: ChangeSet::between("port=22", "port=8080|x"),
            violations_analysis: ViolationsAnalysis {
                raw_violations: String::new(),
            },
            validation_details: ValidationDetails {
                original_file_validation: String::new(),
                patched_file_validation: String::new(),
                original_tests_summary: ValidationSummary {
                    total_tests: 1,
                    failures: 1,
                    ..ValidationSummary::default()
                },
                patched_tests_summary: ValidationSummary {
                    total_tests: 1,
                    passed: 1,
                    ..ValidationSummary::default()
                },
            },
            policy_details: PolicyDetails {
                policy_file: "policy/deny-application-properties.rego".to_string(),
                specific_rules: vec!["port 22 is not allowed".to_string()],
            },
            completion: CompletionStatus::Complete,
            timing: Timing {
                remediation_start_time: String::new(),
                remediation_end_time: String::new(),
                total_duration_seconds: 3.5,
            },
        }
    }

    #[test]
    fn body_lists_rules_changes_and_summaries() {
        let body = render_pull_request_body(&report(), "src/main/resources/application.properties");

        assert!(body.contains("`src/main/resources/application.properties`"));
        assert!(body.contains("- **Validation after patch:** PASSED"));
        assert!(body.contains("- port 22 is not allowed"));
        assert!(body.contains("| ADDED | `port=8080\\|x` |"));
        assert!(body.contains("| REMOVED | `port=22` |"));
        assert!(body.contains("| Before | 1 | 0 | 0 | 1 | 0 |"));
        assert!(body.contains("| After | 1 | 1 | 0 | 0 | 0 |"));
        assert!(body.contains("_Run complete in 3.50s._"));
    }
}
