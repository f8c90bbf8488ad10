use super::changes::ChangeSet;
use super::validation::{ValidationSummary, count_failures, violated_rules};
use crate::error::ReportError;
use crate::tools::VALIDATE_TOOL_NAME;
use crate::workflow::ConversationState;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CompletionStatus {
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCompliance {
    pub violations_detected: usize,
    pub validation_status: ValidationStatus,
    pub policy_file_used: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationsAnalysis {
    pub raw_violations: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDetails {
    pub original_file_validation: String,
    pub patched_file_validation: String,
    pub original_tests_summary: ValidationSummary,
    pub patched_tests_summary: ValidationSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDetails {
    pub policy_file: String,
    pub specific_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub remediation_start_time: String,
    pub remediation_end_time: String,
    pub total_duration_seconds: f64,
}

/// Compliance report for one remediation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalReport {
    pub original_filename: String,
    pub patched_content: String,
    pub policy_compliance: PolicyCompliance,
    pub changes_summary: ChangeSet,
    pub violations_analysis: ViolationsAnalysis,
    pub validation_details: ValidationDetails,
    pub policy_details: PolicyDetails,
    pub completion: CompletionStatus,
    pub timing: Timing,
}

/// Inputs that live outside the conversation state.
#[derive(Debug, Clone, Copy)]
pub struct ReportInputs<'a> {
    pub scratch_dir: &'a Path,
    /// Repository path of the artifact, substituted for the scratch name in
    /// validator text.
    pub remote_path: &'a str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub incomplete: bool,
}

#[allow(clippy::cast_precision_loss)]
fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds().max(0) as f64;
    (millis / 10.0).round() / 100.0
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Swap the artifact's scratch location for its repository path.
fn with_remote_path(text: &str, scratch_path: &str, artifact: &str, remote: &str) -> String {
    if remote.is_empty() {
        return text.to_string();
    }
    if text.contains(scratch_path) {
        text.replace(scratch_path, remote)
    } else {
        text.replace(artifact, remote)
    }
}

async fn read_artifact(path: &Path) -> Result<String, ReportError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ReportError::ArtifactRead {
            path: path.to_path_buf(),
            source,
        })
}

/// Build the report from the final state and the scratch copy of the
/// original. The patch comes from the run context only, never from disk.
pub async fn build_report(
    state: &ConversationState,
    inputs: ReportInputs<'_>,
) -> Result<ApprovalReport, ReportError> {
    let first_validation = state
        .messages()
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .find(|call| call.name == VALIDATE_TOOL_NAME);
    let arg = |key: &str| {
        first_validation
            .and_then(|call| call.args.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let artifact_name = arg("artifact_name")
        .or_else(|| state.recover_artifact_name())
        .filter(|name| !name.is_empty())
        .ok_or(ReportError::MissingArtifact)?;
    let policy_path = arg("policy_path").unwrap_or_else(|| state.context.policy_path.clone());

    let original_path = inputs.scratch_dir.join(&artifact_name);
    let original = read_artifact(&original_path).await?;
    let patched = match &state.context.patched_content {
        Some(content) => content.clone(),
        None => {
            tracing::debug!(
                artifact = %artifact_name,
                "no patch written in this run; reporting the original as unchanged"
            );
            original.clone()
        }
    };
    let changes_summary = ChangeSet::between(&original, &patched);

    let mut outputs = state.tool_outputs();
    let before = outputs.next().map(|m| m.content.clone()).unwrap_or_default();
    let after = outputs
        .next_back()
        .map_or_else(|| before.clone(), |m| m.content.clone());

    let violations_detected = count_failures(&before);
    let validation_status = if count_failures(&after) > 0 {
        ValidationStatus::Failed
    } else {
        ValidationStatus::Passed
    };

    let scratch_path = original_path.display().to_string();
    let before_remote = with_remote_path(&before, &scratch_path, &artifact_name, inputs.remote_path);

    let completion = if inputs.incomplete || state.context.incomplete {
        CompletionStatus::Incomplete
    } else {
        CompletionStatus::Complete
    };

    Ok(ApprovalReport {
        original_filename: artifact_name,
        patched_content: patched,
        policy_compliance: PolicyCompliance {
            violations_detected,
            validation_status,
            policy_file_used: policy_path.clone(),
        },
        changes_summary,
        violations_analysis: ViolationsAnalysis {
            raw_violations: before_remote.clone(),
        },
        validation_details: ValidationDetails {
            original_file_validation: before_remote,
            patched_file_validation: after.clone(),
            original_tests_summary: ValidationSummary::parse(&before),
            patched_tests_summary: ValidationSummary::parse(&after),
        },
        policy_details: PolicyDetails {
            policy_file: policy_path,
            specific_rules: violated_rules(&before),
        },
        completion,
        timing: Timing {
            remediation_start_time: timestamp(inputs.started_at),
            remediation_end_time: timestamp(inputs.finished_at),
            total_duration_seconds: duration_seconds(inputs.started_at, inputs.finished_at),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Message, RouteDecision, RunContext, ToolInvocation};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    const BEFORE: &str = "FAIL - {path} - main - port 22 is not allowed\n\n1 test, 0 passed, 0 warnings, 1 failure, 0 exceptions\n";
    const AFTER: &str = "\n1 test, 1 passed, 0 warnings, 0 failures, 0 exceptions\n";

    fn validation_call(id: &str, artifact: &str) -> Message {
        Message::tool_request(
            RouteDecision::Monitoring,
            "",
            vec![ToolInvocation {
                id: id.to_string(),
                name: VALIDATE_TOOL_NAME.to_string(),
                args: serde_json::json!({
                    "artifact_name": artifact,
                    "policy_path": "policy/deny-application-properties.rego"
                }),
            }],
        )
    }

    fn remediated_state(scratch: &Path) -> ConversationState {
        let mut context = RunContext::for_artifact(
            "app.json",
            "policy/deny-application-properties.rego",
            "{\n  \"port\": \"22\"\n}",
        );
        context.patched_content = Some("{\n  \"port\": \"8080\"\n}".to_string());
        context.remediation_cycles = 1;
        let mut state = ConversationState::for_artifact(context);
        let before = BEFORE.replace("{path}", &scratch.join("app.json").display().to_string());
        state.append(vec![
            validation_call("c1", "app.json"),
            Message::tool_output(RouteDecision::Monitoring, "c1", before),
            Message::step_output(RouteDecision::Monitoring, "port 22 violates policy"),
            Message::step_output(RouteDecision::Remediation, "Remediation completed"),
            validation_call("c2", "app_patched.json"),
            Message::tool_output(RouteDecision::Monitoring, "c2", AFTER),
            Message::step_output(RouteDecision::Monitoring, "FINAL ANSWER: passes"),
        ]);
        state
    }

    fn inputs(scratch: &Path) -> ReportInputs<'_> {
        let started_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        ReportInputs {
            scratch_dir: scratch,
            remote_path: "src/main/resources/application.properties",
            started_at,
            finished_at: started_at + Duration::milliseconds(12_345),
            incomplete: false,
        }
    }

    #[tokio::test]
    async fn report_reflects_before_and_after() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("app.json"), "{\n  \"port\": \"22\"\n}")
            .await
            .unwrap();

        let state = remediated_state(dir.path());
        let report = build_report(&state, inputs(dir.path())).await.unwrap();

        assert_eq!(report.original_filename, "app.json");
        assert_eq!(report.policy_compliance.violations_detected, 1);
        assert_eq!(
            report.policy_compliance.validation_status,
            ValidationStatus::Passed
        );
        assert_eq!(report.changes_summary.total_changes, 2);
        assert_eq!(report.validation_details.original_tests_summary.failures, 1);
        assert_eq!(report.validation_details.patched_tests_summary.passed, 1);
        assert_eq!(
            report.policy_details.specific_rules,
            vec!["port 22 is not allowed"]
        );
        assert!(
            report
                .violations_analysis
                .raw_violations
                .starts_with("FAIL - src/main/resources/application.properties - main")
        );
        assert_eq!(report.completion, CompletionStatus::Complete);
        assert!((report.timing.total_duration_seconds - 12.35).abs() < 1e-9);
        assert_eq!(
            report.timing.remediation_start_time,
            "2026-01-02T03:04:05.000000Z"
        );
    }

    #[tokio::test]
    async fn leftover_patch_on_disk_is_ignored_without_remediation() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("app.json"), "{\"port\": \"9090\"}")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("app_patched.json"), "{\"port\": \"8080\"}")
            .await
            .unwrap();

        let mut state = remediated_state(dir.path());
        state.context.patched_content = None;
        state.context.remediation_cycles = 0;
        let report = build_report(&state, inputs(dir.path())).await.unwrap();
        assert_eq!(report.patched_content, "{\"port\": \"9090\"}");
        assert!(report.changes_summary.is_empty());
    }

    #[tokio::test]
    async fn missing_original_is_an_error() {
        let dir = TempDir::new().unwrap();
        let state = remediated_state(dir.path());
        let err = build_report(&state, inputs(dir.path())).await.unwrap_err();
        assert!(matches!(err, ReportError::ArtifactRead { .. }));
    }

    #[tokio::test]
    async fn serialized_keys_match_the_report_endpoint() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("app.json"), "{}").await.unwrap();
        let mut bare = inputs(dir.path());
        bare.incomplete = true;

        let state = remediated_state(dir.path());
        let report = build_report(&state, bare).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["policy_compliance"]["validation_status"], "PASSED");
        assert_eq!(json["completion"], "incomplete");
        assert!(json["changes_summary"]["changes_detail"].is_array());
        assert!(json["validation_details"]["original_tests_summary"]["total_tests"].is_u64());
        assert!(json["timing"]["total_duration_seconds"].is_f64());
    }

    #[test]
    fn remote_path_prefers_full_scratch_path() {
        let text = "FAIL - /tmp/s/app.json - main - x";
        assert_eq!(
            with_remote_path(text, "/tmp/s/app.json", "app.json", "cfg/app.json"),
            "FAIL - cfg/app.json - main - x"
        );
        assert_eq!(
            with_remote_path("FAIL - app.json", "/tmp/s/app.json", "app.json", "cfg/app.json"),
            "FAIL - cfg/app.json"
        );
    }
}
