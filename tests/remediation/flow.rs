use std::sync::Arc;

use confwarden::Config;
use confwarden::app::{Pipeline, PipelineSettings, RemediationRequest, ScratchDir};
use confwarden::delivery::{JSON_API_MEDIA_TYPE, PullRequestClient, ReportClient};
use confwarden::error::WardenError;
use confwarden::report::{ChangeKind, CompletionStatus, ValidationStatus};
use confwarden::workflow::{KeywordRouter, RouteDecision, Router};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::scripted::{FakeValidator, ScriptedProvider, answer, validate_call};

const POLICY: &str = "policy/deny-application-properties.rego";
const REMOTE_PATH: &str = "src/main/resources/application.properties";

fn keyword_router() -> Router {
    Router::Keyword(KeywordRouter::new(
        &["NEEDS REMEDIATION".to_string()],
        &["FINAL ANSWER".to_string()],
    ))
}

async fn pipeline(
    tmp: &TempDir,
    provider: Arc<ScriptedProvider>,
    settings: PipelineSettings,
) -> Pipeline {
    let scratch = Arc::new(ScratchDir::create(tmp.path().join("scratch")).await.unwrap());
    Pipeline::new(
        settings,
        provider,
        keyword_router(),
        Arc::new(FakeValidator),
        scratch,
    )
}

fn settings() -> PipelineSettings {
    PipelineSettings::from_config(&Config::default()).unwrap()
}

fn request(content: &str, repository: Option<&str>) -> RemediationRequest {
    RemediationRequest {
        remote_path: REMOTE_PATH.to_string(),
        content: content.to_string(),
        repository: repository.map(str::to_string),
    }
}

async fn mount_github(server: &MockServer) {
    let repo = "/repos/acme/shop";
    Mock::given(method("GET"))
        .and(path(format!("{repo}/git/ref/heads/main")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": {"sha": "base-sha"}})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{repo}/git/refs")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ref": "refs/heads/x"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{repo}/contents/{REMOTE_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sha": "file-sha"})))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{repo}/contents/{REMOTE_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"commit": {}})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{repo}/pulls")))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"html_url": "https://github.com/acme/shop/pull/7"})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn port_22_properties_file_is_remediated_reported_and_proposed() {
    let tmp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/report"))
        .and(header("content-type", JSON_API_MEDIA_TYPE))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    mount_github(&server).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        validate_call("call-1", "application.json", POLICY),
        answer("The validator reports that port 22 is not allowed. NEEDS REMEDIATION"),
        answer("```json\n{\n  \"port\": \"8080\"\n}\n```"),
        validate_call("call-2", "application_patched.json", POLICY),
        answer("FINAL ANSWER: every check passes."),
    ]));
    let pipeline = pipeline(&tmp, Arc::clone(&provider), settings())
        .await
        .with_reporter(ReportClient::new(&server.uri()).unwrap())
        .with_pull_requests(PullRequestClient::new(&server.uri(), "ghp_test", "main").unwrap());

    let summary = pipeline
        .remediate(&request("port=22\n", Some("acme/shop")))
        .await
        .unwrap();

    assert_eq!(
        summary.path,
        vec![
            RouteDecision::Monitoring,
            RouteDecision::Remediation,
            RouteDecision::Monitoring
        ]
    );
    assert_eq!(provider.remaining(), 0);
    assert!(provider.system_prompts()[3].contains("application_patched.json"));

    let report = &summary.report;
    assert_eq!(report.original_filename, "application.json");
    assert_eq!(report.policy_compliance.validation_status, ValidationStatus::Passed);
    assert_eq!(report.policy_compliance.violations_detected, 1);
    assert_eq!(report.policy_compliance.policy_file_used, POLICY);
    assert_eq!(report.completion, CompletionStatus::Complete);
    assert_eq!(report.changes_summary.total_changes, 2);
    assert_eq!(report.changes_summary.of_kind(ChangeKind::Added).count(), 1);
    assert_eq!(report.changes_summary.of_kind(ChangeKind::Removed).count(), 1);
    assert!(report.patched_content.contains("port=8080"));
    assert!(report.violations_analysis.raw_violations.contains(REMOTE_PATH));
    assert_eq!(report.validation_details.original_tests_summary.failures, 1);
    assert_eq!(report.validation_details.patched_tests_summary.passed, 1);
    assert_eq!(
        report.policy_details.specific_rules,
        vec!["port 22 is not allowed".to_string()]
    );

    let scratch = pipeline.scratch().path();
    let restored = std::fs::read_to_string(scratch.join("application_patched.properties")).unwrap();
    assert_eq!(restored.trim(), "port=8080");

    assert!(summary.report_delivered);
    assert_eq!(
        summary.pull_request_url.as_deref(),
        Some("https://github.com/acme/shop/pull/7")
    );

    let requests = server.received_requests().await.unwrap();
    let posted = requests
        .iter()
        .find(|r| r.url.path() == "/api/report")
        .unwrap();
    let body: Value = serde_json::from_slice(&posted.body).unwrap();
    assert_eq!(
        body["data"]["attributes"]["policy_compliance"]["validation_status"],
        "PASSED"
    );
    assert_eq!(body["data"]["attributes"]["completion"], "complete");

    let commit = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let commit: Value = serde_json::from_slice(&commit.body).unwrap();
    assert_eq!(commit["sha"], "file-sha");
    assert!(
        commit["branch"]
            .as_str()
            .unwrap()
            .starts_with("remediation-application-")
    );
}

#[tokio::test]
async fn compliant_rerun_does_not_inherit_previous_patch() {
    let tmp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_github(&server).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        validate_call("call-1", "application.json", POLICY),
        answer("Port 22 is open. NEEDS REMEDIATION"),
        answer("{\"port\": \"8080\"}"),
        validate_call("call-2", "application_patched.json", POLICY),
        answer("FINAL ANSWER: fixed."),
        validate_call("call-3", "application.json", POLICY),
        answer("FINAL ANSWER: already compliant."),
    ]));
    let pipeline = pipeline(&tmp, Arc::clone(&provider), settings())
        .await
        .with_pull_requests(PullRequestClient::new(&server.uri(), "ghp_test", "main").unwrap());

    let first = pipeline
        .remediate(&request("port=22\n", Some("acme/shop")))
        .await
        .unwrap();
    assert_eq!(first.report.changes_summary.total_changes, 2);
    assert!(first.pull_request_url.is_some());

    let second = pipeline
        .remediate(&request("port=9090\n", Some("acme/shop")))
        .await
        .unwrap();
    assert_eq!(provider.remaining(), 0);
    assert_eq!(second.path, vec![RouteDecision::Monitoring]);
    assert_eq!(second.report.changes_summary.total_changes, 0);
    assert_eq!(second.report.patched_content, "port=9090\n");
    assert_eq!(second.report.policy_compliance.violations_detected, 0);
    assert!(second.pull_request_url.is_none());

    let scratch = pipeline.scratch().path();
    assert!(!scratch.join("application_patched.json").exists());
    assert!(!scratch.join("application_patched.properties").exists());

    let pulls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path().ends_with("/pulls"))
        .count();
    assert_eq!(pulls, 1);
}

#[tokio::test]
async fn cycle_limit_ends_run_incomplete() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        validate_call("call-1", "application.json", POLICY),
        answer("Port 22 is open. NEEDS REMEDIATION"),
        answer("{\"port\": \"22\"}"),
    ]));
    let settings = PipelineSettings {
        max_remediation_cycles: 1,
        ..settings()
    };
    let pipeline = pipeline(&tmp, Arc::clone(&provider), settings).await;

    let summary = pipeline.remediate(&request("port=22", None)).await.unwrap();

    assert_eq!(
        summary.path,
        vec![RouteDecision::Monitoring, RouteDecision::Remediation]
    );
    assert_eq!(summary.report.completion, CompletionStatus::Incomplete);
    assert_eq!(
        summary.report.policy_compliance.validation_status,
        ValidationStatus::Failed
    );
    assert!(!summary.report_delivered);
    assert!(summary.pull_request_url.is_none());
}

#[tokio::test]
async fn step_budget_exhaustion_marks_report_incomplete() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        validate_call("call-1", "application.json", POLICY),
        answer("NEEDS REMEDIATION"),
    ]));
    let settings = PipelineSettings {
        max_steps: 1,
        ..settings()
    };
    let pipeline = pipeline(&tmp, Arc::clone(&provider), settings).await;

    let summary = pipeline.remediate(&request("port=22", None)).await.unwrap();

    assert_eq!(summary.path, vec![RouteDecision::Monitoring]);
    assert_eq!(summary.report.completion, CompletionStatus::Incomplete);
    assert_eq!(summary.report.changes_summary.total_changes, 0);
}

#[tokio::test]
async fn unmatched_file_is_rejected_before_any_reasoning() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![answer("unused")]));
    let pipeline = pipeline(&tmp, Arc::clone(&provider), settings()).await;

    let err = pipeline
        .remediate(&RemediationRequest {
            remote_path: "docs/readme.md".to_string(),
            content: "# hi".to_string(),
            repository: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, WardenError::Policy(_)));
    assert_eq!(provider.remaining(), 1);
}

#[tokio::test]
async fn cloud_finding_gets_command_suggestion() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![answer(
        "Run `aws s3api put-public-access-block --bucket assets ...`",
    )]));
    let pipeline = pipeline(&tmp, Arc::clone(&provider), settings()).await;

    let suggestion = pipeline
        .suggest_commands("aws_s3", "bucket assets allows public reads")
        .await
        .unwrap();

    assert!(suggestion.contains("put-public-access-block"));
    assert!(!provider.system_prompts()[0].contains("search the CLI documentation"));
}
