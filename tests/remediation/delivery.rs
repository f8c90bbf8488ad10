use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{TimeZone, Utc};
use confwarden::delivery::{PullRequestClient, PullRequestDraft, ReportClient};
use confwarden::error::DeliveryError;
use confwarden::report::{ApprovalReport, ChangeSet, CompletionStatus, ValidationStatus};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn draft() -> PullRequestDraft {
    PullRequestDraft {
        repo_full_name: "acme/shop".to_string(),
        path: "infra/main.tf".to_string(),
        content: "resource \"aws_s3_bucket\" \"b\" {}\n".to_string(),
        title: "Automated policy remediation".to_string(),
        body: "## Automated remediation".to_string(),
    }
}

fn report() -> ApprovalReport {
    serde_json::from_value(json!({
        "original_filename": "main.tf",
        "patched_content": "x",
        "policy_compliance": {
            "violations_detected": 0,
            "validation_status": "PASSED",
            "policy_file_used": "policy/deny-s3.rego"
        },
        "changes_summary": ChangeSet::default(),
        "violations_analysis": { "raw_violations": "" },
        "validation_details": {
            "original_file_validation": "",
            "patched_file_validation": "",
            "original_tests_summary": { "total_tests": 0, "passed": 0, "warnings": 0, "failures": 0, "exceptions": 0 },
            "patched_tests_summary": { "total_tests": 0, "passed": 0, "warnings": 0, "failures": 0, "exceptions": 0 }
        },
        "policy_details": { "policy_file": "policy/deny-s3.rego", "specific_rules": [] },
        "completion": "complete",
        "timing": {
            "remediation_start_time": "2026-01-01T00:00:00.000000Z",
            "remediation_end_time": "2026-01-01T00:00:01.000000Z",
            "total_duration_seconds": 1.0
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn new_file_is_created_without_sha() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/shop/git/ref/heads/develop"))
        .and(header("authorization", "Bearer ghp_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": {"sha": "abc123"}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/shop/git/refs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/shop/contents/infra/main.tf"))
        .and(query_param("ref", "remediation-main-20260102030405"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/shop/contents/infra/main.tf"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/shop/pulls"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"html_url": "https://example.test/pull/1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = PullRequestClient::new(&server.uri(), "ghp_test", "develop").unwrap();
    let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    let url = client.open(&draft(), now).await.unwrap();
    assert_eq!(url, "https://example.test/pull/1");

    let requests = server.received_requests().await.unwrap();
    let body = |verb: &str, suffix: &str| -> Value {
        let request = requests
            .iter()
            .find(|r| r.method.as_str() == verb && r.url.path().ends_with(suffix))
            .unwrap();
        serde_json::from_slice(&request.body).unwrap()
    };

    let branch = body("POST", "/git/refs");
    assert_eq!(branch["ref"], "refs/heads/remediation-main-20260102030405");
    assert_eq!(branch["sha"], "abc123");

    let commit = body("PUT", "/contents/infra/main.tf");
    assert!(commit.get("sha").is_none());
    let decoded = STANDARD.decode(commit["content"].as_str().unwrap()).unwrap();
    assert_eq!(String::from_utf8(decoded).unwrap(), draft().content);

    let pull = body("POST", "/pulls");
    assert_eq!(pull["head"], "remediation-main-20260102030405");
    assert_eq!(pull["base"], "develop");
    assert_eq!(pull["title"], "Automated policy remediation");
}

#[tokio::test]
async fn missing_base_branch_surfaces_host_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/shop/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(404).set_body_string("{\"message\":\"Not Found\"}"))
        .mount(&server)
        .await;

    let client = PullRequestClient::new(&server.uri(), "ghp_test", "main").unwrap();
    let err = client.open(&draft(), Utc::now()).await.unwrap_err();

    match err {
        DeliveryError::Host {
            operation, status, ..
        } => {
            assert_eq!(operation, "get base ref");
            assert_eq!(status, 404);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn report_is_wrapped_in_json_api_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/report"))
        .and(header("content-type", "application/vnd.api+json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReportClient::new(&server.uri()).unwrap();
    client.post(&report()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["data"]["attributes"]["original_filename"], "main.tf");
    assert_eq!(
        body["data"]["attributes"]["policy_compliance"]["validation_status"],
        "PASSED"
    );
}

#[tokio::test]
async fn rejected_report_is_a_host_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/report"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = ReportClient::new(&server.uri()).unwrap();
    let err = client.post(&report()).await.unwrap_err();
    assert!(matches!(
        err,
        DeliveryError::Host {
            operation: "post report",
            status: 500,
            ..
        }
    ));

    let parsed = report();
    assert_eq!(parsed.completion, CompletionStatus::Complete);
    assert_eq!(
        parsed.policy_compliance.validation_status,
        ValidationStatus::Passed
    );
}
