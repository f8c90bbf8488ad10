pub mod markdown;
pub mod pull_request;
pub mod report_client;

pub use markdown::render_pull_request_body;
pub use pull_request::{
    DEFAULT_GITHUB_API, PullRequestClient, PullRequestDraft, remediation_branch_name,
};
pub use report_client::{JSON_API_MEDIA_TYPE, ReportClient};
