use crate::error::DeliveryError;
use crate::providers::http_client::build_client_with_timeout;
use crate::providers::scrub::sanitize_api_error;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// `remediation-<file stem>-<YYYYmmddHHMMSS>` for the file at `path`.
/// Characters git refuses in ref names become `-`.
pub fn remediation_branch_name(path: &str, now: DateTime<Utc>) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let stem = file_name.split_once('.').map_or(file_name, |(stem, _)| stem);
    let slug: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "artifact" } else { slug };
    format!("remediation-{slug}-{}", now.format("%Y%m%d%H%M%S"))
}

/// What to commit and how to describe it.
#[derive(Debug, Clone)]
pub struct PullRequestDraft {
    pub repo_full_name: String,
    /// Repository path of the file to replace.
    pub path: String,
    pub content: String,
    pub title: String,
    pub body: String,
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct ContentEntry {
    sha: String,
}

#[derive(Deserialize)]
struct PullRequest {
    html_url: String,
}

/// Opens remediation pull requests through the GitHub REST API.
pub struct PullRequestClient {
    client: reqwest::Client,
    api_base: Url,
    token: String,
    base_branch: String,
}

impl PullRequestClient {
    pub fn new(api_base: &str, token: &str, base_branch: &str) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: build_client_with_timeout(30),
            api_base: Url::parse(api_base)?,
            token: token.to_string(),
            base_branch: base_branch.to_string(),
        })
    }

    fn endpoint(&self, repo_full_name: &str, rest: &[&str]) -> Result<Url, DeliveryError> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| DeliveryError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            segments.pop_if_empty().push("repos");
            segments.extend(repo_full_name.split('/'));
            for part in rest {
                segments.extend(part.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "confwarden")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    async fn expect_success(
        response: Response,
        operation: &'static str,
    ) -> Result<Response, DeliveryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Host {
            operation,
            status: status.as_u16(),
            body: sanitize_api_error(&body),
        })
    }

    async fn base_sha(&self, repo: &str) -> Result<String, DeliveryError> {
        let url = self.endpoint(repo, &["git/ref/heads", &self.base_branch])?;
        let response = self.request(Method::GET, url).send().await?;
        let git_ref: GitRef = Self::expect_success(response, "get base ref")
            .await?
            .json()
            .await?;
        Ok(git_ref.object.sha)
    }

    async fn create_branch(&self, repo: &str, branch: &str, sha: &str) -> Result<(), DeliveryError> {
        let url = self.endpoint(repo, &["git/refs"])?;
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "ref": format!("refs/heads/{branch}"), "sha": sha }))
            .send()
            .await?;
        Self::expect_success(response, "create branch").await?;
        Ok(())
    }

    async fn existing_file_sha(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Option<String>, DeliveryError> {
        let mut url = self.endpoint(repo, &["contents", path])?;
        url.query_pairs_mut().append_pair("ref", branch);
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entry: ContentEntry = Self::expect_success(response, "get file contents")
            .await?
            .json()
            .await?;
        Ok(Some(entry.sha))
    }

    async fn commit_file(
        &self,
        draft: &PullRequestDraft,
        branch: &str,
    ) -> Result<(), DeliveryError> {
        let existing = self
            .existing_file_sha(&draft.repo_full_name, &draft.path, branch)
            .await?;
        let mut body = json!({
            "message": draft.title,
            "content": STANDARD.encode(draft.content.as_bytes()),
            "branch": branch,
        });
        if let Some(sha) = existing {
            body["sha"] = json!(sha);
        }

        let url = self.endpoint(&draft.repo_full_name, &["contents", &draft.path])?;
        let response = self.request(Method::PUT, url).json(&body).send().await?;
        Self::expect_success(response, "commit file").await?;
        Ok(())
    }

    /// Branch from the base branch, commit the patched file (create or
    /// update), and open the pull request. Returns its web URL.
    pub async fn open(&self, draft: &PullRequestDraft, now: DateTime<Utc>) -> Result<String, DeliveryError> {
        let repo = draft.repo_full_name.as_str();
        let branch = remediation_branch_name(&draft.path, now);

        let sha = self.base_sha(repo).await?;
        self.create_branch(repo, &branch, &sha).await?;
        self.commit_file(draft, &branch).await?;

        let url = self.endpoint(repo, &["pulls"])?;
        let response = self
            .request(Method::POST, url)
            .json(&json!({
                "title": draft.title,
                "body": draft.body,
                "head": branch,
                "base": self.base_branch,
            }))
            .send()
            .await?;
        let pull: PullRequest = Self::expect_success(response, "create pull request")
            .await?
            .json()
            .await?;

        tracing::info!(repo, branch = %branch, url = %pull.html_url, "pull request opened");
        Ok(pull.html_url)
    }
}
