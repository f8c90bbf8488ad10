use crate::error::DeliveryError;
use crate::providers::http_client::build_client_with_timeout;
use crate::providers::scrub::sanitize_api_error;
use crate::report::ApprovalReport;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use url::Url;

pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

#[derive(Serialize)]
struct Envelope<'a> {
    data: Attributes<'a>,
}

#[derive(Serialize)]
struct Attributes<'a> {
    attributes: &'a ApprovalReport,
}

/// Posts approval reports to `<endpoint>/api/report`.
pub struct ReportClient {
    client: reqwest::Client,
    report_url: Url,
}

impl ReportClient {
    pub fn new(endpoint: &str) -> Result<Self, DeliveryError> {
        let report_url = Url::parse(&format!("{}/api/report", endpoint.trim_end_matches('/')))?;
        Ok(Self {
            client: build_client_with_timeout(30),
            report_url,
        })
    }

    pub fn report_url(&self) -> &Url {
        &self.report_url
    }

    /// One attempt; non-2xx answers surface as [`DeliveryError::Host`].
    pub async fn post(&self, report: &ApprovalReport) -> Result<(), DeliveryError> {
        let envelope = Envelope {
            data: Attributes { attributes: report },
        };
        let response = self
            .client
            .post(self.report_url.clone())
            .header(CONTENT_TYPE, JSON_API_MEDIA_TYPE)
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(url = %self.report_url, status = status.as_u16(), "report delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Host {
            operation: "post report",
            status: status.as_u16(),
            body: sanitize_api_error(&body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_url_joins_endpoint() {
        let client = ReportClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.report_url().as_str(), "http://localhost:8080/api/report");
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(matches!(
            ReportClient::new("not a url"),
            Err(DeliveryError::Url(_))
        ));
    }
}
