use super::events::{IngestEvent, decode_event};
use super::sse::{SseBuffer, event_payload};
use crate::formats::compile_glob_set;
use crate::providers::http_client::build_stream_client;
use crate::providers::scrub::api_error;
use anyhow::{Context, Result};
use futures_util::StreamExt;
use globset::GlobSet;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

enum StreamEnd {
    Closed,
    ReceiverGone,
}

/// Subscription to `<endpoint>/sse`, forwarding decoded events to a channel.
pub struct EventStream {
    client: reqwest::Client,
    url: Url,
    /// `None` accepts every artifact path.
    allowed_paths: Option<GlobSet>,
    reconnect_delay: Duration,
}

impl EventStream {
    pub fn new(endpoint: &str, allowed_paths: &[String]) -> Result<Self> {
        let url = Url::parse(&format!("{}/sse", endpoint.trim_end_matches('/')))
            .with_context(|| format!("invalid event endpoint: {endpoint}"))?;
        let allowed_paths = if allowed_paths.is_empty() {
            None
        } else {
            Some(compile_glob_set(allowed_paths)?)
        };
        Ok(Self {
            client: build_stream_client(),
            url,
            allowed_paths,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        })
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Artifact events must match the path allow-list when one is set.
    pub fn accepts(&self, event: &IngestEvent) -> bool {
        match event {
            IngestEvent::Artifact(artifact) => self
                .allowed_paths
                .as_ref()
                .is_none_or(|allowed| allowed.is_match(&artifact.path)),
            IngestEvent::CloudResource { .. } => true,
            IngestEvent::Unknown { .. } => false,
        }
    }

    async fn forward_block(&self, block: &str, tx: &mpsc::Sender<IngestEvent>) -> bool {
        let Some(payload) = event_payload(block) else {
            return true;
        };
        let event = match decode_event(&payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "dropping undecodable event");
                return true;
            }
        };
        if !self.accepts(&event) {
            tracing::debug!(?event, "event filtered out");
            return true;
        }
        tx.send(event).await.is_ok()
    }

    async fn listen_once(&self, tx: &mpsc::Sender<IngestEvent>) -> Result<StreamEnd> {
        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("connect event stream: {}", self.url))?;
        if !response.status().is_success() {
            return Err(api_error("Event stream", response).await);
        }
        tracing::info!(url = %self.url, "event stream connected");

        let mut byte_stream = response.bytes_stream();
        let mut sse_buffer = SseBuffer::new();
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.context("read event stream")?;
            sse_buffer.push_chunk(&chunk);
            while let Some(block) = sse_buffer.next_event_block() {
                if !self.forward_block(&block, tx).await {
                    return Ok(StreamEnd::ReceiverGone);
                }
            }
        }
        Ok(StreamEnd::Closed)
    }

    /// Listens until `cancel` fires or the receiver is dropped, reconnecting
    /// after `reconnect_delay` whenever the stream ends or fails.
    pub async fn run(&self, tx: mpsc::Sender<IngestEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                result = self.listen_once(&tx) => match result {
                    Ok(StreamEnd::ReceiverGone) => break,
                    Ok(StreamEnd::Closed) => {
                        tracing::warn!(url = %self.url, "event stream closed; reconnecting");
                    }
                    Err(err) => {
                        tracing::warn!(url = %self.url, error = %err, "event stream failed; reconnecting");
                    }
                },
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        tracing::info!(url = %self.url, "event stream stopped");
    }
}
