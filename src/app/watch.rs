use super::pipeline::{Pipeline, RemediationRequest};
use crate::ingest::{EventStream, IngestEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const EVENT_QUEUE_DEPTH: usize = 64;

async fn handle_event(pipeline: Arc<Pipeline>, event: IngestEvent) {
    match event {
        IngestEvent::Artifact(artifact) => {
            let request = RemediationRequest {
                remote_path: artifact.path,
                content: artifact.content,
                repository: artifact.repository_full_name,
            };
            if let Err(err) = pipeline.remediate(&request).await {
                tracing::error!(path = %request.remote_path, error = %err, "remediation run failed");
            }
        }
        IngestEvent::CloudResource { kind, description } => {
            match pipeline.suggest_commands(&kind, &description).await {
                Ok(answer) => tracing::info!(kind = %kind, suggestion = %answer, "cloud resource handled"),
                Err(err) => tracing::error!(kind = %kind, error = %err, "command run failed"),
            }
        }
        IngestEvent::Unknown { kind } => tracing::debug!(kind = %kind, "ignoring event"),
    }
}

/// Consume the event stream until `cancel` fires, running each event as an
/// independent task. In-flight runs finish before this returns.
pub async fn watch(pipeline: Arc<Pipeline>, stream: EventStream, cancel: CancellationToken) {
    let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let listener = {
        let cancel = cancel.clone();
        tokio::spawn(async move { stream.run(tx, cancel).await })
    };

    let mut runs = JoinSet::new();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                runs.spawn(handle_event(Arc::clone(&pipeline), event));
            }
            Some(joined) = runs.join_next(), if !runs.is_empty() => {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "run task panicked");
                }
            }
        }
    }

    if let Err(err) = listener.await {
        tracing::error!(error = %err, "event listener task failed");
    }
    if !runs.is_empty() {
        tracing::info!(in_flight = runs.len(), "waiting for in-flight runs");
    }
    while let Some(joined) = runs.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "run task panicked");
        }
    }
}
