use serde::Deserialize;
use serde_json::Value;

pub const GITHUB_FILES_EVENT: &str = "github_files";
const CLOUD_RESOURCE_PREFIX: &str = "aws";

/// A repository file pushed by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactEvent {
    pub path: String,
    pub content: String,
    pub repository_full_name: Option<String>,
}

impl ArtifactEvent {
    /// Last path segment, used as the scratch filename.
    pub fn filename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Artifact(ArtifactEvent),
    CloudResource { kind: String, description: String },
    Unknown { kind: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

fn describe(data: Value) -> String {
    match data {
        Value::String(text) => text,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Decodes one `{type, data}` payload.
pub fn decode_event(payload: &str) -> Result<IngestEvent, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(payload)?;
    if envelope.kind == GITHUB_FILES_EVENT {
        let artifact: ArtifactEvent = serde_json::from_value(envelope.data)?;
        return Ok(IngestEvent::Artifact(artifact));
    }
    if envelope.kind.starts_with(CLOUD_RESOURCE_PREFIX) {
        return Ok(IngestEvent::CloudResource {
            description: describe(envelope.data),
            kind: envelope.kind,
        });
    }
    Ok(IngestEvent::Unknown {
        kind: envelope.kind,
    })
}
