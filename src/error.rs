use std::path::PathBuf;

use thiserror::Error;

use crate::workflow::route::RouteDecision;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `confwarden`.
///
/// Fatal startup and per-run failures surface through these variants. Tool,
/// provider and HTTP seams keep using `anyhow::Result` with context chains.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Workflow run ────────────────────────────────────────────────────
    #[error("workflow: {0}")]
    Workflow(#[from] WorkflowError),

    // ── Report builder ──────────────────────────────────────────────────
    #[error("report: {0}")]
    Report(#[from] ReportError),

    // ── External delivery ───────────────────────────────────────────────
    #[error("delivery: {0}")]
    Delivery(#[from] DeliveryError),

    // ── Format bridging ─────────────────────────────────────────────────
    #[error("format: {0}")]
    Format(#[from] FormatError),

    // ── Policy selection ────────────────────────────────────────────────
    #[error("policy: {0}")]
    Policy(#[from] PolicyError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("missing reporting endpoint (set CONFWARDEN_ENDPOINT or reporting.endpoint)")]
    MissingEndpoint,

    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── Workflow errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("step budget must be positive")]
    ZeroBudget,

    #[error("initial state must hold exactly one message, got {0}")]
    InvalidInitialState(usize),

    #[error("no step registered for {0}")]
    UnknownStep(RouteDecision),

    #[error("step {step} did not append a terminal message tagged with its name")]
    UntaggedStepOutput { step: RouteDecision },

    #[error("could not recover the artifact filename from the conversation state")]
    MissingArtifactName,

    #[error("reasoning step {step} failed: {source}")]
    Reasoning {
        step: RouteDecision,
        #[source]
        source: anyhow::Error,
    },

    #[error("route classification failed: {0}")]
    Classification(#[source] anyhow::Error),

    #[error("step {step} needs tools but provider {provider} cannot call them")]
    ToolsUnsupported {
        step: RouteDecision,
        provider: String,
    },
}

// ─── Report errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read artifact {path}: {source}")]
    ArtifactRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no artifact name available in the final state")]
    MissingArtifact,
}

// ─── Delivery errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("report endpoint request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("pull request host returned {status} for {operation}: {body}")]
    Host {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

// ─── Format errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("structured document must be a JSON object")]
    NotAnObject,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ─── Policy selection errors ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("no policy rule matches {filename}")]
    NoMatch { filename: String },

    #[error("invalid glob pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

pub type Result<T, E = WardenError> = std::result::Result<T, E>;
