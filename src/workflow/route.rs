use crate::error::WorkflowError;
use crate::providers::{ProviderMessage, traits::Provider};
use crate::tools::ToolSpec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use strum::{Display, EnumString, IntoStaticStr};

pub const ROUTE_TOOL_NAME: &str = "route";

/// Where control goes after a step.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RouteDecision {
    Monitoring,
    Remediation,
    Command,
    End,
}

impl RouteDecision {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// The two ways out of a checking step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTargets {
    pub on_failure: RouteDecision,
    pub on_success: RouteDecision,
}

impl RouteTargets {
    pub const fn new(on_failure: RouteDecision, on_success: RouteDecision) -> Self {
        Self {
            on_failure,
            on_success,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RouterMode {
    #[default]
    Classifier,
    Keyword,
}

// ── Keyword routing ─────────────────────────────────────────────────

/// Case-insensitive marker scan. Failure markers win over success markers,
/// and text with neither takes the failure path.
#[derive(Debug, Clone)]
pub struct KeywordRouter {
    failure_markers: Vec<String>,
    success_markers: Vec<String>,
}

impl KeywordRouter {
    pub fn new(failure_markers: &[String], success_markers: &[String]) -> Self {
        let lower = |markers: &[String]| {
            markers
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect()
        };
        Self {
            failure_markers: lower(failure_markers),
            success_markers: lower(success_markers),
        }
    }

    pub fn decide(&self, text: &str, targets: RouteTargets) -> RouteDecision {
        let haystack = text.to_lowercase();
        if self.failure_markers.iter().any(|m| haystack.contains(m.as_str())) {
            return targets.on_failure;
        }
        if self.success_markers.iter().any(|m| haystack.contains(m.as_str())) {
            return targets.on_success;
        }
        targets.on_failure
    }
}

// ── Classifier routing ──────────────────────────────────────────────

/// Asks the reasoning capability to pick the next step through a single
/// `route` tool whose argument is limited to the allowed members.
pub struct ClassifierRouter {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ClassifierRouter {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn route_spec(targets: RouteTargets) -> ToolSpec {
        ToolSpec {
            name: ROUTE_TOOL_NAME.to_string(),
            description: "Choose the next step of the compliance workflow".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "next": {
                        "type": "string",
                        "enum": [targets.on_failure.as_str(), targets.on_success.as_str()]
                    }
                },
                "required": ["next"]
            }),
        }
    }

    fn instruction(targets: RouteTargets) -> String {
        format!(
            "You route a configuration compliance workflow. Read the report you are given and call the `{ROUTE_TOOL_NAME}` tool exactly once. \
             Choose \"{}\" if the artifact still violates its policy or the outcome is unclear. \
             Choose \"{}\" only if the artifact passes every policy check.",
            targets.on_failure, targets.on_success
        )
    }

    pub async fn decide(
        &self,
        text: &str,
        targets: RouteTargets,
    ) -> Result<RouteDecision, WorkflowError> {
        let instruction = Self::instruction(targets);
        let response = self
            .provider
            .chat_with_tools(
                Some(&instruction),
                &[ProviderMessage::user(text)],
                &[Self::route_spec(targets)],
                &self.model,
                0.0,
            )
            .await
            .map_err(WorkflowError::Classification)?;

        let structured = response
            .tool_uses()
            .into_iter()
            .filter(|(_, name, _)| *name == ROUTE_TOOL_NAME)
            .find_map(|(_, _, input)| input.get("next").and_then(|v| v.as_str()))
            .and_then(|next| next.trim().parse::<RouteDecision>().ok())
            .filter(|decision| *decision == targets.on_failure || *decision == targets.on_success);

        if let Some(decision) = structured {
            return Ok(decision);
        }

        tracing::debug!("route tool not used; scanning classifier text");
        Ok(scan_for_member(&response.text, targets))
    }
}

/// Whole-word scan for a member name; failure wins ties and silence.
fn scan_for_member(text: &str, targets: RouteTargets) -> RouteDecision {
    let words: Vec<String> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    let mentions = |decision: RouteDecision| words.iter().any(|w| w == decision.as_str());

    if mentions(targets.on_failure) {
        targets.on_failure
    } else if mentions(targets.on_success) {
        targets.on_success
    } else {
        targets.on_failure
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub enum Router {
    Keyword(KeywordRouter),
    Classifier(ClassifierRouter),
}

impl Router {
    pub async fn decide(
        &self,
        text: &str,
        targets: RouteTargets,
    ) -> Result<RouteDecision, WorkflowError> {
        let decision = match self {
            Self::Keyword(router) => router.decide(text, targets),
            Self::Classifier(router) => router.decide(text, targets).await?,
        };
        tracing::debug!(next = %decision, "route decided");
        Ok(decision)
    }
}
