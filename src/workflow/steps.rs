use super::agent::AgentNode;
use super::engine::{Step, StepUpdate};
use super::route::{RouteDecision, RouteTargets, Router};
use super::state::{ConversationState, Message};
use crate::error::WorkflowError;
use crate::tools::{ExecutionContext, VALIDATE_TOOL_NAME};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Marker phrases the monitoring instruction asks for; the keyword router's
/// default configuration matches on them.
pub const SUCCESS_MARKER: &str = "FINAL ANSWER";
pub const FAILURE_MARKER: &str = "NEEDS REMEDIATION";

const MONITORING_TARGETS: RouteTargets =
    RouteTargets::new(RouteDecision::Remediation, RouteDecision::End);

/// `<stem>_patched<.ext>` for an artifact name.
pub fn patched_artifact_name(artifact_name: &str) -> String {
    let path = Path::new(artifact_name);
    let stem = path
        .file_stem()
        .map_or_else(|| artifact_name.to_string(), |s| s.to_string_lossy().into_owned());
    match path.extension() {
        Some(ext) => format!("{stem}_patched.{}", ext.to_string_lossy()),
        None => format!("{stem}_patched"),
    }
}

/// Drop a Markdown code fence wrapped around the whole answer.
pub fn strip_code_fences(answer: &str) -> &str {
    let trimmed = answer.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body_start) = rest.find('\n') else {
        return trimmed;
    };
    let body = &rest[body_start + 1..];
    body.strip_suffix("```").unwrap_or(body).trim()
}

// ── Monitoring ──────────────────────────────────────────────────────

/// Validates the current artifact and routes to remediation on failure.
pub struct MonitoringStep {
    node: AgentNode,
    router: Arc<Router>,
    ctx: ExecutionContext,
}

impl MonitoringStep {
    pub fn new(node: AgentNode, router: Arc<Router>, ctx: ExecutionContext) -> Self {
        Self { node, router, ctx }
    }

    fn instruction(state: &ConversationState) -> String {
        let context = &state.context;
        format!(
            "You only check whether a configuration artifact passes its policy. \
             Before concluding, call the `{VALIDATE_TOOL_NAME}` tool with artifact_name \"{}\" and policy_path \"{}\". \
             Summarize the violations the validator reports. Do not write fixes; a remediation colleague handles that. \
             Begin your answer with \"{SUCCESS_MARKER}\" when every check passes, or end it with \"{FAILURE_MARKER}\" when any check fails.",
            context.current_artifact, context.policy_path
        )
    }
}

#[async_trait]
impl Step for MonitoringStep {
    fn name(&self) -> RouteDecision {
        RouteDecision::Monitoring
    }

    fn successors(&self) -> Vec<RouteDecision> {
        vec![MONITORING_TARGETS.on_failure, MONITORING_TARGETS.on_success]
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StepUpdate, WorkflowError> {
        let instruction = Self::instruction(state);
        let turn = self.node.invoke(state, &instruction, &self.ctx).await?;

        let mut context = state.context.clone();
        if let Some(record) = turn
            .tool_calls
            .iter()
            .rev()
            .find(|r| r.name == VALIDATE_TOOL_NAME && r.result.success)
        {
            context.last_validation = Some(record.result.output.clone());
        } else {
            tracing::warn!(artifact = %context.current_artifact, "monitoring concluded without a validator result");
        }

        let goto = self.router.decide(&turn.final_text, MONITORING_TARGETS).await?;
        Ok(StepUpdate {
            messages: turn.messages,
            context: Some(context),
            goto,
        })
    }
}

// ── Remediation ─────────────────────────────────────────────────────

/// Generates a patched artifact and hands it back to monitoring.
pub struct RemediationStep {
    node: AgentNode,
    ctx: ExecutionContext,
    max_cycles: u32,
}

impl RemediationStep {
    pub fn new(node: AgentNode, ctx: ExecutionContext, max_cycles: u32) -> Self {
        Self {
            node,
            ctx,
            max_cycles: max_cycles.max(1),
        }
    }

    fn instruction(state: &ConversationState, artifact_name: &str) -> String {
        let context = &state.context;
        let findings = context
            .last_validation
            .as_deref()
            .unwrap_or("(no validator output recorded)");
        let current = context
            .patched_content
            .as_deref()
            .unwrap_or(&context.artifact_content);
        format!(
            "You fix configuration policy violations.\n\
             1. Analyze the monitoring findings below.\n\
             2. Produce the complete patched content of \"{artifact_name}\" that fixes ALL violations of {policy}.\n\
             3. Return ONLY the patched content: no explanations, no markdown, just the raw file content.\n\n\
             Current content:\n{current}\n\nLatest validator findings:\n{findings}",
            policy = context.policy_path,
        )
    }
}

#[async_trait]
impl Step for RemediationStep {
    fn name(&self) -> RouteDecision {
        RouteDecision::Remediation
    }

    fn successors(&self) -> Vec<RouteDecision> {
        vec![RouteDecision::Monitoring, RouteDecision::End]
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StepUpdate, WorkflowError> {
        let artifact_name = state
            .recover_artifact_name()
            .ok_or(WorkflowError::MissingArtifactName)?;
        let instruction = Self::instruction(state, &artifact_name);
        let mut turn = self.node.invoke(state, &instruction, &self.ctx).await?;

        let patched_content = strip_code_fences(&turn.final_text).to_string();
        let patched_name = patched_artifact_name(&artifact_name);
        let patched_path = self.ctx.scratch_dir.join(&patched_name);

        let mut context = state.context.clone();
        if context.artifact_name.is_empty() {
            context.artifact_name.clone_from(&artifact_name);
        }
        context.remediation_cycles += 1;

        let summary = match tokio::fs::write(&patched_path, &patched_content).await {
            Ok(()) => {
                tracing::info!(path = %patched_path.display(), "patched artifact saved");
                context.current_artifact.clone_from(&patched_name);
                context.patched_content = Some(patched_content);
                format!(
                    "Remediation completed:\n\nOriginal file: {artifact_name}\nPatched file: {patched_name}\n"
                )
            }
            Err(e) => {
                tracing::warn!(path = %patched_path.display(), error = %e, "failed to save patched artifact");
                format!(
                    "Remediation completed:\n\nOriginal file: {artifact_name}\nPatched file could not be written: {e}\n"
                )
            }
        };

        let goto = if context.remediation_cycles >= self.max_cycles {
            tracing::warn!(
                cycles = context.remediation_cycles,
                "remediation cycle limit reached"
            );
            context.incomplete = true;
            RouteDecision::End
        } else {
            RouteDecision::Monitoring
        };

        turn.messages.pop();
        turn.messages
            .push(Message::step_output(RouteDecision::Remediation, summary));
        Ok(StepUpdate {
            messages: turn.messages,
            context: Some(context),
            goto,
        })
    }
}

// ── Command ─────────────────────────────────────────────────────────

/// Suggests CLI commands for a cloud-resource finding, then ends the run.
pub struct CommandStep {
    node: AgentNode,
    ctx: ExecutionContext,
    has_docs: bool,
}

impl CommandStep {
    pub fn new(node: AgentNode, ctx: ExecutionContext, has_docs: bool) -> Self {
        Self {
            node,
            ctx,
            has_docs,
        }
    }

    fn instruction(&self) -> String {
        let mut instruction = String::from(
            "You resolve cloud security findings by suggesting cloud CLI commands to run in a terminal. \
             Explain each step of the solution and keep it simple.",
        );
        if self.has_docs {
            instruction.push_str(
                " If you are unsure how to fix an issue with terminal commands, search the CLI documentation with your tool. Do not make up commands.",
            );
        }
        instruction
    }
}

#[async_trait]
impl Step for CommandStep {
    fn name(&self) -> RouteDecision {
        RouteDecision::Command
    }

    fn successors(&self) -> Vec<RouteDecision> {
        vec![RouteDecision::End]
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StepUpdate, WorkflowError> {
        let turn = self.node.invoke(state, &self.instruction(), &self.ctx).await?;
        Ok(StepUpdate {
            messages: turn.messages,
            context: None,
            goto: RouteDecision::End,
        })
    }
}
