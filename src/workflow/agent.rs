use super::route::RouteDecision;
use super::state::{Author, ConversationState, Message, Role, ToolInvocation};
use crate::error::WorkflowError;
use crate::providers::{ContentBlock, MessageRole, ProviderMessage, traits::Provider};
use crate::tools::{ExecutionContext, ToolRegistry, ToolResult};
use std::sync::Arc;

/// Absolute upper bound on reason-act iterations, regardless of configuration.
pub const AGENT_ITERATION_HARD_CAP: u32 = 25;

const ITERATION_CAP_NOTICE: &str = "Stopped after reaching the reasoning iteration limit.";

/// Record of a single tool invocation within the loop.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: serde_json::Value,
    pub result: ToolResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStop {
    /// The model answered without requesting more tools.
    Completed,
    MaxIterations,
}

/// Messages produced by one node invocation; the last is the tagged output.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub messages: Vec<Message>,
    pub final_text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub stop: AgentStop,
}

/// Bounded reason-act loop over the provider for one workflow step.
pub struct AgentNode {
    step: RouteDecision,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    tools: Arc<ToolRegistry>,
    max_iterations: u32,
}

impl AgentNode {
    pub fn new(
        step: RouteDecision,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f64,
        tools: Arc<ToolRegistry>,
        max_iterations: u32,
    ) -> Self {
        Self {
            step,
            provider,
            model: model.into(),
            temperature,
            tools,
            max_iterations: max_iterations.clamp(1, AGENT_ITERATION_HARD_CAP),
        }
    }

    pub async fn invoke(
        &self,
        state: &ConversationState,
        instruction: &str,
        ctx: &ExecutionContext,
    ) -> Result<AgentTurn, WorkflowError> {
        let specs = self.tools.specs();
        if !specs.is_empty() && !self.provider.supports_tool_calling() {
            return Err(WorkflowError::ToolsUnsupported {
                step: self.step,
                provider: self.provider.name().to_string(),
            });
        }
        let mut history: Vec<ProviderMessage> =
            state.messages().iter().map(to_provider_message).collect();
        let mut produced = Vec::new();
        let mut tool_calls = Vec::new();
        let mut last_text = String::new();

        for iteration in 0..self.max_iterations {
            let response = self
                .provider
                .chat_with_tools(
                    Some(instruction),
                    &history,
                    &specs,
                    &self.model,
                    self.temperature,
                )
                .await
                .map_err(|source| WorkflowError::Reasoning {
                    step: self.step,
                    source,
                })?;

            tracing::debug!(
                step = %self.step,
                iteration = iteration + 1,
                tokens = ?response.total_tokens(),
                stop = ?response.stop_reason,
                "provider turn"
            );
            let uses = response.tool_uses();
            if uses.is_empty() {
                let output = Message::step_output(self.step, response.text.clone());
                produced.push(output);
                tracing::debug!(step = %self.step, iterations = iteration + 1, "agent answered");
                return Ok(AgentTurn {
                    messages: produced,
                    final_text: response.text,
                    tool_calls,
                    stop: AgentStop::Completed,
                });
            }

            let invocations: Vec<ToolInvocation> = uses
                .iter()
                .map(|(id, name, input)| ToolInvocation {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                    args: (*input).clone(),
                })
                .collect();
            if !response.text.is_empty() {
                last_text.clone_from(&response.text);
            }
            let request = Message::tool_request(self.step, response.text.clone(), invocations);
            history.push(to_provider_message(&request));
            let pending = request.tool_calls.clone();
            produced.push(request);

            for call in pending {
                tracing::info!(step = %self.step, tool = %call.name, "executing tool");
                let result = self.tools.execute(&call.name, call.args.clone(), ctx).await;
                let output = Message::tool_output(self.step, call.id.clone(), result.observation());
                history.push(to_provider_message(&output));
                produced.push(output);
                tool_calls.push(ToolCallRecord {
                    name: call.name,
                    args: call.args,
                    result,
                });
            }
        }

        tracing::warn!(
            step = %self.step,
            max_iterations = self.max_iterations,
            "agent reached iteration limit"
        );
        let final_text = if last_text.is_empty() {
            ITERATION_CAP_NOTICE.to_string()
        } else {
            last_text
        };
        produced.push(Message::step_output(self.step, final_text.clone()));
        Ok(AgentTurn {
            messages: produced,
            final_text,
            tool_calls,
            stop: AgentStop::MaxIterations,
        })
    }
}

/// Map a log message into the provider vocabulary. Terminal outputs of
/// steps are relayed as labelled user turns so every step sees what its
/// colleagues concluded.
fn to_provider_message(message: &Message) -> ProviderMessage {
    match (message.role, &message.author) {
        (Role::Human, _) => ProviderMessage::user(message.content.clone()),
        (Role::Tool, _) => ProviderMessage::tool_result(
            message.tool_call_id.clone().unwrap_or_default(),
            message.content.clone(),
            false,
        ),
        (Role::Agent, _) if !message.tool_calls.is_empty() => {
            let mut content = Vec::with_capacity(message.tool_calls.len() + 1);
            if !message.content.is_empty() {
                content.push(ContentBlock::Text {
                    text: message.content.clone(),
                });
            }
            content.extend(message.tool_calls.iter().map(|call| ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.args.clone(),
            }));
            ProviderMessage {
                role: MessageRole::Assistant,
                content,
            }
        }
        (Role::Agent, Author::Step(step)) => {
            ProviderMessage::user(format!("[{step}] {}", message.content))
        }
        (Role::Agent, Author::External) => ProviderMessage::user(message.content.clone()),
    }
}
