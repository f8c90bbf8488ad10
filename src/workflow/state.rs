use super::route::RouteDecision;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PROMPT_FILENAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"for this file "([^"]+)""#).ok());

/// Build the opening human message of a remediation run.
pub fn initial_prompt(content: &str, artifact_name: &str, policy_path: &str) -> String {
    format!(
        "This is the file content:\n{content}What are the recommended changes for this file \"{artifact_name}\" against the policy in {policy_path}?"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Agent,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    External,
    Step(RouteDecision),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub author: Author,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            author: Author::External,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Intermediate agent turn that requests tools.
    pub fn tool_request(
        step: RouteDecision,
        content: impl Into<String>,
        tool_calls: Vec<ToolInvocation>,
    ) -> Self {
        Self {
            role: Role::Agent,
            author: Author::Step(step),
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_output(
        step: RouteDecision,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            author: Author::Step(step),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// A step's terminal contribution.
    pub fn step_output(step: RouteDecision, content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            author: Author::Step(step),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn is_tagged(&self, step: RouteDecision) -> bool {
        self.author == Author::Step(step) && self.role == Role::Agent && self.tool_calls.is_empty()
    }
}

/// Typed facts threaded through a run alongside the message log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub artifact_name: String,
    pub policy_path: String,
    pub artifact_content: String,
    /// Artifact the next validation targets: the original, then the latest patch.
    pub current_artifact: String,
    pub last_validation: Option<String>,
    pub patched_content: Option<String>,
    pub remediation_cycles: u32,
    pub incomplete: bool,
}

impl RunContext {
    pub fn for_artifact(
        artifact_name: impl Into<String>,
        policy_path: impl Into<String>,
        artifact_content: impl Into<String>,
    ) -> Self {
        let artifact_name = artifact_name.into();
        Self {
            current_artifact: artifact_name.clone(),
            artifact_name,
            policy_path: policy_path.into(),
            artifact_content: artifact_content.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
    pub context: RunContext,
}

impl ConversationState {
    pub fn new(initial: Message, context: RunContext) -> Self {
        Self {
            messages: vec![initial],
            context,
        }
    }

    /// Opening state for remediating one artifact.
    pub fn for_artifact(context: RunContext) -> Self {
        let prompt = initial_prompt(
            &context.artifact_content,
            &context.artifact_name,
            &context.policy_path,
        );
        Self::new(Message::human(prompt), context)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub(crate) fn append(&mut self, messages: Vec<Message>) {
        self.messages.extend(messages);
    }

    /// First tool invocation of the run, in chronological order.
    pub fn first_tool_invocation(&self) -> Option<&ToolInvocation> {
        self.messages.iter().flat_map(|m| m.tool_calls.iter()).next()
    }

    pub fn tool_outputs(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::Tool)
    }

    /// Artifact name from context, else the quoted filename in the earliest
    /// human prompt that carries one.
    pub fn recover_artifact_name(&self) -> Option<String> {
        if !self.context.artifact_name.is_empty() {
            return Some(self.context.artifact_name.clone());
        }
        let pattern = PROMPT_FILENAME.as_ref()?;
        self.messages
            .iter()
            .filter(|m| m.role == Role::Human)
            .find_map(|m| pattern.captures(&m.content))
            .and_then(|caps| caps.get(1))
            .map(|name| name.as_str().to_string())
    }
}
