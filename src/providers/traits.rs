use super::response::{ContentBlock, MessageRole, ProviderMessage, ProviderResponse};
use crate::tools::traits::ToolSpec;
use async_trait::async_trait;

/// Flatten structured messages into labelled text for providers without
/// native message arrays. Tool results are kept since monitoring findings
/// live there.
pub fn messages_to_text(messages: &[ProviderMessage]) -> String {
    messages
        .iter()
        .filter_map(|msg| {
            let role_label = match msg.role {
                MessageRole::User => "User:",
                MessageRole::Assistant => "Assistant:",
                MessageRole::System => "System:",
            };

            let parts: Vec<&str> = msg
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ToolResult { content, .. } => Some(content.as_str()),
                    ContentBlock::ToolUse { .. } => None,
                })
                .collect();

            if parts.is_empty() {
                None
            } else {
                Some(format!("{role_label} {}", parts.join(" ")))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The opaque reasoning capability.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat_with_system(
        &self,
        system_prompt: Option<&str>,
        message: &str,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String>;

    /// Chat with structured tool support.
    /// Default: flattens messages into text and ignores tools.
    async fn chat_with_tools(
        &self,
        system_prompt: Option<&str>,
        messages: &[ProviderMessage],
        _tools: &[ToolSpec],
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<ProviderResponse> {
        let text = messages_to_text(messages);
        let answer = self
            .chat_with_system(system_prompt, &text, model, temperature)
            .await?;
        Ok(ProviderResponse::text_only(answer))
    }

    /// Agent nodes that carry tools refuse providers answering `false`,
    /// since the default `chat_with_tools` drops the tool list.
    fn supports_tool_calling(&self) -> bool {
        false
    }
}
