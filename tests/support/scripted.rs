#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use confwarden::providers::{
    ContentBlock, Provider, ProviderMessage, ProviderResponse, StopReason,
};
use confwarden::tools::{ExecutionContext, Tool, ToolResult, ToolSpec, VALIDATE_TOOL_NAME};
use serde_json::{Value, json};

/// Replays queued responses in order and records every system prompt.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    system_prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            system_prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.system_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat_with_system(
        &self,
        _system_prompt: Option<&str>,
        _message: &str,
        _model: &str,
        _temperature: f64,
    ) -> Result<String> {
        bail!("plain chat is not scripted")
    }

    async fn chat_with_tools(
        &self,
        system_prompt: Option<&str>,
        _messages: &[ProviderMessage],
        _tools: &[ToolSpec],
        _model: &str,
        _temperature: f64,
    ) -> Result<ProviderResponse> {
        self.system_prompts
            .lock()
            .unwrap()
            .push(system_prompt.unwrap_or_default().to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("script exhausted"))
    }

    fn supports_tool_calling(&self) -> bool {
        true
    }
}

pub fn answer(text: &str) -> ProviderResponse {
    ProviderResponse::text_only(text)
}

pub fn tool_call(id: &str, name: &str, input: Value) -> ProviderResponse {
    ProviderResponse {
        text: String::new(),
        input_tokens: None,
        output_tokens: None,
        model: None,
        content_blocks: vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
        stop_reason: Some(StopReason::ToolUse),
    }
}

pub fn validate_call(id: &str, artifact_name: &str, policy_path: &str) -> ProviderResponse {
    tool_call(
        id,
        VALIDATE_TOOL_NAME,
        json!({ "artifact_name": artifact_name, "policy_path": policy_path }),
    )
}

/// Stands in for the policy CLI: any scratch file mentioning port 22 fails.
pub struct FakeValidator;

impl FakeValidator {
    pub fn output_for(path: &str, content: &str) -> String {
        if content.contains("\"22\"") || content.contains("=22") {
            format!(
                "FAIL - {path} - main - port 22 is not allowed\n\n\
                 1 test, 0 passed, 0 warnings, 1 failure, 0 exceptions\n"
            )
        } else {
            "\n1 test, 1 passed, 0 warnings, 0 failures, 0 exceptions\n".to_string()
        }
    }
}

#[async_trait]
impl Tool for FakeValidator {
    fn name(&self) -> &str {
        VALIDATE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Validate an artifact against a policy"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "artifact_name": { "type": "string" },
                "policy_path": { "type": "string" }
            },
            "required": ["artifact_name", "policy_path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let name = args
            .get("artifact_name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing artifact_name"))?;
        let path = ctx.scratch_dir.join(name);
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(ToolResult::ok(Self::output_for(
            &path.display().to_string(),
            &content,
        )))
    }
}
