use super::traits::{ExecutionContext, Tool, ToolResult};
use crate::retrieval::{DocumentIndex, EmbeddingProvider};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::sync::Arc;

pub const RETRIEVER_TOOL_NAME: &str = "doc_search";

/// Similarity search over the cloud CLI reference documentation.
pub struct RetrieverTool {
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl RetrieverTool {
    pub fn new(
        index: Arc<DocumentIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }
}

#[async_trait]
impl Tool for RetrieverTool {
    fn name(&self) -> &str {
        RETRIEVER_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Searches the cloud CLI documentation for relevant command information and references."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look up in the documentation"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing 'query' parameter"))?;

        let passages = self
            .index
            .search(self.embedder.as_ref(), query, self.top_k)
            .await?;
        if passages.is_empty() {
            return Ok(ToolResult::ok("No matching documentation found."));
        }

        let mut output = String::new();
        for (i, passage) in passages.iter().enumerate() {
            if i > 0 {
                output.push_str("\n\n");
            }
            let _ = write!(output, "[page {}]\n{}", passage.page, passage.text);
        }
        Ok(ToolResult::ok(output))
    }
}
