use super::traits::{ExecutionContext, Tool, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

pub const VALIDATE_TOOL_NAME: &str = "validate";

/// Maximum output size in bytes (1 MB).
const MAX_OUTPUT_BYTES: usize = 1_048_576;

/// Runs the policy validator CLI against an artifact in the scratch directory.
///
/// The command line is `<program> <args...> <scratch>/<artifact> --policy <policy>`.
/// Stdout comes back verbatim regardless of exit code; the validator signals
/// violations in its text, not its status.
pub struct ValidateTool {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ValidateTool {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

/// Bare file names only; the scratch directory is the sole root.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

#[async_trait]
impl Tool for ValidateTool {
    fn name(&self) -> &str {
        VALIDATE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Validate a configuration artifact in the scratch directory against a policy and return the validator's report"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "artifact_name": {
                    "type": "string",
                    "description": "File name of the artifact, without directories"
                },
                "policy_path": {
                    "type": "string",
                    "description": "Path of the policy file to validate against"
                }
            },
            "required": ["artifact_name", "policy_path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
        let artifact_name = args
            .get("artifact_name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Missing 'artifact_name' parameter"))?;
        let policy_path = args
            .get("policy_path")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Missing 'policy_path' parameter"))?;

        if !is_plain_file_name(artifact_name) {
            return Ok(ToolResult::failed(format!(
                "artifact_name must be a bare file name: {artifact_name}"
            )));
        }

        let target = ctx.scratch_dir.join(artifact_name);
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&target)
            .arg("--policy")
            .arg(policy_path)
            .kill_on_drop(true);

        tracing::debug!(
            run_id = %ctx.run_id,
            program = %self.program,
            artifact = artifact_name,
            policy = policy_path,
            "running validator"
        );

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let mut stdout = String::from_utf8_lossy(&output.stdout).to_string();
                if stdout.len() > MAX_OUTPUT_BYTES {
                    stdout.truncate(stdout.floor_char_boundary(MAX_OUTPUT_BYTES));
                    stdout.push_str("\n... [output truncated at 1MB]");
                }
                Ok(ToolResult {
                    success: true,
                    output: stdout,
                    error: None,
                })
            }
            Ok(Err(e)) => Ok(ToolResult::failed(format!(
                "Failed to run validator '{}': {e}",
                self.program
            ))),
            Err(_) => Ok(ToolResult::failed(format!(
                "Validator timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}
