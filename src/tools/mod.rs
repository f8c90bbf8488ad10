pub mod registry;
pub mod retriever;
pub mod traits;
pub mod validate;

pub use registry::ToolRegistry;
pub use retriever::{RETRIEVER_TOOL_NAME, RetrieverTool};
pub use traits::{ExecutionContext, Tool, ToolResult, ToolSpec};
pub use validate::{VALIDATE_TOOL_NAME, ValidateTool};
