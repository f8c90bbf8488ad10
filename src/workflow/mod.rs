pub mod agent;
pub mod engine;
pub mod route;
pub mod state;
pub mod steps;

pub use agent::{AGENT_ITERATION_HARD_CAP, AgentNode, AgentStop, AgentTurn, ToolCallRecord};
pub use engine::{Completion, RunOutcome, Step, StepUpdate, WorkflowEngine};
pub use route::{
    ClassifierRouter, KeywordRouter, ROUTE_TOOL_NAME, RouteDecision, RouteTargets, Router,
    RouterMode,
};
pub use state::{
    Author, ConversationState, Message, Role, RunContext, ToolInvocation, initial_prompt,
};
pub use steps::{
    CommandStep, FAILURE_MARKER, MonitoringStep, RemediationStep, SUCCESS_MARKER,
    patched_artifact_name, strip_code_fences,
};
