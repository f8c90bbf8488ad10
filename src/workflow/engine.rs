use super::route::RouteDecision;
use super::state::{ConversationState, Message, RunContext};
use crate::error::WorkflowError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// What a step hands back to the engine.
#[derive(Debug, Clone)]
pub struct StepUpdate {
    /// Appended in order; the last one must be the step's tagged output.
    pub messages: Vec<Message>,
    pub context: Option<RunContext>,
    pub goto: RouteDecision,
}

/// One node of the workflow graph.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> RouteDecision;

    /// Steps this one may route to, for graph rendering.
    fn successors(&self) -> Vec<RouteDecision>;

    async fn invoke(&self, state: &ConversationState) -> Result<StepUpdate, WorkflowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    BudgetExhausted,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: ConversationState,
    pub invocations: usize,
    pub path: Vec<RouteDecision>,
    pub completion: Completion,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Finished && !self.state.context.incomplete
    }
}

/// Runs registered steps in sequence, following each step's routing
/// decision until `End` or the step budget runs out.
#[derive(Default, Clone)]
pub struct WorkflowEngine {
    steps: BTreeMap<RouteDecision, Arc<dyn Step>>,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step: Arc<dyn Step>) {
        self.steps.insert(step.name(), step);
    }

    pub fn with_step(mut self, step: Arc<dyn Step>) -> Self {
        self.register(step);
        self
    }

    pub fn members(&self) -> Vec<RouteDecision> {
        self.steps.keys().copied().collect()
    }

    pub async fn run(
        &self,
        initial: ConversationState,
        entry: RouteDecision,
        max_steps: usize,
    ) -> Result<RunOutcome, WorkflowError> {
        if max_steps == 0 {
            return Err(WorkflowError::ZeroBudget);
        }
        if initial.messages().len() != 1 {
            return Err(WorkflowError::InvalidInitialState(initial.messages().len()));
        }

        let mut state = initial;
        let mut path = Vec::new();
        let mut current = entry;

        loop {
            if current == RouteDecision::End {
                tracing::info!(steps = path.len(), "workflow finished");
                return Ok(RunOutcome {
                    state,
                    invocations: path.len(),
                    path,
                    completion: Completion::Finished,
                });
            }
            if path.len() >= max_steps {
                tracing::warn!(max_steps, pending = %current, "step budget exhausted");
                state.context.incomplete = true;
                return Ok(RunOutcome {
                    state,
                    invocations: path.len(),
                    path,
                    completion: Completion::BudgetExhausted,
                });
            }

            let step = self
                .steps
                .get(&current)
                .ok_or(WorkflowError::UnknownStep(current))?;
            let update = step.invoke(&state).await?;

            if !update.messages.last().is_some_and(|m| m.is_tagged(current)) {
                return Err(WorkflowError::UntaggedStepOutput { step: current });
            }

            state.append(update.messages);
            if let Some(context) = update.context {
                state.context = context;
            }
            path.push(current);

            tracing::info!(
                step = %current,
                next = %update.goto,
                invocation = path.len(),
                "step completed"
            );
            current = update.goto;
        }
    }

    /// Mermaid flowchart of the registered transitions.
    pub fn mermaid(&self, entry: RouteDecision) -> String {
        let mut out = String::from("flowchart TD\n");
        out.push_str("    __start__([start])\n");
        out.push_str("    __end__([end])\n");
        let _ = writeln!(out, "    __start__ --> {entry}");
        for (name, step) in &self.steps {
            for next in step.successors() {
                let target = if next == RouteDecision::End {
                    "__end__".to_string()
                } else {
                    next.to_string()
                };
                let _ = writeln!(out, "    {name} -.-> {target}");
            }
        }
        out
    }
}
