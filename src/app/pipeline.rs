use super::scratch::{ScratchDir, bare_name};
use crate::config::Config;
use crate::delivery::{PullRequestClient, PullRequestDraft, ReportClient, render_pull_request_body};
use crate::error::{PolicyError, WardenError};
use crate::formats::{ArtifactFormat, PolicySet, bridge_in, bridge_out, clear_patches};
use crate::providers::Provider;
use crate::report::{ApprovalReport, ReportInputs, build_report};
use crate::tools::{ExecutionContext, Tool, ToolRegistry};
use crate::workflow::{
    AgentNode, ClassifierRouter, CommandStep, ConversationState, KeywordRouter, Message,
    MonitoringStep, RemediationStep, RouteDecision, Router, RouterMode, RunContext, RunOutcome,
    WorkflowEngine,
};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Knobs for one pipeline instance, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub temperature: f64,
    pub max_steps: usize,
    pub max_remediation_cycles: u32,
    pub agent_max_iterations: u32,
    pub max_concurrent_runs: usize,
    pub policies: PolicySet,
    pub pull_request_title: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self, PolicyError> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_steps: config.max_steps,
            max_remediation_cycles: config.max_remediation_cycles,
            agent_max_iterations: config.agent_max_iterations,
            max_concurrent_runs: config.max_concurrent_runs,
            policies: PolicySet::compile(&config.policies)?,
            pull_request_title: config.github.title.clone(),
        })
    }
}

/// Router selected by configuration.
pub fn build_router(config: &Config, provider: Arc<dyn Provider>) -> Router {
    match config.router.mode {
        RouterMode::Keyword => Router::Keyword(KeywordRouter::new(
            &config.router.failure_markers,
            &config.router.success_markers,
        )),
        RouterMode::Classifier => {
            Router::Classifier(ClassifierRouter::new(provider, config.model.clone()))
        }
    }
}

/// One artifact to remediate.
#[derive(Debug, Clone)]
pub struct RemediationRequest {
    /// Repository path; its last segment names the scratch file.
    pub remote_path: String,
    pub content: String,
    /// `owner/name`, required for a pull request.
    pub repository: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: ApprovalReport,
    pub path: Vec<RouteDecision>,
    pub report_delivered: bool,
    pub pull_request_url: Option<String>,
}

/// Glue for a remediation run: scratch write, policy selection, format
/// bridging, workflow, report and delivery.
pub struct Pipeline {
    settings: PipelineSettings,
    provider: Arc<dyn Provider>,
    router: Arc<Router>,
    validation_tools: Arc<ToolRegistry>,
    command_tools: Arc<ToolRegistry>,
    scratch: Arc<ScratchDir>,
    reporter: Option<ReportClient>,
    pull_requests: Option<PullRequestClient>,
    permits: Semaphore,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        provider: Arc<dyn Provider>,
        router: Router,
        validator: Arc<dyn Tool>,
        scratch: Arc<ScratchDir>,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent_runs.max(1));
        Self {
            settings,
            provider,
            router: Arc::new(router),
            validation_tools: Arc::new(ToolRegistry::new().with(validator)),
            command_tools: Arc::new(ToolRegistry::new()),
            scratch,
            reporter: None,
            pull_requests: None,
            permits,
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: ReportClient) -> Self {
        self.reporter = Some(reporter);
        self
    }

    #[must_use]
    pub fn with_pull_requests(mut self, client: PullRequestClient) -> Self {
        self.pull_requests = Some(client);
        self
    }

    /// Documentation search for the command step.
    #[must_use]
    pub fn with_doc_search(mut self, retriever: Arc<dyn Tool>) -> Self {
        self.command_tools = Arc::new(ToolRegistry::new().with(retriever));
        self
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    fn node(&self, step: RouteDecision, tools: &Arc<ToolRegistry>) -> AgentNode {
        AgentNode::new(
            step,
            Arc::clone(&self.provider),
            self.settings.model.clone(),
            self.settings.temperature,
            Arc::clone(tools),
            self.settings.agent_max_iterations,
        )
    }

    /// Monitoring ⇄ remediation loop.
    pub fn remediation_workflow(&self, ctx: &ExecutionContext) -> WorkflowEngine {
        let no_tools = Arc::new(ToolRegistry::new());
        WorkflowEngine::new()
            .with_step(Arc::new(MonitoringStep::new(
                self.node(RouteDecision::Monitoring, &self.validation_tools),
                Arc::clone(&self.router),
                ctx.clone(),
            )))
            .with_step(Arc::new(RemediationStep::new(
                self.node(RouteDecision::Remediation, &no_tools),
                ctx.clone(),
                self.settings.max_remediation_cycles,
            )))
    }

    pub fn command_workflow(&self, ctx: &ExecutionContext) -> WorkflowEngine {
        WorkflowEngine::new().with_step(Arc::new(CommandStep::new(
            self.node(RouteDecision::Command, &self.command_tools),
            ctx.clone(),
            !self.command_tools.is_empty(),
        )))
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, WardenError> {
        Ok(self.permits.acquire().await.context("run limiter closed")?)
    }

    /// Remediate one artifact end to end. Delivery failures are logged and
    /// do not fail the run.
    pub async fn remediate(&self, request: &RemediationRequest) -> Result<RunSummary, WardenError> {
        let _permit = self.acquire().await?;
        let filename = bare_name(&request.remote_path)?;
        let _guard = self.scratch.lock(filename).await;

        let policy = self
            .settings
            .policies
            .select(filename, &request.content)?
            .to_string();
        tracing::info!(path = %request.remote_path, policy = %policy, "remediation run started");

        let started_at = Utc::now();
        clear_patches(self.scratch.path(), filename).await?;
        self.scratch.write(filename, &request.content).await?;
        let bridged = bridge_in(self.scratch.path(), filename).await?;

        let ctx = ExecutionContext::new(self.scratch.path());
        let context = RunContext::for_artifact(&bridged.validated_name, &policy, &bridged.content);
        let outcome: RunOutcome = self
            .remediation_workflow(&ctx)
            .run(
                ConversationState::for_artifact(context),
                RouteDecision::Monitoring,
                self.settings.max_steps,
            )
            .await?;

        let restored = match bridge_out(self.scratch.path(), &bridged).await {
            Ok(restored) => restored,
            Err(err) => {
                tracing::warn!(error = %err, "could not convert patched artifact back");
                None
            }
        };
        let finished_at = Utc::now();

        let mut report = build_report(
            &outcome.state,
            ReportInputs {
                scratch_dir: self.scratch.path(),
                remote_path: &request.remote_path,
                started_at,
                finished_at,
                incomplete: !outcome.is_complete(),
            },
        )
        .await?;
        if bridged.format == ArtifactFormat::Properties {
            report.patched_content = restored.unwrap_or_else(|| request.content.clone());
        }
        tracing::info!(
            run_id = %ctx.run_id,
            status = %report.policy_compliance.validation_status,
            violations = report.policy_compliance.violations_detected,
            changes = report.changes_summary.total_changes,
            steps = outcome.invocations,
            "remediation run finished"
        );

        let report_delivered = self.deliver_report(&report).await;
        let pull_request_url = self.open_pull_request(request, &report).await;

        Ok(RunSummary {
            report,
            path: outcome.path,
            report_delivered,
            pull_request_url,
        })
    }

    async fn deliver_report(&self, report: &ApprovalReport) -> bool {
        let Some(reporter) = &self.reporter else {
            return false;
        };
        match reporter.post(report).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(url = %reporter.report_url(), error = %err, "report delivery failed");
                false
            }
        }
    }

    async fn open_pull_request(
        &self,
        request: &RemediationRequest,
        report: &ApprovalReport,
    ) -> Option<String> {
        let client = self.pull_requests.as_ref()?;
        let Some(repository) = request.repository.as_deref() else {
            tracing::debug!(path = %request.remote_path, "no repository known; skipping pull request");
            return None;
        };
        if report.changes_summary.is_empty() {
            tracing::info!(path = %request.remote_path, "no changes to propose");
            return None;
        }

        let draft = PullRequestDraft {
            repo_full_name: repository.to_string(),
            path: request.remote_path.clone(),
            content: report.patched_content.clone(),
            title: self.settings.pull_request_title.clone(),
            body: render_pull_request_body(report, &request.remote_path),
        };
        match client.open(&draft, Utc::now()).await {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(repo = repository, error = %err, "pull request failed");
                None
            }
        }
    }

    /// Suggest CLI commands for a cloud-resource finding.
    pub async fn suggest_commands(&self, kind: &str, description: &str) -> Result<String, WardenError> {
        let _permit = self.acquire().await?;
        let ctx = ExecutionContext::new(self.scratch.path());
        let initial = ConversationState::new(
            Message::human(format!("Resource finding ({kind}):\n{description}")),
            RunContext::default(),
        );
        let outcome = self
            .command_workflow(&ctx)
            .run(initial, RouteDecision::Command, self.settings.max_steps)
            .await?;
        let answer = outcome
            .state
            .latest()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        tracing::info!(run_id = %ctx.run_id, kind, "command suggestion ready");
        Ok(answer)
    }
}
