use super::pipeline::{Pipeline, PipelineSettings, RemediationRequest, build_router};
use super::scratch::ScratchDir;
use super::watch::watch;
use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::delivery::{PullRequestClient, ReportClient};
use crate::ingest::EventStream;
use crate::providers::openai::DEFAULT_BASE_URL;
use crate::providers::{OpenAiProvider, Provider};
use crate::retrieval::{DocumentIndex, EmbeddingProvider, OpenAiEmbedding};
use crate::tools::{ExecutionContext, RetrieverTool, Tool, ValidateTool};
use crate::workflow::RouteDecision;
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn build_provider(config: &Config) -> Arc<dyn Provider> {
    Arc::new(OpenAiProvider::new(
        config.api_key.as_deref(),
        config.api_base.as_deref(),
    ))
}

fn build_embedder(config: &Config) -> OpenAiEmbedding {
    OpenAiEmbedding::new(
        config.api_base.as_deref().unwrap_or(DEFAULT_BASE_URL),
        config.api_key.as_deref(),
        &config.retriever.embedding_model,
    )
}

async fn build_doc_search(config: &Config) -> Result<Option<Arc<dyn Tool>>> {
    if !config.retriever.enabled {
        return Ok(None);
    }
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(build_embedder(config));
    let index = DocumentIndex::load_or_build(
        &config.retriever.index_path,
        &config.retriever.source_path,
        embedder.as_ref(),
        config.retriever.index_params(),
    )
    .await?;
    let Some(index) = index else {
        tracing::warn!(
            source = %config.retriever.source_path.display(),
            "documentation source not found; command step runs without doc search"
        );
        return Ok(None);
    };
    Ok(Some(Arc::new(RetrieverTool::new(
        Arc::new(index),
        embedder,
        config.retriever.top_k,
    ))))
}

async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let provider = build_provider(config);
    let scratch = Arc::new(ScratchDir::create(&config.scratch_dir).await?);
    let validator = Arc::new(ValidateTool::new(
        config.validator.program.clone(),
        config.validator.args.clone(),
        config.validator_timeout(),
    ));
    let router = build_router(config, Arc::clone(&provider));

    let mut pipeline = Pipeline::new(
        PipelineSettings::from_config(config)?,
        provider,
        router,
        validator,
        scratch,
    );

    if let Some(endpoint) = config.reporting.endpoint.as_deref() {
        pipeline = pipeline.with_reporter(ReportClient::new(endpoint)?);
    }
    if config.github.enabled {
        match config.github.token.as_deref() {
            Some(token) => {
                pipeline = pipeline.with_pull_requests(PullRequestClient::new(
                    &config.github.api_base,
                    token,
                    &config.github.base_branch,
                )?);
            }
            None => tracing::warn!("github.enabled is set but no token is configured"),
        }
    }
    if let Some(retriever) = build_doc_search(config).await? {
        pipeline = pipeline.with_doc_search(retriever);
    }
    Ok(pipeline)
}

async fn run_watch(config: &Config) -> Result<()> {
    let endpoint = config.validate()?;
    let stream = EventStream::new(endpoint, &config.watch.allowed_paths)?;
    let pipeline = Arc::new(build_pipeline(config).await?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; shutting down");
                cancel.cancel();
            }
        });
    }

    tracing::info!(url = %stream.url(), "watching for configuration changes");
    watch(pipeline, stream, cancel).await;
    Ok(())
}

async fn run_file(
    config: &Config,
    file: &Path,
    remote_path: Option<String>,
    repo: Option<String>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let remote_path = match remote_path {
        Some(path) => path,
        None => file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("file path has no file name")?,
    };

    let pipeline = build_pipeline(config).await?;
    let summary = pipeline
        .remediate(&RemediationRequest {
            remote_path,
            content,
            repository: repo,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&summary.report)?);
    if let Some(url) = summary.pull_request_url {
        println!("Pull request: {url}");
    }
    Ok(())
}

async fn run_index(config: &Config, rebuild: bool) -> Result<()> {
    let index_path = &config.retriever.index_path;
    if rebuild && tokio::fs::try_exists(index_path).await.unwrap_or(false) {
        tokio::fs::remove_file(index_path)
            .await
            .with_context(|| format!("removing {}", index_path.display()))?;
    }
    let embedder = build_embedder(config);
    let Some(index) = DocumentIndex::load_or_build(
        index_path,
        &config.retriever.source_path,
        &embedder,
        config.retriever.index_params(),
    )
    .await?
    else {
        bail!(
            "documentation source {} not found",
            config.retriever.source_path.display()
        );
    };
    println!(
        "Index at {} holds {} passages ({})",
        index_path.display(),
        index.len(),
        index.embedding_model
    );
    Ok(())
}

async fn run_graph(config: &Config) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let ctx = ExecutionContext::new(pipeline.scratch().path());
    println!(
        "{}",
        pipeline
            .remediation_workflow(&ctx)
            .mermaid(RouteDecision::Monitoring)
    );
    println!(
        "{}",
        pipeline.command_workflow(&ctx).mermaid(RouteDecision::Command)
    );
    Ok(())
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Watch => run_watch(&config).await,
        Commands::Run {
            file,
            remote_path,
            repo,
        } => run_file(&config, &file, remote_path, repo).await,
        Commands::Index { rebuild } => run_index(&config, rebuild).await,
        Commands::Graph => run_graph(&config).await,
    }
}
