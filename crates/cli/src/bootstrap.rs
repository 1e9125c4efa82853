//! Shared command wiring: config, logging, the knowledge service and the orchestrator.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use knowbot_agent::{
    BackendClient, ConversationOrchestrator, HttpLlmClient, LlmClient, LocalBackend,
};
use knowbot_core::config::{AppConfig, ConfigError, LoadOptions, LogFormat};
use knowbot_core::errors::KnowbotError;
use knowbot_core::{Deployment, KnowledgeService, RecordingExecutor};
use tracing::Level;

/// Everything a command needs to run turns against one deployment bundle.
pub struct AppContext {
    pub config: AppConfig,
    pub service: Arc<KnowledgeService>,
    pub executor: Arc<RecordingExecutor>,
    pub orchestrator: ConversationOrchestrator,
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::load(LoadOptions::default())
}

/// Installs the global subscriber once; later calls are no-ops. Logs go to stderr so command
/// output on stdout stays machine-readable.
pub fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn load_service(
    config: &AppConfig,
) -> Result<(Arc<KnowledgeService>, Arc<RecordingExecutor>), KnowbotError> {
    let deployment =
        Deployment::load(&config.deployment.config_dir, &config.deployment.data_dir)?;
    let executor = Arc::new(RecordingExecutor::new());
    let service = KnowledgeService::new(Arc::new(deployment), executor.clone())?;
    Ok((Arc::new(service), executor))
}

pub fn build_llm(config: &AppConfig) -> Result<Arc<dyn LlmClient>> {
    let client = HttpLlmClient::from_config(&config.llm).context("failed to build llm client")?;
    Ok(Arc::new(client))
}

pub fn build_context(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<AppContext, KnowbotError> {
    let (service, executor) = load_service(&config)?;
    let backend = BackendClient::new(Arc::new(LocalBackend::new(service.clone())));
    let orchestrator = ConversationOrchestrator::new(backend, llm, config.session.clone());

    Ok(AppContext { config, service, executor, orchestrator })
}

pub fn block_on<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
