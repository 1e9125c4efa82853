//! Knowbot MCP Server Binary
//!
//! ## Usage
//!
//! ```bash
//! # Serve the bundle named in knowbot.toml
//! knowbot-mcp
//!
//! # Serve another industry bundle
//! KNOWBOT_CONFIG_DIR=industries/telecom/config KNOWBOT_DATA_DIR=industries/telecom/data knowbot-mcp
//! ```
//!
//! Logs go to stderr; stdout carries the protocol.

use std::sync::Arc;

use anyhow::Result;
use knowbot_core::config::{AppConfig, LoadOptions, LogFormat};
use knowbot_core::{Deployment, KnowledgeService, RecordingExecutor};
use knowbot_mcp::KnowbotMcpServer;
use tracing::Level;

fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_ansi(false)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let deployment =
        Deployment::load(&config.deployment.config_dir, &config.deployment.data_dir)?;
    let service = KnowledgeService::new(Arc::new(deployment), Arc::new(RecordingExecutor::new()))?;

    tracing::info!(
        event_name = "knowbot.mcp.ready",
        knowledge_entries = service.index().len(),
        search_mode = service.index().mode().as_str(),
        "knowledge service ready"
    );

    KnowbotMcpServer::new(Arc::new(service)).run_stdio().await
}
