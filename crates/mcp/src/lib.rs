//! Knowbot MCP (Model Context Protocol) server.
//!
//! Exposes the knowledge service to MCP clients over stdio:
//!
//! - resources: `knowledge://search/{query}`, `knowledge://search/`, `config://persona`,
//!   `config://intents`, `config://actions`
//! - tools: `resolve_intent`, `create_ticket`, `update_record`, `send_notification`
//!
//! The server executes what it is asked to. Deciding whether an action should fire is the
//! client's job.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use knowbot_core::{Deployment, KnowledgeService, RecordingExecutor};
//! use knowbot_mcp::KnowbotMcpServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let deployment = Deployment::load("config".as_ref(), "data".as_ref())?;
//!     let service =
//!         KnowledgeService::new(Arc::new(deployment), Arc::new(RecordingExecutor::new()))?;
//!     KnowbotMcpServer::new(Arc::new(service)).run_stdio().await
//! }
//! ```

mod server;

pub use server::{
    CreateTicketParams, KnowbotMcpServer, ResolveIntentParams, SendNotificationParams,
    UpdateRecordParams,
};

use knowbot_core::actions::ActionError;
use knowbot_core::service::ServiceError;
use rmcp::ErrorData;
use thiserror::Error;

/// Errors specific to MCP server operations
#[derive(Error, Debug)]
pub enum McpError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Not found maps to -32002, validation to -32602, everything else to -32603.
    pub fn into_error_data(self) -> ErrorData {
        let message = self.to_string();
        match self {
            McpError::NotFound(_) => ErrorData::resource_not_found(message, None),
            McpError::Validation(_) => ErrorData::invalid_params(message, None),
            McpError::ActionFailed(_) | McpError::Internal(_) => {
                ErrorData::internal_error(message, None)
            }
        }
    }
}

impl From<ServiceError> for McpError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::UnknownResource(uri) => McpError::NotFound(uri),
            ServiceError::UnknownTool(_)
            | ServiceError::InvalidArguments { .. }
            | ServiceError::Action(ActionError::UnknownAction(_))
            | ServiceError::Action(ActionError::InvalidArguments { .. }) => {
                McpError::Validation(value.to_string())
            }
            ServiceError::Action(ActionError::Failed { .. }) => {
                McpError::ActionFailed(value.to_string())
            }
            ServiceError::Encode(message) => McpError::Internal(message),
        }
    }
}

impl From<McpError> for ErrorData {
    fn from(value: McpError) -> Self {
        value.into_error_data()
    }
}

#[cfg(test)]
mod tests {
    use knowbot_core::actions::ActionError;
    use knowbot_core::service::ServiceError;

    use super::McpError;

    #[test]
    fn service_errors_map_to_json_rpc_codes() {
        let missing = McpError::from(ServiceError::UnknownResource("config://x".to_string()));
        assert_eq!(missing.into_error_data().code.0, -32002);

        let invalid = McpError::from(ServiceError::InvalidArguments {
            tool: "resolve_intent".to_string(),
            message: "missing field `user_query`".to_string(),
        });
        assert_eq!(invalid.into_error_data().code.0, -32602);

        let failed = McpError::from(ServiceError::Action(ActionError::Failed {
            action: "create_ticket".to_string(),
            message: "offline".to_string(),
        }));
        assert!(matches!(failed, McpError::ActionFailed(_)));
        assert_eq!(failed.into_error_data().code.0, -32603);
    }
}
