//! MCP Server Implementation
//!
//! Implements the Model Context Protocol server for Knowbot on top of a shared
//! [`KnowledgeService`].

use std::collections::BTreeMap;
use std::sync::Arc;

use knowbot_core::actions::{CREATE_TICKET, SEND_NOTIFICATION, UPDATE_RECORD};
use knowbot_core::service::{
    KnowledgeService, ACTIONS_URI, INTENTS_URI, PERSONA_URI, RESOLVE_INTENT_TOOL,
    SEARCH_URI_PREFIX,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars,
    service::RequestContext,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData, RoleServer, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::McpError;

/// Concrete resources listed to clients, with display names. Per-query searches live under
/// the search prefix and are read directly.
const LISTED_RESOURCES: &[(&str, &str)] = &[
    (SEARCH_URI_PREFIX, "knowledge-base"),
    (PERSONA_URI, "persona"),
    (INTENTS_URI, "intents"),
    (ACTIONS_URI, "actions"),
];

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ResolveIntentParams {
    #[schemars(description = "The user's free-text question")]
    pub user_query: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateTicketParams {
    #[schemars(description = "Description of the issue, usually the user's own words")]
    pub issue: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateRecordParams {
    #[schemars(description = "Identifier of the record to update")]
    pub record_id: String,
    #[schemars(description = "Fields to set on the record")]
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SendNotificationParams {
    #[schemars(description = "Channel to notify")]
    pub channel: String,
    #[schemars(description = "Notification body")]
    pub payload: String,
}

/// Main MCP server for Knowbot
#[derive(Clone)]
pub struct KnowbotMcpServer {
    service: Arc<KnowledgeService>,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for KnowbotMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowbotMcpServer").field("service", &self.service).finish()
    }
}

#[tool_router]
impl KnowbotMcpServer {
    pub fn new(service: Arc<KnowledgeService>) -> Self {
        Self { service, tool_router: Self::tool_router() }
    }

    /// Names of the registered tools, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names = self
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Run the server with stdio transport
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        info!(event_name = "knowbot.mcp.starting", transport = "stdio", "starting MCP server");

        let service = self.serve(stdio()).await?;
        service.waiting().await?;

        info!(event_name = "knowbot.mcp.stopped", "MCP server shutdown complete");
        Ok(())
    }

    pub fn listed_resources(&self) -> Vec<Resource> {
        LISTED_RESOURCES
            .iter()
            .map(|(uri, name)| RawResource::new(*uri, name.to_string()).no_annotation())
            .collect()
    }

    /// Reads a resource by URI and returns it as JSON text content.
    pub fn read_uri(&self, uri: &str) -> Result<ReadResourceResult, ErrorData> {
        debug!(uri, "read_resource called");
        let payload = self.service.read_resource(uri).map_err(McpError::from)?;
        let text = serde_json::to_string(&payload)
            .map_err(|error| McpError::Internal(error.to_string()))?;
        Ok(ReadResourceResult { contents: vec![ResourceContents::text(text, uri)] })
    }

    async fn call(&self, name: &str, arguments: Value) -> Result<CallToolResult, ErrorData> {
        debug!(tool = name, "tool called");
        let payload = self.service.call_tool(name, arguments).await.map_err(McpError::from)?;
        Ok(CallToolResult::success(vec![Content::json(payload)?]))
    }

    #[tool(description = "Resolve the intent, severity and confidence of a user query")]
    pub async fn resolve_intent(
        &self,
        Parameters(params): Parameters<ResolveIntentParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(RESOLVE_INTENT_TOOL, json!({"user_query": params.user_query})).await
    }

    #[tool(description = "Create a support ticket for an issue")]
    pub async fn create_ticket(
        &self,
        Parameters(params): Parameters<CreateTicketParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(CREATE_TICKET, json!({"issue": params.issue})).await
    }

    #[tool(description = "Update fields on an existing record")]
    pub async fn update_record(
        &self,
        Parameters(params): Parameters<UpdateRecordParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(UPDATE_RECORD, json!({"record_id": params.record_id, "fields": params.fields}))
            .await
    }

    #[tool(description = "Send a notification to a channel")]
    pub async fn send_notification(
        &self,
        Parameters(params): Parameters<SendNotificationParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(SEND_NOTIFICATION, json!({"channel": params.channel, "payload": params.payload}))
            .await
    }
}

#[tool_handler]
impl ServerHandler for KnowbotMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().enable_resources().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Knowbot MCP Server - knowledge search, intent resolution and support actions. \
                 Read knowledge://search/{query} to search the knowledge base, \
                 knowledge://search/ for the whole corpus and config://persona, \
                 config://intents or config://actions for the deployment configuration."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult { resources: self.listed_resources(), next_cursor: None })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        self.read_uri(&request.uri)
    }
}
