//! Integration tests for the Knowbot MCP server
//!
//! These tests verify that the MCP server correctly handles:
//! - Server info and tool registration
//! - Resource reads (search, search-all, config documents)
//! - Tool calls, including action execution
//! - Error mapping for unknown resources

use std::collections::BTreeMap;
use std::sync::Arc;

use knowbot_core::deployment::{
    ActionsConfig, Deployment, EscalationPhrases, IntentDefinition, IntentResolutionConfig,
    IntentsConfig, KnowledgeRecord, PersonaConfig, SearchConfig, SecurityTriggers,
    TextProcessingConfig,
};
use knowbot_core::{KnowledgeService, RecordingExecutor, SearchMode, Severity};
use knowbot_mcp::{CreateTicketParams, KnowbotMcpServer, ResolveIntentParams, UpdateRecordParams};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, ReadResourceResult, ResourceContents};
use rmcp::ServerHandler;
use serde_json::{json, Value};

fn deployment() -> Deployment {
    Deployment::from_parts(
        PersonaConfig {
            tone: "friendly".to_string(),
            verbosity: "concise".to_string(),
            style: "plain".to_string(),
            search: SearchConfig {
                mode: SearchMode::Hybrid,
                text_processing: TextProcessingConfig {
                    stopwords: vec!["how".into(), "do".into(), "i".into(), "my".into()],
                    min_token_match: 1,
                },
            },
            escalation_phrases: EscalationPhrases::default(),
        },
        IntentsConfig {
            intents: vec![IntentDefinition {
                name: "billing".to_string(),
                primary_triggers: vec!["invoice".to_string()],
                secondary_triggers: Vec::new(),
                severity: Severity::Medium,
            }],
            intent_resolution: IntentResolutionConfig {
                fallback_intent: "general".to_string(),
                security_triggers: SecurityTriggers::default(),
            },
        },
        ActionsConfig::default(),
        vec![
            KnowledgeRecord {
                id: "kb-1".to_string(),
                title: "Reset password".to_string(),
                content: "Use the forgot password link.".to_string(),
                category: "account".to_string(),
            },
            KnowledgeRecord {
                id: "kb-2".to_string(),
                title: "Invoices".to_string(),
                content: "Invoices are emailed monthly.".to_string(),
                category: "billing".to_string(),
            },
        ],
    )
}

fn test_server() -> (KnowbotMcpServer, Arc<RecordingExecutor>) {
    let executor = Arc::new(RecordingExecutor::new());
    let service = KnowledgeService::new(Arc::new(deployment()), executor.clone())
        .expect("service should build");
    (KnowbotMcpServer::new(Arc::new(service)), executor)
}

fn resource_json(result: &ReadResourceResult) -> Value {
    match &result.contents[0] {
        ResourceContents::TextResourceContents { text, .. } => {
            serde_json::from_str(text).expect("resource text is json")
        }
        other => panic!("unexpected resource contents: {other:?}"),
    }
}

fn tool_json(result: &CallToolResult) -> Value {
    let text = result.content[0].as_text().expect("tool returns text content");
    serde_json::from_str(&text.text).expect("tool text is json")
}

#[tokio::test]
async fn test_server_info() {
    let (server, _) = test_server();
    let info = server.get_info();

    assert!(info.capabilities.tools.is_some());
    assert!(info.capabilities.resources.is_some());
    assert!(info.instructions.unwrap_or_default().contains("knowledge://search/"));
}

#[tokio::test]
async fn test_list_tools() {
    let (server, _) = test_server();

    assert_eq!(
        server.tool_names(),
        vec!["create_ticket", "resolve_intent", "send_notification", "update_record"]
    );
}

#[tokio::test]
async fn test_every_listed_resource_is_readable() {
    let (server, _) = test_server();
    let resources = server.listed_resources();
    let uris = resources.iter().map(|resource| resource.uri.as_str()).collect::<Vec<_>>();

    assert_eq!(
        uris,
        vec!["knowledge://search/", "config://persona", "config://intents", "config://actions"]
    );
    for uri in uris {
        assert!(server.read_uri(uri).is_ok(), "listed resource `{uri}` should be readable");
    }
}

#[tokio::test]
async fn test_search_resources() {
    let (server, _) = test_server();

    let search = server.read_uri("knowledge://search/how do I reset my password").expect("search");
    let payload = resource_json(&search);
    assert_eq!(payload["search_mode"], "hybrid");
    assert_eq!(payload["matches"][0]["id"], "kb-1");

    let all = server.read_uri("knowledge://search/").expect("search all");
    assert_eq!(resource_json(&all)["matches"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_config_resources_and_unknown_uri() {
    let (server, _) = test_server();

    let persona = server.read_uri("config://persona").expect("persona");
    assert_eq!(resource_json(&persona)["tone"], "friendly");

    let intents = server.read_uri("config://intents").expect("intents");
    assert_eq!(resource_json(&intents)["intents"][0]["name"], "billing");

    let error = server.read_uri("config://secrets").expect_err("unknown resource");
    assert_eq!(error.code.0, -32002);
}

#[tokio::test]
async fn test_resolve_intent_tool() {
    let (server, _) = test_server();
    let result = server
        .resolve_intent(Parameters(ResolveIntentParams {
            user_query: "Where is my INVOICE?".to_string(),
        }))
        .await
        .expect("resolve_intent");

    assert_eq!(
        tool_json(&result),
        json!({"intent": "billing", "severity": "medium", "confidence": "high"})
    );
}

#[tokio::test]
async fn test_action_tools_execute_every_call() {
    let (server, executor) = test_server();

    for _ in 0..2 {
        let result = server
            .create_ticket(Parameters(CreateTicketParams { issue: "printer jam".to_string() }))
            .await
            .expect("create_ticket");
        assert_eq!(tool_json(&result), json!({"status": "created", "issue": "printer jam"}));
    }
    assert_eq!(executor.count("create_ticket"), 2);

    let mut fields = BTreeMap::new();
    fields.insert("status".to_string(), json!("closed"));
    let result = server
        .update_record(Parameters(UpdateRecordParams { record_id: "r-9".to_string(), fields }))
        .await
        .expect("update_record");
    assert_eq!(tool_json(&result)["status"], "updated");
    assert_eq!(executor.count("update_record"), 1);
}
