//! Server-side façade over the knowledge index, intent resolver and action executor.
//!
//! Resources and tools are addressed the same way whether they are reached over MCP or
//! in-process:
//!
//! | kind     | address                        | payload                              |
//! |----------|--------------------------------|--------------------------------------|
//! | resource | `knowledge://search/{query}`   | `SearchResponse` for the query       |
//! | resource | `knowledge://search/`          | the full corpus                      |
//! | resource | `config://persona`             | persona document                     |
//! | resource | `config://intents`             | intents document                     |
//! | resource | `config://actions`             | actions document                     |
//! | tool     | `resolve_intent`               | `{user_query}` → `IntentResult`      |
//! | tool     | `create_ticket`                | `{issue}` → receipt                  |
//! | tool     | `update_record`                | `{record_id, fields}` → receipt      |
//! | tool     | `send_notification`            | `{channel, payload}` → receipt       |
//!
//! The service never decides when an action runs; it executes whatever it is asked to.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::actions::{ActionError, ActionExecutor, ActionReceipt, ActionRequest, ACTION_NAMES};
use crate::deployment::Deployment;
use crate::intent::{IntentResolver, IntentResult};
use crate::knowledge::{IndexError, KnowledgeIndex, SearchResponse};

pub const SEARCH_URI_PREFIX: &str = "knowledge://search/";
pub const PERSONA_URI: &str = "config://persona";
pub const INTENTS_URI: &str = "config://intents";
pub const ACTIONS_URI: &str = "config://actions";

pub const RESOLVE_INTENT_TOOL: &str = "resolve_intent";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("unknown resource `{0}`")]
    UnknownResource(String),
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("could not encode response: {0}")]
    Encode(String),
}

/// Addressable resource, parsed from a URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceRef<'a> {
    Search(&'a str),
    SearchAll,
    Persona,
    Intents,
    Actions,
}

impl<'a> ResourceRef<'a> {
    pub fn parse(uri: &'a str) -> Option<Self> {
        match uri {
            PERSONA_URI => Some(Self::Persona),
            INTENTS_URI => Some(Self::Intents),
            ACTIONS_URI => Some(Self::Actions),
            SEARCH_URI_PREFIX => Some(Self::SearchAll),
            _ => uri.strip_prefix(SEARCH_URI_PREFIX).map(Self::Search),
        }
    }
}

pub fn search_uri(query: &str) -> String {
    format!("{SEARCH_URI_PREFIX}{query}")
}

#[derive(Debug, Deserialize)]
struct ResolveIntentArgs {
    user_query: String,
}

pub struct KnowledgeService {
    deployment: Arc<Deployment>,
    index: KnowledgeIndex,
    resolver: IntentResolver,
    executor: Arc<dyn ActionExecutor>,
}

impl std::fmt::Debug for KnowledgeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeService")
            .field("entries", &self.index.len())
            .field("search_mode", &self.index.mode())
            .field("intent_rules", &self.resolver.rules().len())
            .finish()
    }
}

impl KnowledgeService {
    pub fn new(
        deployment: Arc<Deployment>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Result<Self, IndexError> {
        let search = &deployment.persona.search;
        let index = KnowledgeIndex::build(&deployment.knowledge, &search.text_processing, search.mode)?;
        let resolver = IntentResolver::new(&deployment.intents);
        Ok(Self { deployment, index, resolver, executor })
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    pub fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    pub fn search(&self, query: &str) -> SearchResponse {
        self.index.search(query).to_response()
    }

    pub fn search_all(&self) -> SearchResponse {
        SearchResponse {
            search_mode: None,
            matches: self.index.search_all().into_iter().map(|entry| entry.to_record()).collect(),
            response_time_ms: 0.0,
        }
    }

    pub fn resolve_intent(&self, user_query: &str) -> IntentResult {
        let result = self.resolver.resolve(user_query);
        tracing::debug!(
            event_name = "knowbot.intent.resolved",
            intent = %result.intent,
            severity = result.severity.as_str(),
            confidence = result.confidence.as_str(),
            "intent resolved"
        );
        result
    }

    pub async fn execute(&self, request: &ActionRequest) -> Result<ActionReceipt, ActionError> {
        self.executor.execute(request).await
    }

    pub fn read_resource(&self, uri: &str) -> Result<Value, ServiceError> {
        let resource =
            ResourceRef::parse(uri).ok_or_else(|| ServiceError::UnknownResource(uri.to_string()))?;
        match resource {
            ResourceRef::Search(query) => encode(&self.search(query)),
            ResourceRef::SearchAll => encode(&self.search_all()),
            ResourceRef::Persona => Ok(self.deployment.raw.persona.clone()),
            ResourceRef::Intents => Ok(self.deployment.raw.intents.clone()),
            ResourceRef::Actions => Ok(self.deployment.raw.actions.clone()),
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ServiceError> {
        if name == RESOLVE_INTENT_TOOL {
            let args = serde_json::from_value::<ResolveIntentArgs>(arguments).map_err(|error| {
                ServiceError::InvalidArguments { tool: name.to_string(), message: error.to_string() }
            })?;
            return encode(&self.resolve_intent(&args.user_query));
        }

        if !ACTION_NAMES.contains(&name) {
            return Err(ServiceError::UnknownTool(name.to_string()));
        }
        let request = ActionRequest::from_parts(name, arguments)?;
        let receipt = self.execute(&request).await?;
        encode(&receipt)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, ServiceError> {
    serde_json::to_value(value).map_err(|error| ServiceError::Encode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{search_uri, KnowledgeService, ResourceRef, ServiceError};
    use crate::actions::RecordingExecutor;
    use crate::deployment::{
        ActionsConfig, Deployment, EscalationPhrases, IntentDefinition, IntentResolutionConfig,
        IntentsConfig, KnowledgeRecord, PersonaConfig, SearchConfig, SecurityTriggers,
        TextProcessingConfig,
    };
    use crate::intent::Severity;
    use crate::knowledge::SearchMode;

    fn deployment() -> Deployment {
        Deployment::from_parts(
            PersonaConfig {
                tone: "friendly".to_string(),
                verbosity: "concise".to_string(),
                style: "plain".to_string(),
                search: SearchConfig {
                    mode: SearchMode::Keyword,
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
            vec![KnowledgeRecord {
                id: "1".to_string(),
                title: "Reset".to_string(),
                content: "password reset steps".to_string(),
                category: "account".to_string(),
            }],
        )
    }

    fn service() -> (KnowledgeService, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::new());
        let service = KnowledgeService::new(Arc::new(deployment()), executor.clone())
            .expect("service should build");
        (service, executor)
    }

    #[test]
    fn parses_resource_uris() {
        assert_eq!(ResourceRef::parse("knowledge://search/"), Some(ResourceRef::SearchAll));
        assert_eq!(
            ResourceRef::parse("knowledge://search/reset password"),
            Some(ResourceRef::Search("reset password"))
        );
        assert_eq!(ResourceRef::parse("config://persona"), Some(ResourceRef::Persona));
        assert_eq!(ResourceRef::parse("config://secrets"), None);
    }

    #[test]
    fn search_resource_returns_wire_payload() {
        let (service, _) = service();
        let payload = service
            .read_resource(&search_uri("How do I reset my password?"))
            .expect("search resource");

        assert_eq!(payload["search_mode"], "keyword");
        assert_eq!(payload["matches"][0]["id"], "1");
        assert!(payload["response_time_ms"].is_number());
    }

    #[test]
    fn search_all_and_config_resources() {
        let (service, _) = service();

        let all = service.read_resource("knowledge://search/").expect("search all");
        assert_eq!(all["matches"].as_array().map(Vec::len), Some(1));
        assert_eq!(all["response_time_ms"], 0.0);

        let persona = service.read_resource("config://persona").expect("persona");
        assert_eq!(persona["tone"], "friendly");

        let error = service.read_resource("config://unknown").expect_err("unknown resource");
        assert_eq!(error, ServiceError::UnknownResource("config://unknown".to_string()));
    }

    #[tokio::test]
    async fn resolve_intent_tool_returns_intent_result() {
        let (service, _) = service();
        let payload = service
            .call_tool("resolve_intent", json!({"user_query": "where is my invoice"}))
            .await
            .expect("resolve_intent");
        assert_eq!(payload, json!({"intent": "billing", "severity": "medium", "confidence": "high"}));

        let error = service.call_tool("resolve_intent", json!({})).await.expect_err("bad args");
        assert!(matches!(error, ServiceError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn action_tools_execute_through_executor() {
        let (service, executor) = service();
        let payload = service
            .call_tool("create_ticket", json!({"issue": "cannot log in"}))
            .await
            .expect("create_ticket");

        assert_eq!(payload, json!({"status": "created", "issue": "cannot log in"}));
        assert_eq!(executor.count("create_ticket"), 1);

        let error = service.call_tool("drop_tables", json!({})).await.expect_err("unknown tool");
        assert_eq!(error, ServiceError::UnknownTool("drop_tables".to_string()));
    }
}
