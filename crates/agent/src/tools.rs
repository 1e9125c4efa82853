//! Client side of the knowledge service boundary.
//!
//! The orchestrator only ever talks to a [`KnowledgeBackend`] through URIs and tool names, the
//! same surface the MCP server exposes. [`BackendClient`] adds the decode step that turns raw
//! JSON payloads into typed values.

use std::sync::Arc;

use async_trait::async_trait;
use knowbot_core::actions::{ActionError, ActionReceipt, ActionRequest};
use knowbot_core::deployment::{ActionsConfig, PersonaConfig};
use knowbot_core::errors::KnowbotError;
use knowbot_core::intent::IntentResult;
use knowbot_core::knowledge::SearchResponse;
use knowbot_core::service::{
    search_uri, KnowledgeService, ServiceError, ACTIONS_URI, PERSONA_URI, RESOLVE_INTENT_TOOL,
    SEARCH_URI_PREFIX,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

#[async_trait]
pub trait KnowledgeBackend: Send + Sync {
    async fn read_resource(&self, uri: &str) -> Result<Value, KnowbotError>;
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, KnowbotError>;
}

/// In-process backend over a shared [`KnowledgeService`].
#[derive(Clone, Debug)]
pub struct LocalBackend {
    service: Arc<KnowledgeService>,
}

impl LocalBackend {
    pub fn new(service: Arc<KnowledgeService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &KnowledgeService {
        &self.service
    }
}

#[async_trait]
impl KnowledgeBackend for LocalBackend {
    async fn read_resource(&self, uri: &str) -> Result<Value, KnowbotError> {
        self.service.read_resource(uri).map_err(|error| service_error(uri, error))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, KnowbotError> {
        self.service.call_tool(name, arguments).await.map_err(|error| service_error(name, error))
    }
}

fn service_error(target: &str, error: ServiceError) -> KnowbotError {
    match error {
        ServiceError::Action(ActionError::Failed { action, message }) => {
            KnowbotError::unavailable(action, message)
        }
        other => KnowbotError::malformed(target, other.to_string()),
    }
}

/// Typed view over a backend. Every payload is decoded; a shape mismatch is a
/// `MalformedResponse` naming the resource or tool it came from.
#[derive(Clone)]
pub struct BackendClient {
    backend: Arc<dyn KnowledgeBackend>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient").finish_non_exhaustive()
    }
}

impl BackendClient {
    pub fn new(backend: Arc<dyn KnowledgeBackend>) -> Self {
        Self { backend }
    }

    pub async fn persona(&self) -> Result<PersonaConfig, KnowbotError> {
        decode(PERSONA_URI, self.backend.read_resource(PERSONA_URI).await?)
    }

    pub async fn action_policy(&self) -> Result<ActionsConfig, KnowbotError> {
        decode(ACTIONS_URI, self.backend.read_resource(ACTIONS_URI).await?)
    }

    pub async fn search(&self, query: &str) -> Result<SearchResponse, KnowbotError> {
        let uri = search_uri(query);
        decode(&uri, self.backend.read_resource(&uri).await?)
    }

    pub async fn search_all(&self) -> Result<SearchResponse, KnowbotError> {
        decode(SEARCH_URI_PREFIX, self.backend.read_resource(SEARCH_URI_PREFIX).await?)
    }

    pub async fn resolve_intent(&self, user_query: &str) -> Result<IntentResult, KnowbotError> {
        let payload =
            self.backend.call_tool(RESOLVE_INTENT_TOOL, json!({"user_query": user_query})).await?;
        decode(RESOLVE_INTENT_TOOL, payload)
    }

    pub async fn execute(&self, request: &ActionRequest) -> Result<ActionReceipt, KnowbotError> {
        let name = request.name();
        let mut arguments = serde_json::to_value(request)
            .map_err(|error| KnowbotError::malformed(name, error.to_string()))?;
        if let Value::Object(object) = &mut arguments {
            object.remove("action");
        }
        decode(name, self.backend.call_tool(name, arguments).await?)
    }
}

fn decode<T: DeserializeOwned>(source_name: &str, payload: Value) -> Result<T, KnowbotError> {
    serde_json::from_value(payload)
        .map_err(|error| KnowbotError::malformed(source_name, error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use knowbot_core::actions::ActionRequest;
    use knowbot_core::errors::KnowbotError;
    use serde_json::{json, Value};

    use super::{BackendClient, KnowledgeBackend};

    struct CannedBackend {
        resource: Value,
        tool: Result<Value, KnowbotError>,
    }

    #[async_trait]
    impl KnowledgeBackend for CannedBackend {
        async fn read_resource(&self, _uri: &str) -> Result<Value, KnowbotError> {
            Ok(self.resource.clone())
        }

        async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<Value, KnowbotError> {
            self.tool.clone()
        }
    }

    fn client(resource: Value, tool: Result<Value, KnowbotError>) -> BackendClient {
        BackendClient::new(Arc::new(CannedBackend { resource, tool }))
    }

    #[tokio::test]
    async fn malformed_persona_names_its_source() {
        let backend = client(json!({"tone": "friendly"}), Ok(Value::Null));
        let error = backend.persona().await.expect_err("persona without verbosity");

        assert!(matches!(
            error,
            KnowbotError::MalformedResponse { ref source_name, .. } if source_name == "config://persona"
        ));
    }

    #[tokio::test]
    async fn decodes_intent_and_receipt_payloads() {
        let intents = client(
            json!({}),
            Ok(json!({"intent": "billing", "severity": "medium", "confidence": "high"})),
        );
        let intent = intents.resolve_intent("invoice").await.expect("intent decodes");
        assert_eq!(intent.intent, "billing");

        let actions = client(json!({}), Ok(json!({"status": "created", "issue": "help"})));
        let receipt = actions
            .execute(&ActionRequest::CreateTicket { issue: "help".to_string() })
            .await
            .expect("receipt decodes");
        assert_eq!(receipt.status, "created");
        assert_eq!(receipt.fields["issue"], "help");
    }

    #[tokio::test]
    async fn downstream_errors_pass_through() {
        let backend = client(json!({}), Err(KnowbotError::unavailable("create_ticket", "offline")));
        let error = backend
            .execute(&ActionRequest::CreateTicket { issue: "help".to_string() })
            .await
            .expect_err("tool failure propagates");
        assert!(matches!(error, KnowbotError::DownstreamUnavailable { .. }));
    }
}
