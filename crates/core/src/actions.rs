//! Side-effecting actions and their executor.
//!
//! Execution is fire-and-return: no retries and no idempotency key, so two identical
//! requests produce two effects. Callers are responsible for invoking an action at most once
//! per decision.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const CREATE_TICKET: &str = "create_ticket";
pub const UPDATE_RECORD: &str = "update_record";
pub const SEND_NOTIFICATION: &str = "send_notification";

pub const ACTION_NAMES: &[&str] = &[CREATE_TICKET, UPDATE_RECORD, SEND_NOTIFICATION];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    CreateTicket { issue: String },
    UpdateRecord { record_id: String, fields: BTreeMap<String, Value> },
    SendNotification { channel: String, payload: String },
}

impl ActionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateTicket { .. } => CREATE_TICKET,
            Self::UpdateRecord { .. } => UPDATE_RECORD,
            Self::SendNotification { .. } => SEND_NOTIFICATION,
        }
    }

    /// Builds a request from an action name and its JSON arguments.
    pub fn from_parts(name: &str, arguments: Value) -> Result<Self, ActionError> {
        if !ACTION_NAMES.contains(&name) {
            return Err(ActionError::UnknownAction(name.to_string()));
        }
        let mut object = match arguments {
            Value::Object(object) => object,
            Value::Null => Map::new(),
            other => {
                return Err(ActionError::InvalidArguments {
                    action: name.to_string(),
                    message: format!("expected an object, got `{other}`"),
                })
            }
        };
        object.insert("action".to_string(), Value::String(name.to_string()));
        serde_json::from_value(Value::Object(object)).map_err(|error| {
            ActionError::InvalidArguments { action: name.to_string(), message: error.to_string() }
        })
    }
}

/// Status plus the echoed request fields, e.g. `{"status": "created", "issue": "..."}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub status: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ActionReceipt {
    pub fn for_request(request: &ActionRequest) -> Self {
        let mut fields = Map::new();
        let status = match request {
            ActionRequest::CreateTicket { issue } => {
                fields.insert("issue".to_string(), Value::String(issue.clone()));
                "created"
            }
            ActionRequest::UpdateRecord { record_id, fields: updates } => {
                fields.insert("record_id".to_string(), Value::String(record_id.clone()));
                fields.insert(
                    "fields".to_string(),
                    Value::Object(updates.clone().into_iter().collect()),
                );
                "updated"
            }
            ActionRequest::SendNotification { channel, payload } => {
                fields.insert("channel".to_string(), Value::String(channel.clone()));
                fields.insert("payload".to_string(), Value::String(payload.clone()));
                "sent"
            }
        };
        Self { status: status.to_string(), fields }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("invalid arguments for `{action}`: {message}")]
    InvalidArguments { action: String, message: String },
    #[error("action `{action}` failed: {message}")]
    Failed { action: String, message: String },
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, request: &ActionRequest) -> Result<ActionReceipt, ActionError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutedAction {
    pub request: ActionRequest,
    pub receipt: ActionReceipt,
    pub executed_at: DateTime<Utc>,
}

/// Executor that records every effect in memory and logs it.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<ExecutedAction>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> Vec<ExecutedAction> {
        self.executed.lock().map(|executed| executed.clone()).unwrap_or_default()
    }

    pub fn count(&self, action_name: &str) -> usize {
        self.executed
            .lock()
            .map(|executed| {
                executed.iter().filter(|entry| entry.request.name() == action_name).count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, request: &ActionRequest) -> Result<ActionReceipt, ActionError> {
        let receipt = ActionReceipt::for_request(request);
        let entry =
            ExecutedAction { request: request.clone(), receipt: receipt.clone(), executed_at: Utc::now() };

        self.executed
            .lock()
            .map_err(|_| ActionError::Failed {
                action: request.name().to_string(),
                message: "action log is poisoned".to_string(),
            })?
            .push(entry);

        tracing::info!(
            event_name = "knowbot.action.executed",
            action = request.name(),
            status = %receipt.status,
            "action executed"
        );

        Ok(receipt)
    }
}
