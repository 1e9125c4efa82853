use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::deployment::DeploymentError;
use crate::knowledge::IndexError;

/// Failures surfaced to a session or to the process bootstrap.
///
/// A query that finds no knowledge is not an error: the orchestrator answers it with the
/// category fallback instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KnowbotError {
    #[error("required configuration is missing or invalid: {detail}")]
    ConfigMissing { path: Option<PathBuf>, detail: String },
    #[error("malformed response from {source_name}: {detail}")]
    MalformedResponse { source_name: String, detail: String },
    #[error("empty query")]
    EmptyQuery,
    #[error("{collaborator} is unavailable: {detail}")]
    DownstreamUnavailable { collaborator: String, detail: String },
    #[error("session has already terminated")]
    SessionTerminated,
}

impl KnowbotError {
    pub fn malformed(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedResponse { source_name: source_name.into(), detail: detail.into() }
    }

    pub fn unavailable(collaborator: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DownstreamUnavailable { collaborator: collaborator.into(), detail: detail.into() }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::ConfigMissing { .. } => "config_missing",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::EmptyQuery => "empty_query",
            Self::DownstreamUnavailable { .. } => "downstream_unavailable",
            Self::SessionTerminated => "session_terminated",
        }
    }

    /// Whether the session can keep accepting input after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::EmptyQuery | Self::MalformedResponse { .. } | Self::DownstreamUnavailable { .. } => {
                true
            }
            Self::ConfigMissing { .. } | Self::SessionTerminated => false,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ConfigMissing { .. } => "The assistant is not configured. Contact an administrator.",
            Self::MalformedResponse { .. } => {
                "Something went wrong while processing that request. Please try again."
            }
            Self::EmptyQuery => "Please enter a question.",
            Self::DownstreamUnavailable { .. } => {
                "A required service is temporarily unavailable. Please retry shortly."
            }
            Self::SessionTerminated => "This conversation has ended.",
        }
    }
}

impl From<DeploymentError> for KnowbotError {
    fn from(value: DeploymentError) -> Self {
        let path = match &value {
            DeploymentError::Missing(path)
            | DeploymentError::Read { path, .. }
            | DeploymentError::Parse { path, .. } => Some(path.clone()),
        };
        Self::ConfigMissing { path, detail: value.to_string() }
    }
}

impl From<ConfigError> for KnowbotError {
    fn from(value: ConfigError) -> Self {
        Self::ConfigMissing { path: None, detail: value.to_string() }
    }
}

impl From<IndexError> for KnowbotError {
    fn from(value: IndexError) -> Self {
        Self::ConfigMissing { path: None, detail: value.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::deployment::DeploymentError;
    use crate::errors::KnowbotError;
    use crate::knowledge::IndexError;

    #[test]
    fn missing_deployment_file_maps_to_config_missing() {
        let error = KnowbotError::from(DeploymentError::Missing(PathBuf::from("config/persona.yaml")));

        assert!(matches!(
            error,
            KnowbotError::ConfigMissing { path: Some(ref path), .. }
                if path.ends_with("persona.yaml")
        ));
        assert!(!error.is_recoverable());
        assert_eq!(error.error_class(), "config_missing");
    }

    #[test]
    fn duplicate_index_ids_are_fatal() {
        let error = KnowbotError::from(IndexError::DuplicateId("kb-1".to_string()));
        assert!(matches!(error, KnowbotError::ConfigMissing { .. }));
        assert!(error.to_string().contains("kb-1"));
    }

    #[test]
    fn turn_level_failures_are_recoverable() {
        assert!(KnowbotError::EmptyQuery.is_recoverable());
        assert!(KnowbotError::malformed("config://persona", "missing tone").is_recoverable());
        assert!(KnowbotError::unavailable("llm", "connection refused").is_recoverable());
        assert!(!KnowbotError::SessionTerminated.is_recoverable());
    }

    #[test]
    fn user_messages_do_not_leak_details() {
        let error = KnowbotError::unavailable("llm", "api key sk-123 rejected");
        assert!(!error.user_message().contains("sk-123"));
        assert_eq!(error.user_message(), "A required service is temporarily unavailable. Please retry shortly.");
    }
}
