//! Industry deployment bundle.
//!
//! A deployment is the set of files that specialise the bot for one industry:
//!
//! - `<config_dir>/persona.yaml`: tone, search settings, escalation phrases
//! - `<config_dir>/intents.yaml`: ordered intent rules and resolution policy
//! - `<config_dir>/actions.yaml`: action catalog and escalation policy
//! - `<data_dir>/knowledge.json`: the knowledge corpus
//!
//! Switching industry means pointing at a different bundle; no code changes. Every file is
//! required, a missing one is fatal at startup. The raw documents are kept next to the
//! typed views so that `config://*` resources can serve them verbatim, including keys this
//! crate does not interpret.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::intent::Severity;
use crate::knowledge::SearchMode;

pub const PERSONA_FILE: &str = "persona.yaml";
pub const INTENTS_FILE: &str = "intents.yaml";
pub const ACTIONS_FILE: &str = "actions.yaml";
pub const KNOWLEDGE_FILE: &str = "knowledge.json";

pub const DEFAULT_FALLBACK_INTENT: &str = "general";

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("missing deployment file: `{0}`")]
    Missing(PathBuf),
    #[error("could not read deployment file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse deployment file `{path}`: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub tone: String,
    pub verbosity: String,
    pub style: String,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub escalation_phrases: EscalationPhrases,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub text_processing: TextProcessingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextProcessingConfig {
    #[serde(default)]
    pub stopwords: Vec<String>,
    #[serde(default = "default_min_token_match")]
    pub min_token_match: usize,
}

impl Default for TextProcessingConfig {
    fn default() -> Self {
        Self { stopwords: Vec::new(), min_token_match: default_min_token_match() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationPhrases {
    #[serde(default)]
    pub user_request_indicators: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentsConfig {
    #[serde(default)]
    pub intents: Vec<IntentDefinition>,
    #[serde(default)]
    pub intent_resolution: IntentResolutionConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub name: String,
    #[serde(default)]
    pub primary_triggers: Vec<String>,
    #[serde(default)]
    pub secondary_triggers: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResolutionConfig {
    #[serde(default = "default_fallback_intent")]
    pub fallback_intent: String,
    #[serde(default)]
    pub security_triggers: SecurityTriggers,
}

impl Default for IntentResolutionConfig {
    fn default() -> Self {
        Self { fallback_intent: default_fallback_intent(), security_triggers: Default::default() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityTriggers {
    #[serde(default)]
    pub force_general: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionsConfig {
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
    #[serde(default)]
    pub policy: ActionPolicyConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionPolicyConfig {
    #[serde(default = "default_escalation_severities")]
    pub escalation_severities: Vec<Severity>,
}

impl Default for ActionPolicyConfig {
    fn default() -> Self {
        Self { escalation_severities: default_escalation_severities() }
    }
}

impl ActionsConfig {
    /// An empty catalog enables every action; otherwise the action must be listed and enabled.
    pub fn is_enabled(&self, action_name: &str) -> bool {
        if self.actions.is_empty() {
            return true;
        }
        self.actions.iter().any(|action| action.name == action_name && action.enabled)
    }
}

/// One knowledge corpus record, as stored in `knowledge.json` and as returned by searches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDocuments {
    pub persona: Value,
    pub intents: Value,
    pub actions: Value,
}

#[derive(Clone, Debug)]
pub struct Deployment {
    pub persona: PersonaConfig,
    pub intents: IntentsConfig,
    pub actions: ActionsConfig,
    pub knowledge: Vec<KnowledgeRecord>,
    pub raw: RawDocuments,
}

impl Deployment {
    pub fn load(config_dir: &Path, data_dir: &Path) -> Result<Self, DeploymentError> {
        let persona_path = config_dir.join(PERSONA_FILE);
        let intents_path = config_dir.join(INTENTS_FILE);
        let actions_path = config_dir.join(ACTIONS_FILE);
        let knowledge_path = data_dir.join(KNOWLEDGE_FILE);

        let persona_raw = read_yaml_document(&persona_path)?;
        let intents_raw = read_yaml_document(&intents_path)?;
        let actions_raw = read_yaml_document(&actions_path)?;
        let knowledge_raw = read_json_document(&knowledge_path)?;

        let deployment = Self {
            persona: typed(&persona_path, &persona_raw)?,
            intents: typed(&intents_path, &intents_raw)?,
            actions: typed(&actions_path, &actions_raw)?,
            knowledge: typed(&knowledge_path, &knowledge_raw)?,
            raw: RawDocuments { persona: persona_raw, intents: intents_raw, actions: actions_raw },
        };

        tracing::info!(
            event_name = "knowbot.deployment.loaded",
            config_dir = %config_dir.display(),
            data_dir = %data_dir.display(),
            intents = deployment.intents.intents.len(),
            knowledge_entries = deployment.knowledge.len(),
            search_mode = deployment.persona.search.mode.as_str(),
            "deployment bundle loaded"
        );

        Ok(deployment)
    }

    /// Assembles a deployment from already-typed parts; the raw documents are derived from them.
    pub fn from_parts(
        persona: PersonaConfig,
        intents: IntentsConfig,
        actions: ActionsConfig,
        knowledge: Vec<KnowledgeRecord>,
    ) -> Self {
        let raw = RawDocuments {
            persona: serde_json::to_value(&persona).unwrap_or(Value::Null),
            intents: serde_json::to_value(&intents).unwrap_or(Value::Null),
            actions: serde_json::to_value(&actions).unwrap_or(Value::Null),
        };
        Self { persona, intents, actions, knowledge, raw }
    }
}

fn read_file(path: &Path) -> Result<String, DeploymentError> {
    if !path.exists() {
        return Err(DeploymentError::Missing(path.to_path_buf()));
    }
    fs::read_to_string(path)
        .map_err(|source| DeploymentError::Read { path: path.to_path_buf(), source })
}

fn read_yaml_document(path: &Path) -> Result<Value, DeploymentError> {
    let raw = read_file(path)?;
    let document = serde_yaml::from_str::<Value>(&raw).map_err(|error| {
        DeploymentError::Parse { path: path.to_path_buf(), message: error.to_string() }
    })?;
    // An empty YAML file parses to null; treat it as an empty mapping.
    Ok(match document {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

fn read_json_document(path: &Path) -> Result<Value, DeploymentError> {
    let raw = read_file(path)?;
    serde_json::from_str::<Value>(&raw).map_err(|error| DeploymentError::Parse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

fn typed<T>(path: &Path, document: &Value) -> Result<T, DeploymentError>
where
    T: for<'de> Deserialize<'de>,
{
    T::deserialize(document).map_err(|error| DeploymentError::Parse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

fn default_min_token_match() -> usize {
    1
}

fn default_fallback_intent() -> String {
    DEFAULT_FALLBACK_INTENT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_escalation_severities() -> Vec<Severity> {
    vec![Severity::Medium, Severity::High]
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::{Deployment, DeploymentError};
    use crate::intent::Severity;
    use crate::knowledge::SearchMode;

    const PERSONA: &str = r#"
tone: friendly
verbosity: concise
style: step-by-step
greeting: "Hi there"
search:
  mode: hybrid
  text_processing:
    stopwords: [how, do, i, my]
    min_token_match: 2
escalation_phrases:
  user_request_indicators:
    - talk to a human
"#;

    const INTENTS: &str = r#"
intents:
  - name: billing
    primary_triggers: [invoice]
    secondary_triggers: [refund]
    severity: medium
  - name: account
    primary_triggers: [password]
intent_resolution:
  fallback_intent: general
  security_triggers:
    force_general: [ignore previous instructions]
"#;

    const KNOWLEDGE: &str = r#"[
  {"id": "1", "title": "Reset", "content": "password reset steps", "category": "account"}
]"#;

    fn write_bundle(dir: &Path, actions: &str) {
        fs::write(dir.join("persona.yaml"), PERSONA).expect("write persona");
        fs::write(dir.join("intents.yaml"), INTENTS).expect("write intents");
        fs::write(dir.join("actions.yaml"), actions).expect("write actions");
        fs::write(dir.join("knowledge.json"), KNOWLEDGE).expect("write knowledge");
    }

    #[test]
    fn loads_typed_and_raw_views() {
        let dir = TempDir::new().expect("tempdir");
        write_bundle(dir.path(), "");

        let deployment = Deployment::load(dir.path(), dir.path()).expect("bundle should load");

        assert_eq!(deployment.persona.tone, "friendly");
        assert_eq!(deployment.persona.search.mode, SearchMode::Hybrid);
        assert_eq!(deployment.persona.search.text_processing.min_token_match, 2);
        assert_eq!(
            deployment.persona.escalation_phrases.user_request_indicators,
            vec!["talk to a human".to_string()]
        );
        assert_eq!(deployment.intents.intents.len(), 2);
        assert_eq!(deployment.intents.intents[0].severity, Severity::Medium);
        assert_eq!(deployment.intents.intents[1].severity, Severity::Low);
        assert_eq!(deployment.knowledge[0].category, "account");
        assert_eq!(deployment.raw.persona["greeting"], "Hi there");
    }

    #[test]
    fn empty_actions_file_uses_defaults() {
        let dir = TempDir::new().expect("tempdir");
        write_bundle(dir.path(), "");

        let deployment = Deployment::load(dir.path(), dir.path()).expect("bundle should load");

        assert!(deployment.actions.is_enabled("create_ticket"));
        assert_eq!(
            deployment.actions.policy.escalation_severities,
            vec![Severity::Medium, Severity::High]
        );
    }

    #[test]
    fn listed_actions_gate_enablement() {
        let dir = TempDir::new().expect("tempdir");
        write_bundle(
            dir.path(),
            r#"
actions:
  - name: create_ticket
    enabled: false
  - name: send_notification
"#,
        );

        let deployment = Deployment::load(dir.path(), dir.path()).expect("bundle should load");

        assert!(!deployment.actions.is_enabled("create_ticket"));
        assert!(deployment.actions.is_enabled("send_notification"));
        assert!(!deployment.actions.is_enabled("update_record"));
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let dir = TempDir::new().expect("tempdir");
        write_bundle(dir.path(), "");
        fs::remove_file(dir.path().join("knowledge.json")).expect("remove knowledge");

        let error = Deployment::load(dir.path(), dir.path()).expect_err("load should fail");

        assert!(
            matches!(error, DeploymentError::Missing(ref path) if path.ends_with("knowledge.json"))
        );
    }

    #[test]
    fn persona_without_tone_is_a_parse_error() {
        let dir = TempDir::new().expect("tempdir");
        write_bundle(dir.path(), "");
        fs::write(dir.path().join("persona.yaml"), "verbosity: short\nstyle: plain\n")
            .expect("overwrite persona");

        let error = Deployment::load(dir.path(), dir.path()).expect_err("load should fail");

        assert!(matches!(error, DeploymentError::Parse { ref message, .. } if message.contains("tone")));
    }
}
