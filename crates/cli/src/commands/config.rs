use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use knowbot_core::config::AppConfig;
use toml::Value;

use crate::bootstrap;

pub fn run() -> String {
    let config = match bootstrap::load_config() {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys }
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let base_url =
        config.llm.base_url.clone().unwrap_or_else(|| "<provider default>".to_string());

    vec![
        field(
            "deployment.config_dir",
            config.deployment.config_dir.display().to_string(),
            &["KNOWBOT_CONFIG_DIR"],
        ),
        field(
            "deployment.data_dir",
            config.deployment.data_dir.display().to_string(),
            &["KNOWBOT_DATA_DIR"],
        ),
        field(
            "session.max_history_turns",
            config.session.max_history_turns.to_string(),
            &["KNOWBOT_SESSION_MAX_HISTORY_TURNS"],
        ),
        field(
            "session.exit_keywords",
            config.session.exit_keywords.join(","),
            &["KNOWBOT_SESSION_EXIT_KEYWORDS"],
        ),
        field(
            "llm.provider",
            config.llm.provider.as_str().to_string(),
            &["KNOWBOT_LLM_PROVIDER"],
        ),
        field("llm.model", config.llm.model.clone(), &["KNOWBOT_LLM_MODEL"]),
        field("llm.base_url", base_url, &["KNOWBOT_LLM_BASE_URL"]),
        field("llm.api_key", api_key.to_string(), &["KNOWBOT_LLM_API_KEY"]),
        field(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["KNOWBOT_LLM_TIMEOUT_SECS"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["KNOWBOT_LOGGING_LEVEL", "KNOWBOT_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            config.logging.format.as_str().to_string(),
            &["KNOWBOT_LOGGING_FORMAT", "KNOWBOT_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("knowbot.toml"), PathBuf::from("config/knowbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source};

    #[test]
    fn nested_keys_resolve_against_the_file_document() {
        let doc = "[llm]\nmodel = \"gpt-4o-mini\"\n".parse::<toml::Value>().expect("valid toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.base_url"));
        assert_eq!(
            field_source("llm.model", &["KNOWBOT_TEST_UNSET_VAR"], Some(&doc), None),
            "file (config file)"
        );
        assert_eq!(field_source("llm.base_url", &[], Some(&doc), None), "default");
    }
}
