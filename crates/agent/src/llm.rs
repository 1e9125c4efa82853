use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use knowbot_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::conversation::{ConversationTurn, Role};

/// Everything the text-generation collaborator sees for one reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub context: String,
    pub turns: Vec<ConversationTurn>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;
}

/// HTTP client for the hosted and local chat-completion APIs.
#[derive(Clone)]
pub struct HttpLlmClient {
    provider: LlmProvider,
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for HttpLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLlmClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build http client")?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            provider: config.provider,
            client,
            api_key: config.api_key.clone(),
            base_url,
            model: config.model.clone(),
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| anyhow!("{:?} provider requires an api key", self.provider))
    }

    async fn post(&self, url: &str, headers: &[(&str, &str)], body: &Value) -> Result<Value> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{:?} API error {}: {}", self.provider, status, body));
        }

        Ok(response.json::<Value>().await?)
    }

    async fn complete_openai(&self, request: &GenerationRequest) -> Result<String> {
        let mut messages = vec![
            json!({"role": "system", "content": request.system}),
            json!({"role": "system", "content": request.context}),
        ];
        messages.extend(request.turns.iter().map(|turn| {
            json!({"role": chat_role(turn.role), "content": turn.text})
        }));

        let authorization = format!("Bearer {}", self.api_key()?);
        let body = json!({"model": self.model, "messages": messages, "temperature": 0.2});
        let response = self
            .post(
                &format!("{}/v1/chat/completions", self.base_url),
                &[("Authorization", authorization.as_str())],
                &body,
            )
            .await?;

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let parsed: ApiResponse = serde_json::from_value(response)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("OpenAI returned no choices"))
    }

    async fn complete_anthropic(&self, request: &GenerationRequest) -> Result<String> {
        // The messages API requires the conversation to open with a user turn.
        let messages = request
            .turns
            .iter()
            .skip_while(|turn| turn.role == Role::Model)
            .map(|turn| json!({"role": chat_role(turn.role), "content": turn.text}))
            .collect::<Vec<_>>();

        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "system": format!("{}\n\n{}", request.system, request.context),
            "messages": messages,
        });
        let response = self
            .post(
                &format!("{}/v1/messages", self.base_url),
                &[("x-api-key", self.api_key()?), ("anthropic-version", "2023-06-01")],
                &body,
            )
            .await?;

        #[derive(Deserialize)]
        struct Block {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            text: String,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<Block>,
        }

        let parsed: ApiResponse = serde_json::from_value(response)?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(anyhow!("Anthropic returned no text content"));
        }
        Ok(text)
    }

    async fn complete_ollama(&self, request: &GenerationRequest) -> Result<String> {
        let mut messages = vec![json!({
            "role": "system",
            "content": format!("{}\n\n{}", request.system, request.context),
        })];
        messages.extend(request.turns.iter().map(|turn| {
            json!({"role": chat_role(turn.role), "content": turn.text})
        }));

        let body = json!({"model": self.model, "messages": messages, "stream": false});
        let response = self.post(&format!("{}/api/chat", self.base_url), &[], &body).await?;

        response["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Ollama response is missing message.content"))
    }

    async fn complete_gemini(&self, request: &GenerationRequest) -> Result<String> {
        let contents = request
            .turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Model => "model",
                };
                json!({"role": role, "parts": [{"text": turn.text}]})
            })
            .collect::<Vec<_>>();

        let body = json!({
            "systemInstruction": {
                "parts": [{"text": request.system}, {"text": request.context}]
            },
            "contents": contents,
        });
        let response = self
            .post(
                &format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model),
                &[("x-goog-api-key", self.api_key()?)],
                &body,
            )
            .await?;

        response["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts.iter().filter_map(|part| part["text"].as_str()).collect::<Vec<_>>().join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("Gemini returned no candidates"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let text = match self.provider {
            LlmProvider::OpenAi => self.complete_openai(request).await?,
            LlmProvider::Anthropic => self.complete_anthropic(request).await?,
            LlmProvider::Ollama => self.complete_ollama(request).await?,
            LlmProvider::Gemini => self.complete_gemini(request).await?,
        };
        Ok(text.trim().to_string())
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
        LlmProvider::Gemini => "https://generativelanguage.googleapis.com",
    }
}

fn chat_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "assistant",
    }
}
