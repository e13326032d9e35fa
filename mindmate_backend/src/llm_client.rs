use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::BackendConfig;
use crate::http_client::build_http_client;
use crate::structured::{parse_object, OutputSchema};

const RETRY_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The model seam used by the workflow stages.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-form completion.
    async fn generate(&self, messages: Vec<Message>) -> Result<String>;

    /// Completion constrained to `schema`. `Ok(None)` means the model answered
    /// but no JSON object could be recovered from it.
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
    ) -> Result<Option<Value>>;
}

#[derive(Clone)]
pub struct LlmClient {
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Why a single attempt failed, and whether another attempt could help.
enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

impl LlmClient {
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            api_url: config.llm_api_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone().unwrap_or_default(),
            model: config.llm_model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: build_http_client(config.request_timeout())?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message], response_format: Option<Value>) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            response_format,
        };

        let mut attempt = 0;
        loop {
            match self.send_once(&request).await {
                Ok(content) => return Ok(content),
                Err(AttemptError::Retryable(error)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "LLM request failed (attempt {}/{}): {:#}",
                        attempt,
                        self.max_retries + 1,
                        error
                    );
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(AttemptError::Retryable(error)) | Err(AttemptError::Fatal(error)) => {
                    return Err(error)
                }
            }
        }
    }

    async fn send_once(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> std::result::Result<String, AttemptError> {
        let url = format!("{}/chat/completions", self.api_url);
        let mut req = self.client.post(&url).json(request);

        // Local OpenAI-compatible servers run without a key
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = req
            .send()
            .await
            .context("Failed to send LLM request")
            .map_err(AttemptError::Retryable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            let error = anyhow::anyhow!("LLM API returned error {}: {}", status, body);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AttemptError::Retryable(error)
            } else {
                AttemptError::Fatal(error)
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")
            .map_err(AttemptError::Fatal)?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| AttemptError::Fatal(anyhow::anyhow!("No response from LLM")))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate(&self, messages: Vec<Message>) -> Result<String> {
        self.complete(&messages, None).await
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
    ) -> Result<Option<Value>> {
        let messages = [Message::system(schema.instruction()), Message::user(prompt)];
        let raw = self
            .complete(&messages, Some(json!({ "type": "json_object" })))
            .await?;

        match parse_object(&raw) {
            Some(object) => Ok(Some(Value::Object(object))),
            None => {
                tracing::warn!(
                    "No usable '{}' object in model answer: {}",
                    schema.name,
                    raw.chars().take(200).collect::<String>()
                );
                Ok(None)
            }
        }
    }
}
