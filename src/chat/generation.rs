//! Streaming text generation over OpenAI-compatible chat completion APIs.
//!
//! [`OpenAiCompatibleBackend`] talks to one endpoint (Groq, OpenRouter, a
//! local server...). [`FallbackGenerator`] tries a list of backends in order
//! and settles on the first one that produces output.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendConfig, GenerationConfig};
use crate::error::{ChatError, Result};

/// Incremental text deltas from a generation backend.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One message of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Everything a backend needs to start one streamed completion.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A source of streamed text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable backend name for logs and errors.
    fn name(&self) -> &str;

    /// Start a completion and return its text deltas in arrival order.
    async fn stream(&self, request: &GenerationRequest) -> Result<DeltaStream>;
}

// ============ OpenAI-compatible backend ============

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// A `POST {base_url}/chat/completions` endpoint streaming SSE deltas.
pub struct OpenAiCompatibleBackend {
    name: String,
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    /// Build a backend, reading its API key from the configured env var.
    pub fn from_config(config: &BackendConfig, client: reqwest::Client) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ChatError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::new(config, api_key, client))
    }

    pub fn new(config: &BackendConfig, api_key: String, client: reqwest::Client) -> Self {
        Self {
            name: config.name.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            client,
        }
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<DeltaStream> {
        let system = ChatMessage::new("system", request.system_prompt.clone());
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(&system);
        messages.extend(request.messages.iter());

        let body = CompletionBody {
            model: &self.model,
            messages,
            stream: true,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(backend = %self.name, model = %self.model, "starting completion stream");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::http(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                service: self.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let backend = self.name.clone();
        let mut events = Box::pin(response.bytes_stream().eventsource());
        let deltas = async_stream::stream! {
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(ChatError::Upstream {
                            backend: backend.clone(),
                            message: e.to_string(),
                        });
                        break;
                    }
                };
                let data = event.data.trim();
                if data == "[DONE]" {
                    break;
                }
                if data.is_empty() {
                    continue;
                }
                match parse_delta(&backend, data) {
                    Ok(Some(delta)) => yield Ok(delta),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(deltas))
    }
}

/// Extract the text delta from one SSE `data:` payload.
///
/// Role-only and finish chunks carry no content and yield `None`.
pub fn parse_delta(backend: &str, data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| ChatError::invalid(backend, format!("bad stream chunk: {e}")))?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ChatError::Upstream {
            backend: backend.to_string(),
            message,
        });
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty()))
}

// ============ Fallback chain ============

/// Tries each backend in order until one starts producing text.
///
/// A backend counts as failed if the request errors or its stream errors
/// before the first delta. Once a delta has been produced the stream is
/// committed and later errors are passed through to the caller.
pub struct FallbackGenerator {
    backends: Vec<Arc<dyn Generator>>,
}

impl FallbackGenerator {
    pub fn new(backends: Vec<Arc<dyn Generator>>) -> Self {
        Self { backends }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[async_trait]
impl Generator for FallbackGenerator {
    fn name(&self) -> &str {
        "fallback-chain"
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<DeltaStream> {
        let mut failures = Vec::new();

        for backend in &self.backends {
            let failure = match backend.stream(request).await {
                Ok(mut deltas) => match deltas.next().await {
                    Some(Ok(first)) => {
                        tracing::debug!(backend = %backend.name(), "generation stream started");
                        let head = stream::iter(std::iter::once(Ok(first)));
                        return Ok(Box::pin(head.chain(deltas)));
                    }
                    None => return Ok(Box::pin(stream::empty::<Result<String>>())),
                    Some(Err(e)) => e,
                },
                Err(e) => e,
            };

            tracing::warn!(
                backend = %backend.name(),
                error = %failure,
                "generation backend failed, trying next"
            );
            failures.push(format!("{}: {failure}", backend.name()));
        }

        Err(ChatError::BackendsExhausted(failures.join("; ")))
    }
}

/// Build the generation chain from config: primary first, then fallback.
///
/// Backends whose API key is missing are skipped with a warning.
pub fn build_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn Generator>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let mut backends: Vec<Arc<dyn Generator>> = Vec::new();
    for backend in std::iter::once(&config.primary).chain(config.fallback.iter()) {
        match OpenAiCompatibleBackend::from_config(backend, client.clone()) {
            Ok(b) => {
                tracing::info!(backend = %backend.name, model = %backend.model, "generation backend ready");
                backends.push(Arc::new(b));
            }
            Err(e) => tracing::warn!(backend = %backend.name, error = %e, "skipping generation backend"),
        }
    }

    anyhow::ensure!(
        !backends.is_empty(),
        "no generation backend available; set {} or configure a fallback",
        config.primary.api_key_env
    );

    Ok(Arc::new(FallbackGenerator::new(backends)))
}
