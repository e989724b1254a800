//! OpenAI-style chat-completion backend
//!
//! Covers the GPT family and any endpoint speaking the Chat Completions
//! wire format. The credential arrives already resolved inside the
//! request and is used for exactly one call.

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Backend, BackendRequest, BackendResponse, CapabilitySet, FailureSignal};
use crate::descriptor::LlmBinding;

/// Default API endpoint when the binding declares none
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    capabilities: CapabilitySet,
}

impl OpenAiBackend {
    pub fn from_binding(binding: &LlmBinding) -> Result<Self> {
        let endpoint = binding
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?,
            endpoint,
            capabilities: binding.capabilities.iter().cloned().collect(),
        })
    }

    fn build_payload(request: &BackendRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt_text(),
            }],
            max_tokens: request
                .parameters
                .get("max_tokens")
                .and_then(Value::as_u64)
                .map(|v| v as u32),
            temperature: request
                .parameters
                .get("temperature")
                .and_then(Value::as_f64)
                .map(|v| v as f32),
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    async fn invoke(
        &self,
        request: BackendRequest,
        timeout: Duration,
    ) -> Result<BackendResponse, FailureSignal> {
        let credential = request
            .credential
            .as_deref()
            .ok_or_else(|| FailureSignal::BackendError("no credential resolved".to_string()))?;

        let payload = Self::build_payload(&request);

        tracing::debug!(
            backend = "openai",
            step = %request.step_id,
            model = %payload.model,
            "sending chat completion request"
        );

        let started = Instant::now();
        let send = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential)
            .timeout(timeout)
            .json(&payload)
            .send();

        let response = match tokio::time::timeout(timeout, send).await {
            Err(_) => return Err(FailureSignal::Timeout),
            Ok(Err(e)) if e.is_timeout() => return Err(FailureSignal::Timeout),
            Ok(Err(e)) => return Err(FailureSignal::BackendError(e.to_string())),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FailureSignal::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FailureSignal::BackendError(format!(
                "HTTP {status}: {body}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| FailureSignal::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| FailureSignal::InvalidResponse("response has no choices".to_string()))?;

        Ok(BackendResponse::new(Value::String(content)).with_latency(started.elapsed()))
    }
}

// ============================================================================
// API TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

// ============================================================================
// TESTS
// ============================================================================
