//! Generic HTTP inference-server backend
//!
//! Covers hosted encoder models (BERT/RoBERTa-style endpoints) and
//! local inference servers: POST the inputs as JSON, pass the JSON
//! response through untouched. The credential is optional - local
//! servers typically run without one.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{Backend, BackendRequest, BackendResponse, CapabilitySet, FailureSignal};
use crate::descriptor::LlmBinding;

pub struct InferenceBackend {
    client: reqwest::Client,
    endpoint: String,
    capabilities: CapabilitySet,
}

impl InferenceBackend {
    pub fn from_binding(binding: &LlmBinding) -> Result<Self> {
        let endpoint = binding
            .endpoint
            .clone()
            .with_context(|| format!("LLM binding '{}' has no endpoint", binding.llm_id))?;

        Ok(Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?,
            endpoint,
            capabilities: binding.capabilities.iter().cloned().collect(),
        })
    }
}

#[async_trait]
impl Backend for InferenceBackend {
    fn name(&self) -> &str {
        "inference"
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    async fn invoke(
        &self,
        request: BackendRequest,
        timeout: Duration,
    ) -> Result<BackendResponse, FailureSignal> {
        let payload = InferencePayload {
            model: request.model.clone(),
            inputs: request.inputs.clone(),
            parameters: request.parameters.clone(),
        };

        tracing::debug!(
            backend = "inference",
            step = %request.step_id,
            model = %payload.model,
            endpoint = %self.endpoint,
            "sending inference request"
        );

        let mut builder = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&payload);
        if let Some(credential) = request.credential.as_deref() {
            builder = builder.bearer_auth(credential);
        }

        let started = Instant::now();
        let response = match tokio::time::timeout(timeout, builder.send()).await {
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

        let output: Value = response
            .json()
            .await
            .map_err(|e| FailureSignal::InvalidResponse(e.to_string()))?;

        Ok(BackendResponse::new(output).with_latency(started.elapsed()))
    }
}

#[derive(Debug, Serialize)]
struct InferencePayload {
    model: String,
    inputs: Map<String, Value>,
    parameters: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(endpoint: Option<&str>) -> LlmBinding {
        LlmBinding {
            llm_id: "llm-roberta".into(),
            model: "roberta-base".into(),
            version: None,
            endpoint: endpoint.map(String::from),
            credential_ref: None,
            provider: Some("inference".into()),
            input_format: None,
            output_format: None,
            capabilities: vec!["question-answering".into()],
        }
    }

    #[test]
    fn requires_an_endpoint() {
        assert!(InferenceBackend::from_binding(&binding(None)).is_err());

        let backend = InferenceBackend::from_binding(&binding(Some("http://host/infer"))).unwrap();
        assert_eq!(backend.name(), "inference");
        assert!(backend.capabilities().contains("question-answering"));
    }
}
