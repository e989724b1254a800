//! # Backend Adapter Layer
//!
//! Uniform contract every LLM integration satisfies. The engine is
//! written once against [`Backend`] and never branches on vendor
//! identity; one concrete adapter exists per vendor family:
//!
//! | Adapter | Use case |
//! |---------|----------|
//! | `openai` | Chat-completion APIs (GPT family) |
//! | `inference` | Generic HTTP inference servers (BERT/RoBERTa-style hosted models, local servers) |
//! | `mock` | Tests, with scriptable outcomes |
//!
//! A [`FailureSignal`] classifies every failed invocation; that
//! classification is the contract the error/fallback policy consumes.

mod inference;
mod mock;
mod openai;

pub use inference::InferenceBackend;
pub use mock::{MockBackend, MockOutcome};
pub use openai::OpenAiBackend;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::descriptor::{Descriptor, LlmBinding};

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Set of declared semantic skill tags (e.g. `text-generation`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn is_superset_of(&self, other: &CapabilitySet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// FAILURE SIGNAL
// ============================================================================

/// Classification of a failed backend invocation.
///
/// The classification maps one-to-one onto the well-known error codes a
/// descriptor's error table is written against.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureSignal {
    #[error("backend call timed out")]
    Timeout,

    #[error("backend error: {0}")]
    BackendError(String),

    #[error("backend rate limited")]
    RateLimited,

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

impl FailureSignal {
    /// Wire-level error code used in descriptor error tables
    pub fn code(&self) -> &'static str {
        match self {
            FailureSignal::Timeout => "LLM_TIMEOUT",
            FailureSignal::BackendError(_) => "LLM_ERROR",
            FailureSignal::RateLimited => "LLM_RATE_LIMITED",
            FailureSignal::InvalidResponse(_) => "LLM_INVALID_RESPONSE",
        }
    }
}

// ============================================================================
// REQUEST/RESPONSE TYPES
// ============================================================================

/// One backend invocation: the agent's resolved parameters plus the
/// resolved input values. The credential is resolved immediately before
/// the call and dropped with the request.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub step_id: String,
    pub agent_id: String,
    pub model: String,
    /// Declared input key -> value from the execution context
    pub inputs: Map<String, Value>,
    /// Agent parameter bag; recognized keys (`temperature`,
    /// `max_tokens`) are interpreted, unknown keys pass through
    pub parameters: Map<String, Value>,
    pub credential: Option<String>,
}

impl BackendRequest {
    pub fn new(
        step_id: impl Into<String>,
        agent_id: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            agent_id: agent_id.into(),
            model: model.into(),
            inputs: Map::new(),
            parameters: Map::new(),
            credential: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Render the inputs as one prompt string for chat-style backends
    pub fn prompt_text(&self) -> String {
        self.inputs
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}: {s}"),
                other => format!("{key}: {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Raw backend output plus latency metadata
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub output: Value,
    pub latency: Duration,
}

impl BackendResponse {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Contract every LLM integration must implement
#[async_trait]
pub trait Backend: Send + Sync {
    /// Adapter name (e.g. "openai", "inference", "mock")
    fn name(&self) -> &str;

    /// Capability tags this backend declares
    fn capabilities(&self) -> CapabilitySet;

    /// Execute one invocation under the given timeout.
    ///
    /// Adapters honor the timeout themselves (the engine also guards
    /// the call) and classify every failure as a [`FailureSignal`].
    async fn invoke(
        &self,
        request: BackendRequest,
        timeout: Duration,
    ) -> Result<BackendResponse, FailureSignal>;
}

// ============================================================================
// REGISTRY + FACTORY
// ============================================================================

/// Maps LLM binding ids to adapter instances for one engine
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, llm_id: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(llm_id.into(), backend);
        self
    }

    pub fn get(&self, llm_id: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(llm_id).cloned()
    }

    /// Build one adapter per LLM binding in the descriptor
    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self> {
        let mut registry = Self::new();
        for binding in descriptor.llms() {
            let backend = create_backend(binding)?;
            registry = registry.register(binding.llm_id.clone(), backend);
        }
        Ok(registry)
    }

    /// Replace every binding with a shared mock (CLI dry runs, tests)
    pub fn all_mock(descriptor: &Descriptor) -> Self {
        let mut registry = Self::new();
        for binding in descriptor.llms() {
            let mock = MockBackend::new()
                .with_capabilities(binding.capabilities.iter().cloned().collect());
            registry = registry.register(binding.llm_id.clone(), Arc::new(mock));
        }
        registry
    }
}

/// Create an adapter for one LLM binding.
///
/// The explicit `provider` tag wins; otherwise the tag is inferred from
/// the model name (GPT family -> `openai`, `mock` -> `mock`, everything
/// else -> the generic `inference` adapter).
pub fn create_backend(binding: &LlmBinding) -> Result<Arc<dyn Backend>> {
    let tag = binding
        .provider
        .clone()
        .unwrap_or_else(|| infer_provider(&binding.model));

    match tag.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAiBackend::from_binding(binding)?)),
        "inference" => Ok(Arc::new(InferenceBackend::from_binding(binding)?)),
        "mock" => Ok(Arc::new(
            MockBackend::new().with_capabilities(binding.capabilities.iter().cloned().collect()),
        )),
        other => anyhow::bail!(
            "Unknown provider: '{}'. Available: openai, inference, mock",
            other
        ),
    }
}

fn infer_provider(model: &str) -> String {
    let lower = model.to_lowercase();
    if lower.starts_with("gpt") || lower.starts_with("o1") || lower.starts_with("o3") {
        "openai".to_string()
    } else if lower == "mock" {
        "mock".to_string()
    } else {
        "inference".to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binding(model: &str, provider: Option<&str>) -> LlmBinding {
        LlmBinding {
            llm_id: "llm-1".into(),
            model: model.into(),
            version: None,
            endpoint: Some("https://example.com/v1".into()),
            credential_ref: None,
            provider: provider.map(String::from),
            input_format: None,
            output_format: None,
            capabilities: vec!["text-generation".into()],
        }
    }

    #[test]
    fn capability_superset() {
        let llm: CapabilitySet = ["text-generation", "summarization"].into_iter().collect();
        let agent: CapabilitySet = ["text-generation"].into_iter().collect();

        assert!(llm.is_superset_of(&agent));
        assert!(!agent.is_superset_of(&llm));
    }

    #[test]
    fn failure_signal_codes() {
        assert_eq!(FailureSignal::Timeout.code(), "LLM_TIMEOUT");
        assert_eq!(FailureSignal::BackendError("x".into()).code(), "LLM_ERROR");
        assert_eq!(FailureSignal::RateLimited.code(), "LLM_RATE_LIMITED");
        assert_eq!(
            FailureSignal::InvalidResponse("x".into()).code(),
            "LLM_INVALID_RESPONSE"
        );
    }

    #[test]
    fn request_prompt_text_flattens_inputs() {
        let mut inputs = Map::new();
        inputs.insert("question".to_string(), json!("What is Rust?"));

        let request = BackendRequest::new("s1", "a1", "gpt-4").with_inputs(inputs);
        assert_eq!(request.prompt_text(), "question: What is Rust?");
    }

    #[test]
    fn provider_inference_from_model_name() {
        assert_eq!(infer_provider("gpt-4"), "openai");
        assert_eq!(infer_provider("GPT-4o"), "openai");
        assert_eq!(infer_provider("mock"), "mock");
        assert_eq!(infer_provider("roberta-base"), "inference");
        assert_eq!(infer_provider("bert-large"), "inference");
    }

    #[test]
    fn create_backend_honors_explicit_tag() {
        let backend = create_backend(&binding("weird-model", Some("openai"))).unwrap();
        assert_eq!(backend.name(), "openai");

        let backend = create_backend(&binding("gpt-4", Some("mock"))).unwrap();
        assert_eq!(backend.name(), "mock");

        assert!(create_backend(&binding("gpt-4", Some("nope"))).is_err());
    }

    #[test]
    fn registry_lookup() {
        let registry =
            BackendRegistry::new().register("llm-a", Arc::new(MockBackend::new()) as Arc<dyn Backend>);

        assert!(registry.get("llm-a").is_some());
        assert!(registry.get("llm-b").is_none());
    }
}
