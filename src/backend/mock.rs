//! Mock backend for testing
//!
//! Returns scriptable outcomes without network calls. Essential for
//! engine tests and CI: failures are injected per invocation, and every
//! request is recorded for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Backend, BackendRequest, BackendResponse, CapabilitySet, FailureSignal};

/// One scripted invocation result
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Output(Value),
    Fail(FailureSignal),
}

/// Backend that replays a script of outcomes (FIFO), then a default
pub struct MockBackend {
    capabilities: CapabilitySet,
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    /// Returned when the script is exhausted
    default: MockOutcome,
    /// Simulated invocation latency, applied before every outcome
    delay: Duration,
    requests: Arc<Mutex<Vec<BackendRequest>>>,
}

impl MockBackend {
    /// Echo backend: the default outcome reflects the request inputs,
    /// so identical requests produce identical outputs.
    pub fn new() -> Self {
        Self {
            capabilities: ["text-generation"].into_iter().collect(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            default: MockOutcome::Output(Value::Null),
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Backend that fails every invocation with the given signal
    pub fn failing(signal: FailureSignal) -> Self {
        Self {
            default: MockOutcome::Fail(signal),
            ..Self::new()
        }
    }

    /// Backend that always answers with a fixed output
    pub fn answering(output: Value) -> Self {
        Self {
            default: MockOutcome::Output(output),
            ..Self::new()
        }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Hold every invocation for `delay` before producing its outcome,
    /// simulating a slow backend (timeout/cancellation tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_script(self, outcomes: Vec<MockOutcome>) -> Self {
        *self.script.lock().unwrap() = outcomes.into();
        self
    }

    /// Append an outcome to the script
    pub fn queue(&self, outcome: MockOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// All requests made so far
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<BackendRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Number of invocations made
    pub fn invocations(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    async fn invoke(
        &self,
        request: BackendRequest,
        _timeout: Duration,
    ) -> Result<BackendResponse, FailureSignal> {
        let outcome = {
            let mut script = self.script.lock().unwrap();
            script.pop_front().unwrap_or_else(|| self.default.clone())
        };

        // Echo behavior when no explicit output was scripted
        let outcome = match outcome {
            MockOutcome::Output(Value::Null) => MockOutcome::Output(json!({
                "echo": request.inputs,
                "model": request.model,
            })),
            other => other,
        };

        self.requests.lock().unwrap().push(request);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match outcome {
            MockOutcome::Output(value) => {
                Ok(BackendResponse::new(value).with_latency(Duration::from_millis(1)))
            }
            MockOutcome::Fail(signal) => Err(signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn request() -> BackendRequest {
        let mut inputs = Map::new();
        inputs.insert("question".to_string(), json!("hi"));
        BackendRequest::new("s1", "a1", "mock").with_inputs(inputs)
    }

    #[tokio::test]
    async fn echoes_by_default() {
        let backend = MockBackend::new();
        let response = backend
            .invoke(request(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(response.output["echo"]["question"], json!("hi"));
        assert_eq!(backend.invocations(), 1);
    }

    #[tokio::test]
    async fn script_runs_before_default() {
        let backend = MockBackend::answering(json!("default")).with_script(vec![
            MockOutcome::Fail(FailureSignal::RateLimited),
            MockOutcome::Output(json!("second")),
        ]);

        let first = backend.invoke(request(), Duration::from_secs(1)).await;
        assert_eq!(first.unwrap_err(), FailureSignal::RateLimited);

        let second = backend
            .invoke(request(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(second.output, json!("second"));

        let third = backend
            .invoke(request(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(third.output, json!("default"));
    }

    #[tokio::test]
    async fn failing_backend_always_fails() {
        let backend = MockBackend::failing(FailureSignal::Timeout);

        for _ in 0..3 {
            let err = backend
                .invoke(request(), Duration::from_secs(1))
                .await
                .unwrap_err();
            assert_eq!(err, FailureSignal::Timeout);
        }
        assert_eq!(backend.invocations(), 3);
    }

    #[tokio::test]
    async fn delay_holds_the_invocation() {
        let backend = MockBackend::new().with_delay(Duration::from_millis(50));

        let started = std::time::Instant::now();
        backend
            .invoke(request(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn records_requests() {
        let backend = MockBackend::new();
        backend
            .invoke(request(), Duration::from_secs(1))
            .await
            .unwrap();

        let last = backend.last_request().unwrap();
        assert_eq!(last.step_id, "s1");
        assert_eq!(last.agent_id, "a1");
    }
}
