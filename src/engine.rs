//! Execution engine / scheduler
//!
//! Drives one workflow run to completion or terminal failure. The
//! engine keeps a ready set of steps whose condition is eligible and
//! whose declared inputs are present, dispatches them concurrently
//! (tie-break: ascending declared step order), commits outputs into the
//! execution context as invocations finish, and re-evaluates the ready
//! set after every commit. Failures are handled per step by the
//! error/fallback policy and only escalate to a workflow abort when no
//! retry or fallback path resolves them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::backend::{Backend, BackendRegistry, BackendRequest, BackendResponse, FailureSignal};
use crate::condition::{evaluate_step, Eligibility};
use crate::context::ExecutionContext;
use crate::descriptor::{Agent, Descriptor, ErrorPolicy, LlmBinding, Step};
use crate::error::WeftError;
use crate::limits::RunLimits;
use crate::policy::{dispose, Disposition};
use crate::report::{RunReport, RunStatus, StepError, StepResult, StepStatus, WorkflowAbort};
use crate::secrets::{EnvSecretStore, SecretStore};

// ============================================================================
// CANCELLATION
// ============================================================================

/// Create a linked cancel handle/token pair
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

/// Caller-side switch that cancels a running workflow
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Engine-side observer of the cancel switch
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever when the
    /// handle was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// One engine instance runs one descriptor; independent runs own
/// independent contexts, so engines for different descriptors can run
/// concurrently in the same process.
pub struct Engine {
    descriptor: Arc<Descriptor>,
    registry: Arc<BackendRegistry>,
    secrets: Arc<dyn SecretStore>,
    limits: RunLimits,
}

/// Scheduling state per step
enum StepState {
    Pending,
    InFlight,
    Done(StepResult),
}

impl StepState {
    fn terminal(&self) -> Option<&StepResult> {
        match self {
            StepState::Done(result) => Some(result),
            _ => None,
        }
    }
}

/// Everything a spawned dispatch needs about one invocation target
#[derive(Clone)]
struct Target {
    agent: Arc<Agent>,
    llm: Arc<LlmBinding>,
    backend: Arc<dyn Backend>,
}

/// Per-step dispatch plan resolved before the run starts
#[derive(Clone)]
struct DispatchPlan {
    step: Arc<Step>,
    primary: Target,
    fallback: Option<Target>,
}

/// What a finished dispatch task reports back to the scheduler
struct Dispatch {
    index: usize,
    result: StepResult,
    /// Output-key commits for the execution context
    outputs: Vec<(String, Value)>,
}

impl Engine {
    pub fn new(descriptor: Descriptor, registry: BackendRegistry) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            registry: Arc::new(registry),
            secrets: Arc::new(EnvSecretStore::new()),
            limits: RunLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Run with an empty initial context
    pub async fn run(&self) -> Result<RunReport, WeftError> {
        self.run_with_inputs(HashMap::new()).await
    }

    /// Run with workflow inputs seeding the execution context
    pub async fn run_with_inputs(
        &self,
        inputs: HashMap<String, Value>,
    ) -> Result<RunReport, WeftError> {
        let (_handle, token) = cancel_pair();
        self.run_cancellable(inputs, token).await
    }

    /// Run under an external cancellation token. Cancellation aborts
    /// in-flight invocations promptly; already-committed step results
    /// stay in the report.
    pub async fn run_cancellable(
        &self,
        inputs: HashMap<String, Value>,
        mut cancel: CancelToken,
    ) -> Result<RunReport, WeftError> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.limits.workflow_deadline;

        let plans = self.resolve_plans()?;
        let steps = self.descriptor.steps();
        let index_of: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.step_id.as_str(), i))
            .collect();

        let mut ctx = ExecutionContext::with_inputs(inputs);
        let mut states: Vec<StepState> = (0..steps.len()).map(|_| StepState::Pending).collect();
        let mut join: JoinSet<Dispatch> = JoinSet::new();
        let mut abort: Option<WorkflowAbort> = None;
        let mut cancelled = false;
        let mut deadline_hit = false;

        tracing::info!(
            workflow = %self.descriptor.workflow_id(),
            steps = steps.len(),
            "workflow run started"
        );

        loop {
            // Schedule: resolve unsatisfiable steps and dispatch the
            // ready set, ascending declared order, until fixpoint
            if abort.is_none() && !cancelled && !deadline_hit {
                let mut progress = true;
                while progress {
                    progress = false;
                    for i in 0..steps.len() {
                        if !matches!(states[i], StepState::Pending) {
                            continue;
                        }
                        let eligibility = {
                            let status_of = |id: &str| -> Option<StepStatus> {
                                index_of
                                    .get(id)
                                    .and_then(|&j| states[j].terminal())
                                    .map(|r| r.status)
                            };
                            let producer_of = |key: &str| -> Option<&str> {
                                self.descriptor
                                    .producer_of(key)
                                    .map(|j| steps[j].step_id.as_str())
                            };
                            evaluate_step(
                                &steps[i],
                                self.descriptor.condition(i),
                                &ctx,
                                status_of,
                                producer_of,
                            )
                        };
                        match eligibility {
                            Eligibility::Eligible => {
                                if join.len() >= self.limits.max_concurrent {
                                    continue;
                                }
                                let dispatch = self.spawn_dispatch(i, &plans[i], &ctx);
                                join.spawn(dispatch);
                                states[i] = StepState::InFlight;
                                progress = true;
                            }
                            Eligibility::PermanentlySkipped => {
                                tracing::debug!(step = %steps[i].step_id, "step permanently skipped");
                                states[i] = StepState::Done(StepResult::skipped(
                                    &steps[i].step_id,
                                    "upstream step failed or was skipped",
                                ));
                                progress = true;
                            }
                            Eligibility::NotYetEligible => {}
                        }
                    }
                }
            }

            // Termination checks
            if join.is_empty() {
                let unfinished: Vec<usize> = (0..steps.len())
                    .filter(|&i| states[i].terminal().is_none())
                    .collect();
                if unfinished.is_empty() {
                    break;
                }
                if abort.is_some() || cancelled || deadline_hit {
                    for i in unfinished {
                        // In-flight steps were actually invoked and then
                        // torn down; the reason must say so
                        let reason = match (&states[i], cancelled, deadline_hit) {
                            (StepState::InFlight, true, _) => "invocation aborted by cancellation",
                            (StepState::InFlight, _, true) => {
                                "invocation aborted at workflow deadline"
                            }
                            (StepState::InFlight, ..) => "invocation aborted",
                            (_, true, _) => "run cancelled before dispatch",
                            _ => "run ended before dispatch",
                        };
                        states[i] =
                            StepState::Done(StepResult::skipped(&steps[i].step_id, reason));
                    }
                    break;
                }
                // Nothing ready, nothing in flight: the remaining
                // steps wait on inputs nothing will ever produce
                let first = unfinished[0];
                return Err(WeftError::Deadlock {
                    step_id: steps[first].step_id.clone(),
                    remaining: unfinished.len(),
                });
            }

            // Wait for a completion, cancellation, or the deadline
            tokio::select! {
                joined = join.join_next() => {
                    match joined {
                        Some(Ok(dispatch)) => {
                            if dispatch.result.is_terminal_success() {
                                ctx.commit(dispatch.outputs);
                            } else if dispatch.result.status == StepStatus::Failed
                                && abort.is_none()
                            {
                                let error = dispatch.result.error.clone().unwrap_or(StepError {
                                    code: "LLM_ERROR".to_string(),
                                    message: "unclassified failure".to_string(),
                                });
                                abort = Some(WorkflowAbort {
                                    step_id: dispatch.result.step_id.clone(),
                                    code: error.code,
                                    message: error.message,
                                    attempts: dispatch.result.attempts,
                                });
                            }
                            tracing::info!(
                                step = %dispatch.result.step_id,
                                status = ?dispatch.result.status,
                                attempts = dispatch.result.attempts,
                                "step finished"
                            );
                            states[dispatch.index] = StepState::Done(dispatch.result);
                        }
                        Some(Err(join_err)) => {
                            if !join_err.is_cancelled() {
                                return Err(WeftError::Internal(join_err.to_string()));
                            }
                        }
                        None => {}
                    }
                }
                _ = cancel.cancelled(), if !cancelled => {
                    tracing::warn!(workflow = %self.descriptor.workflow_id(), "run cancelled");
                    cancelled = true;
                    join.abort_all();
                }
                _ = tokio::time::sleep_until(deadline), if !deadline_hit => {
                    tracing::warn!(
                        workflow = %self.descriptor.workflow_id(),
                        "workflow deadline exceeded"
                    );
                    deadline_hit = true;
                    join.abort_all();
                }
            }
        }

        if deadline_hit && abort.is_none() && !cancelled {
            let first_unrun = states
                .iter()
                .zip(steps)
                .find(|(s, _)| !matches!(s, StepState::Done(r) if r.is_terminal_success()))
                .map(|(_, step)| step.step_id.clone())
                .unwrap_or_default();
            abort = Some(WorkflowAbort {
                step_id: first_unrun,
                code: "WORKFLOW_DEADLINE".to_string(),
                message: format!(
                    "workflow deadline of {:?} exceeded",
                    self.limits.workflow_deadline
                ),
                attempts: 0,
            });
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else if abort.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        let results: Vec<StepResult> = states
            .into_iter()
            .zip(steps)
            .map(|(state, step)| match state {
                StepState::Done(result) => result,
                _ => StepResult::skipped(&step.step_id, "run ended before dispatch"),
            })
            .collect();

        tracing::info!(
            workflow = %self.descriptor.workflow_id(),
            status = ?status,
            duration_ms = started.elapsed().as_millis() as u64,
            "workflow run finished"
        );

        Ok(RunReport {
            workflow_id: self.descriptor.workflow_id().to_string(),
            status,
            steps: results,
            outputs: ctx.snapshot(),
            abort,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Resolve each step's agent, LLM binding and backend up front so a
    /// missing registration fails before anything executes
    fn resolve_plans(&self) -> Result<Vec<DispatchPlan>, WeftError> {
        let fallback = match self.descriptor.fallback_agent() {
            Some(agent) => Some(self.resolve_target(agent)?),
            None => None,
        };

        self.descriptor
            .steps()
            .iter()
            .map(|step| {
                let agent = self.descriptor.agent(&step.agent_id).ok_or_else(|| {
                    WeftError::Internal(format!("agent '{}' vanished after load", step.agent_id))
                })?;
                Ok(DispatchPlan {
                    step: Arc::clone(step),
                    primary: self.resolve_target(agent)?,
                    fallback: fallback.clone(),
                })
            })
            .collect()
    }

    fn resolve_target(&self, agent: &Arc<Agent>) -> Result<Target, WeftError> {
        let llm = self.descriptor.llm(&agent.llm_id).ok_or_else(|| {
            WeftError::Internal(format!("LLM '{}' vanished after load", agent.llm_id))
        })?;
        let backend = self.registry.get(&llm.llm_id).ok_or_else(|| {
            WeftError::Internal(format!("no backend registered for LLM '{}'", llm.llm_id))
        })?;
        Ok(Target {
            agent: Arc::clone(agent),
            llm: Arc::clone(llm),
            backend,
        })
    }

    /// Build the dispatch future for one ready step. Input values are
    /// cloned out of the context here, so the task never reads shared
    /// state: context writes stay linearized in the scheduler loop.
    fn spawn_dispatch(
        &self,
        index: usize,
        plan: &DispatchPlan,
        ctx: &ExecutionContext,
    ) -> impl std::future::Future<Output = Dispatch> + Send + 'static {
        let mut inputs = Map::new();
        for key in &plan.step.inputs {
            if let Some(value) = ctx.get(key) {
                inputs.insert(key.clone(), value.clone());
            }
        }

        let plan = plan.clone();
        let policy = self.descriptor.error_policy().clone();
        let limits = self.limits.clone();
        let secrets = Arc::clone(&self.secrets);

        dispatch_step(index, plan, inputs, policy, limits, secrets)
    }
}

// ============================================================================
// STEP DISPATCH
// ============================================================================

/// Execute one step to a terminal result: invoke, and on failure walk
/// the policy through retries and at most the configured fallback hops.
async fn dispatch_step(
    index: usize,
    plan: DispatchPlan,
    inputs: Map<String, Value>,
    policy: ErrorPolicy,
    limits: RunLimits,
    secrets: Arc<dyn SecretStore>,
) -> Dispatch {
    let started = Instant::now();
    let step = &plan.step;
    let mut target = &plan.primary;
    let mut total_attempts = 0u32;
    let mut target_attempts = 0u32;
    let mut hops = 0u32;

    loop {
        total_attempts += 1;
        target_attempts += 1;

        tracing::debug!(
            step = %step.step_id,
            agent = %target.agent.agent_id,
            llm = %target.llm.llm_id,
            attempt = target_attempts,
            "dispatching step"
        );

        let signal = match invoke_once(target, step, &inputs, &limits, secrets.as_ref()).await {
            Ok(response) => match map_outputs(step, response.output) {
                Ok((raw, outputs)) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let result = if hops > 0 {
                        StepResult::fallen_back(
                            &step.step_id,
                            raw,
                            &target.agent.agent_id,
                            total_attempts,
                            duration_ms,
                        )
                    } else {
                        StepResult::success(
                            &step.step_id,
                            raw,
                            &target.agent.agent_id,
                            total_attempts,
                            duration_ms,
                        )
                    };
                    return Dispatch {
                        index,
                        result,
                        outputs,
                    };
                }
                Err(signal) => signal,
            },
            Err(signal) => signal,
        };

        tracing::warn!(
            step = %step.step_id,
            agent = %target.agent.agent_id,
            code = signal.code(),
            attempt = target_attempts,
            "step invocation failed"
        );

        let fallback_open = plan.fallback.is_some() && hops < limits.max_fallback_hops;
        match dispose(&policy, &limits, signal.code(), target_attempts, fallback_open) {
            Disposition::RetryAfter(delay) => tokio::time::sleep(delay).await,
            Disposition::FallBack => match plan.fallback.as_ref() {
                Some(fallback) => {
                    tracing::info!(
                        step = %step.step_id,
                        from = %target.agent.agent_id,
                        to = %fallback.agent.agent_id,
                        "substituting fallback agent"
                    );
                    hops += 1;
                    target_attempts = 0;
                    target = fallback;
                }
                None => {
                    return Dispatch {
                        index,
                        result: abort_result(step, &signal, total_attempts, started),
                        outputs: Vec::new(),
                    };
                }
            },
            Disposition::Abort => {
                return Dispatch {
                    index,
                    result: abort_result(step, &signal, total_attempts, started),
                    outputs: Vec::new(),
                };
            }
        }
    }
}

/// Terminal result for an unrecoverable failure: optional steps resolve
/// to Skipped instead of aborting the workflow
fn abort_result(step: &Step, signal: &FailureSignal, attempts: u32, started: Instant) -> StepResult {
    let error = StepError {
        code: signal.code().to_string(),
        message: signal.to_string(),
    };
    let duration_ms = started.elapsed().as_millis() as u64;
    if step.optional {
        StepResult::skipped_after_failure(&step.step_id, error, attempts, duration_ms)
    } else {
        StepResult::failed(&step.step_id, error, attempts, duration_ms)
    }
}

/// One backend invocation: resolve the credential, build the request,
/// call under the per-call timeout. The resolved secret lives only
/// inside this request.
async fn invoke_once(
    target: &Target,
    step: &Step,
    inputs: &Map<String, Value>,
    limits: &RunLimits,
    secrets: &dyn SecretStore,
) -> Result<BackendResponse, FailureSignal> {
    let mut request = BackendRequest::new(&step.step_id, &target.agent.agent_id, &target.llm.model)
        .with_inputs(inputs.clone())
        .with_parameters(target.agent.parameters.clone());

    if let Some(reference) = target.llm.credential_ref.as_deref() {
        let secret = secrets
            .resolve(reference)
            .map_err(|e| FailureSignal::BackendError(e.to_string()))?;
        request = request.with_credential(secret);
    }

    match tokio::time::timeout(
        limits.call_timeout,
        target.backend.invoke(request, limits.call_timeout),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => Err(FailureSignal::Timeout),
    }
}

/// Map the raw backend output onto the step's declared output keys.
///
/// One declared key binds the whole output (or the matching field when
/// the output is an object carrying that exact key). Multiple keys
/// require an object containing every key; anything else is an
/// `InvalidResponse` and goes through the error policy.
fn map_outputs(step: &Step, output: Value) -> Result<(Value, Vec<(String, Value)>), FailureSignal> {
    match step.outputs.len() {
        0 => Ok((output, Vec::new())),
        1 => {
            let key = &step.outputs[0];
            let value = match &output {
                Value::Object(map) if map.contains_key(key) => map[key].clone(),
                other => other.clone(),
            };
            Ok((output, vec![(key.clone(), value)]))
        }
        _ => {
            let map = match &output {
                Value::Object(map) => map,
                other => {
                    return Err(FailureSignal::InvalidResponse(format!(
                        "step '{}' declares {} output keys but backend returned {}",
                        step.step_id,
                        step.outputs.len(),
                        value_kind(other)
                    )))
                }
            };
            let mut outputs = Vec::with_capacity(step.outputs.len());
            for key in &step.outputs {
                let value = map.get(key).ok_or_else(|| {
                    FailureSignal::InvalidResponse(format!(
                        "backend output missing declared key '{key}'"
                    ))
                })?;
                outputs.push((key.clone(), value.clone()));
            }
            Ok((output, outputs))
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::descriptor::Workflow;
    use serde_json::json;

    fn load(yaml: &str) -> Descriptor {
        Descriptor::load(Workflow::from_yaml(yaml).unwrap()).unwrap()
    }

    fn single_step_yaml(optional: bool) -> String {
        format!(
            r#"
workflowId: wf-one
agents:
  - agentId: agent-1
    role: summarizer
    llmId: llm-1
llms:
  - llmId: llm-1
    model: mock
workflowSequence:
  - stepId: step-1
    agentId: agent-1
    outputs: [summary]
    condition: start
    optional: {optional}
errorHandling:
  onError:
    - code: LLM_ERROR
      action: abort
"#
        )
    }

    #[tokio::test]
    async fn single_step_completes() {
        let descriptor = load(&single_step_yaml(false));
        let registry = BackendRegistry::new().register(
            "llm-1",
            Arc::new(MockBackend::answering(json!("a summary"))) as Arc<dyn Backend>,
        );
        let engine = Engine::new(descriptor, registry).with_limits(RunLimits::testing());

        let report = engine.run().await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.steps[0].status, StepStatus::Success);
        assert_eq!(report.outputs["summary"], json!("a summary"));
    }

    #[tokio::test]
    async fn abort_on_required_step_fails_workflow() {
        let descriptor = load(&single_step_yaml(false));
        let registry = BackendRegistry::new().register(
            "llm-1",
            Arc::new(MockBackend::failing(FailureSignal::BackendError("boom".into())))
                as Arc<dyn Backend>,
        );
        let engine = Engine::new(descriptor, registry).with_limits(RunLimits::testing());

        let report = engine.run().await.unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.steps[0].status, StepStatus::Failed);
        let abort = report.abort.unwrap();
        assert_eq!(abort.step_id, "step-1");
        assert_eq!(abort.code, "LLM_ERROR");
        assert_eq!(abort.attempts, 1);
    }

    #[tokio::test]
    async fn abort_on_optional_step_skips_it() {
        let descriptor = load(&single_step_yaml(true));
        let registry = BackendRegistry::new().register(
            "llm-1",
            Arc::new(MockBackend::failing(FailureSignal::BackendError("boom".into())))
                as Arc<dyn Backend>,
        );
        let engine = Engine::new(descriptor, registry).with_limits(RunLimits::testing());

        let report = engine.run().await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.steps[0].status, StepStatus::Skipped);
        assert!(report.abort.is_none());
    }

    #[tokio::test]
    async fn unseeded_input_deadlocks() {
        let yaml = r#"
workflowId: wf-deadlock
agents:
  - agentId: agent-1
    role: r
    llmId: llm-1
llms:
  - llmId: llm-1
    model: mock
workflowSequence:
  - stepId: step-1
    agentId: agent-1
    inputs: [never-produced]
    outputs: [out]
"#;
        let descriptor = load(yaml);
        let registry = BackendRegistry::new()
            .register("llm-1", Arc::new(MockBackend::new()) as Arc<dyn Backend>);
        let engine = Engine::new(descriptor, registry).with_limits(RunLimits::testing());

        match engine.run().await {
            Err(WeftError::Deadlock { step_id, remaining }) => {
                assert_eq!(step_id, "step-1");
                assert_eq!(remaining, 1);
            }
            other => panic!("expected Deadlock, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn seeded_input_resolves_the_same_workflow() {
        let yaml = r#"
workflowId: wf-seeded
agents:
  - agentId: agent-1
    role: r
    llmId: llm-1
llms:
  - llmId: llm-1
    model: mock
workflowSequence:
  - stepId: step-1
    agentId: agent-1
    inputs: [question]
    outputs: [answer]
"#;
        let descriptor = load(yaml);
        let registry = BackendRegistry::new()
            .register("llm-1", Arc::new(MockBackend::new()) as Arc<dyn Backend>);
        let engine = Engine::new(descriptor, registry).with_limits(RunLimits::testing());

        let mut inputs = HashMap::new();
        inputs.insert("question".to_string(), json!("why?"));
        let report = engine.run_with_inputs(inputs).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.outputs.contains_key("answer"));
    }

    #[test]
    fn map_outputs_single_key_takes_matching_field() {
        let step = Step {
            step_id: "s".into(),
            agent_id: "a".into(),
            inputs: vec![],
            outputs: vec!["answer".into()],
            condition: String::new(),
            optional: false,
        };

        let (raw, outputs) = map_outputs(&step, json!({"answer": "yes", "extra": 1})).unwrap();
        assert_eq!(raw["extra"], json!(1));
        assert_eq!(outputs, vec![("answer".to_string(), json!("yes"))]);

        let (_, outputs) = map_outputs(&step, json!("plain text")).unwrap();
        assert_eq!(outputs, vec![("answer".to_string(), json!("plain text"))]);
    }

    #[test]
    fn map_outputs_multi_key_requires_object() {
        let step = Step {
            step_id: "s".into(),
            agent_id: "a".into(),
            inputs: vec![],
            outputs: vec!["a".into(), "b".into()],
            condition: String::new(),
            optional: false,
        };

        assert!(map_outputs(&step, json!({"a": 1, "b": 2})).is_ok());
        assert!(matches!(
            map_outputs(&step, json!({"a": 1})),
            Err(FailureSignal::InvalidResponse(_))
        ));
        assert!(matches!(
            map_outputs(&step, json!("text")),
            Err(FailureSignal::InvalidResponse(_))
        ));
    }
}
