//! Workflow descriptor model
//!
//! The raw `Workflow` mirrors the descriptor document (camelCase wire
//! names). `Descriptor::load` turns a structurally-validated document
//! into the checked, immutable entity graph the engine runs against:
//! all cross-references resolved, conditions parsed, output keys unique,
//! capability sets verified, and the step graph proven acyclic.
//! Structural schema validation itself is an external collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::condition::Condition;
use crate::error::WeftError;
use crate::graph::StepGraph;

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Workflow descriptor as parsed from YAML/JSON
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub workflow_id: String,
    pub agents: Vec<Agent>,
    pub llms: Vec<LlmBinding>,
    #[serde(rename = "workflowSequence")]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub data_formats: Option<DataFormats>,
    #[serde(rename = "errorHandling", default)]
    pub error_policy: ErrorPolicy,
    #[serde(default)]
    pub security: Option<SecurityPolicy>,
}

impl Workflow {
    pub fn from_yaml(source: &str) -> Result<Self, WeftError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json(source: &str) -> Result<Self, WeftError> {
        Ok(serde_json::from_str(source)?)
    }

    /// For callers that already hold the document as JSON
    pub fn from_value(value: Value) -> Result<Self, WeftError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// A named role bound to one LLM backend and invocation parameters.
/// Constructed at load time, immutable for the life of a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub agent_id: String,
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub llm_id: String,
    /// Free-form backend-call parameters (temperature, max_tokens, ...).
    /// Unknown keys pass through to the adapter opaquely.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Metadata and connection info for one backend model
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmBinding {
    pub llm_id: String,
    pub model: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Reference into the secret store - never the literal secret
    #[serde(default)]
    pub credential_ref: Option<String>,
    /// Explicit adapter tag; inferred from the model name when absent
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub input_format: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// One unit of workflow execution
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// `start` or `after <step-id>`; empty means `start`
    #[serde(default)]
    pub condition: String,
    /// Optional steps resolve to Skipped instead of aborting the run
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFormats {
    pub input_format: String,
    pub output_format: String,
}

/// Security metadata carried opaquely for collaborators
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct SecurityPolicy(pub Map<String, Value>);

// ============================================================================
// ERROR POLICY
// ============================================================================

/// Ordered error-code -> action table plus an optional fallback agent
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPolicy {
    #[serde(default)]
    pub on_error: Vec<ErrorRule>,
    #[serde(default)]
    pub fallback_agent_id: Option<String>,
    /// Retry attempt cap; falls back to `RunLimits::max_attempts`
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorRule {
    pub code: String,
    pub action: Action,
}

/// What to do about a classified backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Retry,
    Fallback,
    Abort,
}

impl ErrorPolicy {
    /// Look up the action for a failure classification code.
    /// Exact match on the ordered table; unmatched codes abort.
    pub fn action_for(&self, code: &str) -> Action {
        self.on_error
            .iter()
            .find(|rule| rule.code == code)
            .map(|rule| rule.action)
            .unwrap_or(Action::Abort)
    }
}

// ============================================================================
// LOADED DESCRIPTOR
// ============================================================================

/// Checked, immutable entity graph. Re-running requires a fresh load.
#[derive(Debug)]
pub struct Descriptor {
    workflow_id: String,
    agents: HashMap<String, Arc<Agent>>,
    llms: HashMap<String, Arc<LlmBinding>>,
    steps: Vec<Arc<Step>>,
    conditions: Vec<Condition>,
    /// output key -> index of the producing step
    producers: HashMap<String, usize>,
    graph: StepGraph,
    error_policy: ErrorPolicy,
    data_formats: Option<DataFormats>,
    security: Option<SecurityPolicy>,
}

impl Descriptor {
    /// Build the entity graph from a validated workflow document.
    ///
    /// Fails with a reference error on any dangling cross-reference,
    /// with `Cycle` when the inferred step graph is cyclic, and with
    /// `CapabilityGap` when an agent claims a capability its LLM does
    /// not declare.
    pub fn load(workflow: Workflow) -> Result<Self, WeftError> {
        let llms: HashMap<String, Arc<LlmBinding>> = workflow
            .llms
            .into_iter()
            .map(|llm| (llm.llm_id.clone(), Arc::new(llm)))
            .collect();

        let mut agents: HashMap<String, Arc<Agent>> = HashMap::with_capacity(workflow.agents.len());
        for agent in workflow.agents {
            let llm = llms.get(&agent.llm_id).ok_or_else(|| WeftError::UnknownLlm {
                agent_id: agent.agent_id.clone(),
                llm_id: agent.llm_id.clone(),
            })?;

            // LLM capabilities must cover everything the agent claims to need
            for capability in &agent.capabilities {
                if !llm.capabilities.contains(capability) {
                    return Err(WeftError::CapabilityGap {
                        agent_id: agent.agent_id.clone(),
                        llm_id: llm.llm_id.clone(),
                        capability: capability.clone(),
                    });
                }
            }

            agents.insert(agent.agent_id.clone(), Arc::new(agent));
        }

        if let Some(fallback) = &workflow.error_policy.fallback_agent_id {
            if !agents.contains_key(fallback) {
                return Err(WeftError::UnknownFallbackAgent {
                    agent_id: fallback.clone(),
                });
            }
        }

        let steps: Vec<Arc<Step>> = workflow.steps.into_iter().map(Arc::new).collect();
        let index_of: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.step_id.as_str(), i))
            .collect();

        let mut conditions = Vec::with_capacity(steps.len());
        let mut producers: HashMap<String, usize> = HashMap::new();

        for (i, step) in steps.iter().enumerate() {
            if !agents.contains_key(&step.agent_id) {
                return Err(WeftError::UnknownAgent {
                    step_id: step.step_id.clone(),
                    agent_id: step.agent_id.clone(),
                });
            }

            let condition =
                Condition::parse(&step.condition).ok_or_else(|| WeftError::InvalidCondition {
                    step_id: step.step_id.clone(),
                    raw: step.condition.clone(),
                })?;
            if let Some(target) = condition.after_target() {
                if !index_of.contains_key(target) {
                    return Err(WeftError::UnknownConditionStep {
                        step_id: step.step_id.clone(),
                        target: target.to_string(),
                    });
                }
            }
            conditions.push(condition);

            // Single writer per output key
            for key in &step.outputs {
                if let Some(&first) = producers.get(key) {
                    return Err(WeftError::DuplicateOutputKey {
                        key: key.clone(),
                        first: steps[first].step_id.clone(),
                        second: step.step_id.clone(),
                    });
                }
                producers.insert(key.clone(), i);
            }
        }

        // Dependency edges: explicit `after` conditions plus inferred
        // output -> input key wiring
        let mut graph = StepGraph::new(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if let Some(target) = conditions[i].after_target() {
                graph.add_edge(index_of[target], i);
            }
            for key in &step.inputs {
                if let Some(&producer) = producers.get(key) {
                    graph.add_edge(producer, i);
                }
            }
        }

        if let Err(on_cycle) = graph.check_acyclic() {
            return Err(WeftError::Cycle {
                step_id: steps[on_cycle].step_id.clone(),
            });
        }

        Ok(Self {
            workflow_id: workflow.workflow_id,
            agents,
            llms,
            steps,
            conditions,
            producers,
            graph,
            error_policy: workflow.error_policy,
            data_formats: workflow.data_formats,
            security: workflow.security,
        })
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn steps(&self) -> &[Arc<Step>] {
        &self.steps
    }

    pub fn condition(&self, index: usize) -> &Condition {
        &self.conditions[index]
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Arc<Agent>> {
        self.agents.get(agent_id)
    }

    pub fn llm(&self, llm_id: &str) -> Option<&Arc<LlmBinding>> {
        self.llms.get(llm_id)
    }

    pub fn llms(&self) -> impl Iterator<Item = &Arc<LlmBinding>> {
        self.llms.values()
    }

    /// The agent substituted on fallback, if the policy names one
    pub fn fallback_agent(&self) -> Option<&Arc<Agent>> {
        self.error_policy
            .fallback_agent_id
            .as_deref()
            .and_then(|id| self.agents.get(id))
    }

    pub fn error_policy(&self) -> &ErrorPolicy {
        &self.error_policy
    }

    pub fn data_formats(&self) -> Option<&DataFormats> {
        self.data_formats.as_ref()
    }

    pub fn security(&self) -> Option<&SecurityPolicy> {
        self.security.as_ref()
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// Index of the step that produces an output key
    pub fn producer_of(&self, key: &str) -> Option<usize> {
        self.producers.get(key).copied()
    }
}

// ============================================================================
// TESTS
// ============================================================================
