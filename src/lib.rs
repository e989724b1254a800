//! # Weft
//!
//! Execution core for declarative LLM agent workflows.
//!
//! A workflow descriptor (YAML or JSON) declares agents, the LLM
//! backends they bind to, and a sequence of steps wired together by
//! named data keys and `after` conditions. Weft loads the descriptor
//! into a checked entity graph, schedules steps concurrently as their
//! inputs become available, and drives every backend failure through a
//! declarative retry/fallback policy.
//!
//! ```no_run
//! use weft::{BackendRegistry, Descriptor, Engine, Workflow};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let workflow = Workflow::from_yaml(&std::fs::read_to_string("workflow.yaml")?)?;
//! let descriptor = Descriptor::load(workflow)?;
//! let registry = BackendRegistry::from_descriptor(&descriptor)?;
//!
//! let report = Engine::new(descriptor, registry).run().await?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod condition;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod graph;
pub mod limits;
pub mod policy;
pub mod report;
pub mod secrets;

pub use backend::{
    create_backend, Backend, BackendRegistry, BackendRequest, BackendResponse, CapabilitySet,
    FailureSignal, InferenceBackend, MockBackend, MockOutcome, OpenAiBackend,
};
pub use condition::{Condition, Eligibility};
pub use context::ExecutionContext;
pub use descriptor::{
    Action, Agent, DataFormats, Descriptor, ErrorPolicy, ErrorRule, LlmBinding, SecurityPolicy,
    Step, Workflow,
};
pub use engine::{cancel_pair, CancelHandle, CancelToken, Engine};
pub use error::{FixSuggestion, WeftError};
pub use limits::RunLimits;
pub use report::{RunReport, RunStatus, StepError, StepResult, StepStatus, WorkflowAbort};
pub use secrets::{EnvSecretStore, SecretStore, StaticSecretStore};
