//! Per-run report: step results, final outputs, overall status
//!
//! The report always distinguishes "step failed but the workflow
//! completed via fallback or skip" from "workflow aborted", and carries
//! enough detail (step id, classification, attempt count) to diagnose a
//! run without re-running it.

use serde::Serialize;
use serde_json::{Map, Value};

/// Terminal state of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Primary agent produced the output
    Success,
    /// Output produced by the fallback agent
    FallenBack,
    /// Unrecoverable failure that aborted the workflow
    Failed,
    /// Never ran: condition unsatisfiable, optional-step abort, or the
    /// run ended before dispatch
    Skipped,
}

/// Failure detail attached to non-success results
#[derive(Debug, Clone, Serialize)]
pub struct StepError {
    /// Failure classification code (e.g. `LLM_TIMEOUT`)
    pub code: String,
    pub message: String,
}

/// Result of one step within a run
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    /// The raw backend output, present on Success/FallenBack
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    /// Which agent actually served the output (the fallback agent when
    /// the status is FallenBack)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub served_by: Option<String>,
    /// Total backend invocations made for this step
    pub attempts: u32,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(
        step_id: impl Into<String>,
        output: Value,
        served_by: impl Into<String>,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Success,
            output: Some(output),
            error: None,
            served_by: Some(served_by.into()),
            attempts,
            duration_ms,
        }
    }

    pub fn fallen_back(
        step_id: impl Into<String>,
        output: Value,
        served_by: impl Into<String>,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            status: StepStatus::FallenBack,
            ..Self::success(step_id, output, served_by, attempts, duration_ms)
        }
    }

    pub fn failed(
        step_id: impl Into<String>,
        error: StepError,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error),
            served_by: None,
            attempts,
            duration_ms,
        }
    }

    pub fn skipped(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            output: None,
            error: Some(StepError {
                code: "SKIPPED".to_string(),
                message: reason.into(),
            }),
            served_by: None,
            attempts: 0,
            duration_ms: 0,
        }
    }

    /// Skipped after real invocation attempts (optional-step abort)
    pub fn skipped_after_failure(
        step_id: impl Into<String>,
        error: StepError,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            output: None,
            error: Some(error),
            served_by: None,
            attempts,
            duration_ms,
        }
    }

    pub fn is_terminal_success(&self) -> bool {
        matches!(self.status, StepStatus::Success | StepStatus::FallenBack)
    }
}

/// Overall run outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Terminal workflow failure: the triggering step and signal
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowAbort {
    pub step_id: String,
    /// Failure classification that exhausted the policy
    pub code: String,
    pub message: String,
    pub attempts: u32,
}

/// Everything a caller learns from one workflow run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub workflow_id: String,
    pub status: RunStatus,
    /// One result per declared step, in declared order
    pub steps: Vec<StepResult>,
    /// Final execution context snapshot
    pub outputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<WorkflowAbort>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn step(&self, step_id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}
