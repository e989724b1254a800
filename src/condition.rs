//! Condition evaluation: decides whether a step may run
//!
//! Conditions come from the descriptor as strings (`start` or
//! `after <step-id>`) and are parsed once at load time. Eligibility is
//! re-evaluated freshly each scheduling round against the current step
//! results and execution context - no caching across context mutations.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::ExecutionContext;
use crate::descriptor::Step;
use crate::report::StepStatus;

/// Pattern for "after step-1" / "after: step-1" / "after(step-1)"
static AFTER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^after[\s:(]+([\w.-]+?)\)?$").expect("valid regex"));

/// Parsed step condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Always eligible (workflow entry point)
    Start,
    /// Eligible once the referenced step has terminated successfully
    AfterStep(String),
}

/// Result of evaluating a step's condition against the current run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// May be dispatched now
    Eligible,
    /// Blocked on steps that are still pending or in flight
    NotYetEligible,
    /// Will never become eligible in this run
    PermanentlySkipped,
}

impl Condition {
    /// Parse a descriptor condition string. Empty conditions default to
    /// `Start`, matching descriptors that omit the field.
    pub fn parse(raw: &str) -> Option<Condition> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("start") {
            return Some(Condition::Start);
        }
        AFTER_PATTERN
            .captures(trimmed)
            .map(|cap| Condition::AfterStep(cap[1].to_string()))
    }

    /// The step this condition waits on, if any
    pub fn after_target(&self) -> Option<&str> {
        match self {
            Condition::Start => None,
            Condition::AfterStep(id) => Some(id),
        }
    }

    /// Evaluate the condition alone, given terminal statuses by step id.
    /// `status_of` returns `None` while the referenced step is unfinished.
    pub fn eligibility<F>(&self, status_of: F) -> Eligibility
    where
        F: Fn(&str) -> Option<StepStatus>,
    {
        match self {
            Condition::Start => Eligibility::Eligible,
            Condition::AfterStep(id) => match status_of(id) {
                None => Eligibility::NotYetEligible,
                Some(StepStatus::Success) | Some(StepStatus::FallenBack) => Eligibility::Eligible,
                Some(StepStatus::Failed) | Some(StepStatus::Skipped) => {
                    Eligibility::PermanentlySkipped
                }
            },
        }
    }
}

/// Full eligibility check for a step: condition plus declared inputs.
///
/// A step is `Eligible` when its condition holds and every declared
/// input key is present in the context. A missing input whose producing
/// step has already terminated without committing it (failed or
/// skipped) makes the step `PermanentlySkipped` - the key can never
/// appear, so waiting would deadlock the run.
pub fn evaluate_step<'a, S, P>(
    step: &Step,
    condition: &Condition,
    ctx: &ExecutionContext,
    status_of: S,
    producer_of: P,
) -> Eligibility
where
    S: Fn(&str) -> Option<StepStatus>,
    P: Fn(&str) -> Option<&'a str>,
{
    match condition.eligibility(&status_of) {
        Eligibility::Eligible => {}
        blocked => return blocked,
    }

    let mut waiting = false;
    for key in &step.inputs {
        if ctx.contains(key) {
            continue;
        }
        match producer_of(key).and_then(|producer| status_of(producer)) {
            Some(StepStatus::Failed) | Some(StepStatus::Skipped) => {
                return Eligibility::PermanentlySkipped;
            }
            _ => waiting = true,
        }
    }

    if waiting {
        Eligibility::NotYetEligible
    } else {
        Eligibility::Eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step_with_inputs(inputs: &[&str]) -> Step {
        Step {
            step_id: "step-1".into(),
            agent_id: "agent-1".into(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: vec!["out".into()],
            condition: "start".into(),
            optional: false,
        }
    }

    #[test]
    fn parse_start_variants() {
        assert_eq!(Condition::parse("start"), Some(Condition::Start));
        assert_eq!(Condition::parse("Start"), Some(Condition::Start));
        assert_eq!(Condition::parse(""), Some(Condition::Start));
        assert_eq!(Condition::parse("  START  "), Some(Condition::Start));
    }

    #[test]
    fn parse_after_variants() {
        for raw in ["after step-1", "After: step-1", "after(step-1)", "AFTER  step-1"] {
            assert_eq!(
                Condition::parse(raw),
                Some(Condition::AfterStep("step-1".into())),
                "failed to parse {raw:?}"
            );
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Condition::parse("when the moon is full"), None);
        assert_eq!(Condition::parse("after"), None);
    }

    #[test]
    fn start_is_always_eligible() {
        let e = Condition::Start.eligibility(|_| None);
        assert_eq!(e, Eligibility::Eligible);
    }

    #[test]
    fn after_tracks_upstream_status() {
        let cond = Condition::AfterStep("up".into());

        assert_eq!(cond.eligibility(|_| None), Eligibility::NotYetEligible);
        assert_eq!(
            cond.eligibility(|_| Some(StepStatus::Success)),
            Eligibility::Eligible
        );
        assert_eq!(
            cond.eligibility(|_| Some(StepStatus::FallenBack)),
            Eligibility::Eligible
        );
        assert_eq!(
            cond.eligibility(|_| Some(StepStatus::Failed)),
            Eligibility::PermanentlySkipped
        );
        assert_eq!(
            cond.eligibility(|_| Some(StepStatus::Skipped)),
            Eligibility::PermanentlySkipped
        );
    }

    #[test]
    fn inputs_gate_eligibility() {
        let step = step_with_inputs(&["question"]);
        let empty = ExecutionContext::new();

        let e = evaluate_step(&step, &Condition::Start, &empty, |_| None, |_| Some("up"));
        assert_eq!(e, Eligibility::NotYetEligible);

        let mut ctx = ExecutionContext::new();
        ctx.commit([("question".to_string(), json!("q"))]);
        let e = evaluate_step(&step, &Condition::Start, &ctx, |_| None, |_| Some("up"));
        assert_eq!(e, Eligibility::Eligible);
    }

    #[test]
    fn dead_producer_skips_consumer() {
        let step = step_with_inputs(&["summary"]);
        let ctx = ExecutionContext::new();

        let e = evaluate_step(
            &step,
            &Condition::Start,
            &ctx,
            |_| Some(StepStatus::Failed),
            |_| Some("up"),
        );
        assert_eq!(e, Eligibility::PermanentlySkipped);
    }
}
