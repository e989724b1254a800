//! Error types with fix suggestions

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum WeftError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Load-time reference errors (WEFT-010 to WEFT-014)
    // ─────────────────────────────────────────────────────────────

    #[error("WEFT-010: step '{step_id}' references unknown agent '{agent_id}'")]
    UnknownAgent { step_id: String, agent_id: String },

    #[error("WEFT-011: agent '{agent_id}' references unknown LLM binding '{llm_id}'")]
    UnknownLlm { agent_id: String, llm_id: String },

    #[error("WEFT-012: error policy fallback references unknown agent '{agent_id}'")]
    UnknownFallbackAgent { agent_id: String },

    #[error("WEFT-013: output key '{key}' is declared by both '{first}' and '{second}'")]
    DuplicateOutputKey {
        key: String,
        first: String,
        second: String,
    },

    #[error("WEFT-014: condition of step '{step_id}' references unknown step '{target}'")]
    UnknownConditionStep { step_id: String, target: String },

    // ─────────────────────────────────────────────────────────────
    // Load-time structural errors (WEFT-020 to WEFT-031)
    // ─────────────────────────────────────────────────────────────

    #[error("WEFT-020: step dependency graph contains a cycle through '{step_id}'")]
    Cycle { step_id: String },

    #[error(
        "WEFT-030: agent '{agent_id}' needs capability '{capability}' \
         that LLM '{llm_id}' does not declare"
    )]
    CapabilityGap {
        agent_id: String,
        llm_id: String,
        capability: String,
    },

    #[error("WEFT-031: invalid condition '{raw}' on step '{step_id}'")]
    InvalidCondition { step_id: String, raw: String },

    // ─────────────────────────────────────────────────────────────
    // Run-time errors (WEFT-050 to WEFT-052)
    // ─────────────────────────────────────────────────────────────

    #[error(
        "WEFT-050: no step is runnable but {remaining} steps are unfinished \
         (first: '{step_id}')"
    )]
    Deadlock { step_id: String, remaining: usize },

    #[error("WEFT-051: secret reference '{reference}' could not be resolved: {details}")]
    SecretUnresolved { reference: String, details: String },

    #[error("WEFT-052: internal scheduler error: {0}")]
    Internal(String),
}

impl FixSuggestion for WeftError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            WeftError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            WeftError::JsonParse(_) => Some("Check JSON syntax with a linter"),
            WeftError::Io(_) => Some("Check file path and permissions"),

            WeftError::UnknownAgent { .. } => {
                Some("Declare the agent under agents: or fix the step's agentId")
            }
            WeftError::UnknownLlm { .. } => {
                Some("Declare the binding under llms: or fix the agent's llmId")
            }
            WeftError::UnknownFallbackAgent { .. } => {
                Some("Declare the fallback agent under agents: or remove fallbackAgentId")
            }
            WeftError::DuplicateOutputKey { .. } => {
                Some("Give each step a unique output key - one writer per key")
            }
            WeftError::UnknownConditionStep { .. } => {
                Some("Conditions may only reference steps declared in workflowSequence")
            }
            WeftError::Cycle { .. } => {
                Some("Break the cycle - a step cannot depend on its own output")
            }
            WeftError::CapabilityGap { .. } => {
                Some("Add the capability to the LLM binding or bind the agent to a capable LLM")
            }
            WeftError::InvalidCondition { .. } => {
                Some("Use 'start' or 'after <step-id>' as the condition")
            }
            WeftError::Deadlock { .. } => {
                Some("Seed the missing input keys via workflow inputs or add a producing step")
            }
            WeftError::SecretUnresolved { .. } => {
                Some("Export the referenced environment variable or configure a secret store")
            }
            WeftError::Internal(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_errors_carry_both_ids() {
        let err = WeftError::UnknownAgent {
            step_id: "step-1".into(),
            agent_id: "agent-x".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("step-1"));
        assert!(msg.contains("agent-x"));
        assert!(msg.starts_with("WEFT-010"));
    }

    #[test]
    fn load_errors_have_suggestions() {
        let errors = [
            WeftError::UnknownAgent {
                step_id: "s".into(),
                agent_id: "a".into(),
            },
            WeftError::Cycle {
                step_id: "s".into(),
            },
            WeftError::CapabilityGap {
                agent_id: "a".into(),
                llm_id: "l".into(),
                capability: "c".into(),
            },
            WeftError::Deadlock {
                step_id: "s".into(),
                remaining: 2,
            },
        ];
        for err in errors {
            assert!(err.fix_suggestion().is_some(), "no suggestion for {err}");
        }
    }
}
