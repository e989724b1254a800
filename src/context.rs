//! Execution context: the produced-output store for one workflow run
//!
//! One instance per run, owned by the engine. Writes are linearized
//! through the engine loop, so the map itself needs no locking.

use std::collections::HashMap;

use serde_json::Value;

/// Mutable key/value store of produced outputs for one workflow run.
///
/// Grows monotonically: keys are inserted as steps commit and never
/// removed. The single-writer-per-key invariant is enforced at load
/// time (no two steps declare the same output key).
#[derive(Debug, Default, Clone)]
pub struct ExecutionContext {
    values: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with workflow inputs
    pub fn with_inputs(inputs: HashMap<String, Value>) -> Self {
        Self { values: inputs }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Merge a step's produced outputs. Existing keys are never
    /// overwritten, keeping the context append-only.
    pub fn commit<I>(&mut self, outputs: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (key, value) in outputs {
            self.values.entry(key).or_insert(value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Snapshot the context as a JSON object (for the run report)
    pub fn snapshot(&self) -> serde_json::Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commit_and_lookup() {
        let mut ctx = ExecutionContext::new();
        ctx.commit([("answer".to_string(), json!("42"))]);

        assert!(ctx.contains("answer"));
        assert_eq!(ctx.get("answer"), Some(&json!("42")));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn commit_never_overwrites() {
        let mut ctx = ExecutionContext::new();
        ctx.commit([("k".to_string(), json!(1))]);
        ctx.commit([("k".to_string(), json!(2))]);

        assert_eq!(ctx.get("k"), Some(&json!(1)));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn seeded_inputs_are_visible() {
        let mut inputs = HashMap::new();
        inputs.insert("question".to_string(), json!("What is Rust?"));

        let ctx = ExecutionContext::with_inputs(inputs);
        assert!(ctx.contains("question"));
    }

    #[test]
    fn snapshot_contains_all_keys() {
        let mut ctx = ExecutionContext::new();
        ctx.commit([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!({"nested": true})),
        ]);

        let snap = ctx.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["b"]["nested"], json!(true));
    }
}
