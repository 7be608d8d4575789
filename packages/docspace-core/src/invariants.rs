use serde_json::Value;

use crate::ids::DocId;

/// What a rule gets to look at: the write target and the JSON view the
/// branch would have after the write.
pub struct InvariantInput<'a> {
    pub doc: &'a DocId,
    pub branch: &'a str,
    pub json: &'a Value,
}

pub type InvariantFn = dyn Fn(&InvariantInput<'_>) -> Result<(), String> + Send + Sync;

/// Validation predicates run inside the transaction pipeline before commit.
/// Each space owns (or is injected with) its own registry instance; there is
/// no process-wide registration. A returned violation aborts the entire
/// submission, fail-closed.
#[derive(Default)]
pub struct InvariantRegistry {
    rules: Vec<Box<InvariantFn>>,
}

impl InvariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Administrative operation; not part of the hot write path's contract.
    pub fn register<F>(&mut self, rule: F)
    where
        F: Fn(&InvariantInput<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.rules.push(Box::new(rule));
    }

    /// Administrative operation; intended for test isolation.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule against the input; the first violation wins.
    pub fn check(&self, input: &InvariantInput<'_>) -> Result<(), String> {
        for rule in &self.rules {
            rule(input)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for InvariantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvariantRegistry").field("rules", &self.rules.len()).finish()
    }
}
