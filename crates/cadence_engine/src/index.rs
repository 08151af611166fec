//! Rule index: (concept, action) of each trigger pattern to rules.
//!
//! An explicit multi-map rebuilt whenever the rule set changes.

use std::collections::HashMap;
use std::sync::Arc;

use cadence_foundation::{Error, ErrorKind, Result};

use crate::rule::{CompiledRule, Rule, RuleCompiler};

/// Registered rules and their trigger index.
#[derive(Default)]
pub struct RuleIndex {
    /// Rules in registration order.
    rules: Vec<Arc<CompiledRule>>,
    by_trigger: HashMap<(String, String), Vec<Arc<CompiledRule>>>,
}

impl RuleIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and adds a rule, then rebuilds the index.
    ///
    /// # Errors
    /// Returns an error if the rule is malformed or its name is taken.
    pub fn register(&mut self, rule: Rule) -> Result<Arc<CompiledRule>> {
        if self.get(&rule.name).is_some() {
            return Err(Error::new(ErrorKind::DuplicateRule(rule.name)));
        }
        let compiled = Arc::new(RuleCompiler::compile(rule)?);
        self.rules.push(Arc::clone(&compiled));
        self.rebuild();
        Ok(compiled)
    }

    /// Removes a rule by name, then rebuilds the index.
    ///
    /// # Errors
    /// Returns an error if no rule has this name.
    pub fn unregister(&mut self, name: &str) -> Result<Arc<CompiledRule>> {
        let pos = self
            .rules
            .iter()
            .position(|r| r.name() == name)
            .ok_or_else(|| Error::new(ErrorKind::RuleNotFound(name.to_string())))?;
        let removed = self.rules.remove(pos);
        self.rebuild();
        Ok(removed)
    }

    fn rebuild(&mut self) {
        self.by_trigger.clear();
        for rule in &self.rules {
            for pattern in rule.patterns() {
                let entry = self
                    .by_trigger
                    .entry((pattern.concept.clone(), pattern.action.clone()))
                    .or_default();
                // A rule with two patterns on one action is listed once.
                if !entry.iter().any(|r| Arc::ptr_eq(r, rule)) {
                    entry.push(Arc::clone(rule));
                }
            }
        }
    }

    /// Rules with a pattern on `concept/action`, in registration order.
    #[must_use]
    pub fn candidates(&self, concept: &str, action: &str) -> Vec<Arc<CompiledRule>> {
        self.by_trigger
            .get(&(concept.to_string(), action.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CompiledRule>> {
        self.rules.iter().find(|r| r.name() == name).cloned()
    }

    /// Rule names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name().to_string()).collect()
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
