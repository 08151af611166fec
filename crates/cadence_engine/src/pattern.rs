//! Trigger pattern matching.
//!
//! Finds every way a rule's patterns can be satisfied by the completions of
//! one flow, given that the newest completion must take part.

use std::collections::HashSet;

use cadence_foundation::{Fields, RecordId, Value};
use cadence_log::{Completion, GuardKey};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::rule::{FieldMatch, TriggerPattern};

// =============================================================================
// Binding
// =============================================================================

/// Variable values plus the ids of the completions that produced them.
///
/// The matched ids are a side channel for the firing guard; they are not
/// visible to clauses or targets.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Binding {
    values: Fields,
    matched: Vec<RecordId>,
}

impl Binding {
    /// Creates an empty binding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a binding from parts.
    #[must_use]
    pub fn from_parts(values: Fields, matched: Vec<RecordId>) -> Self {
        Self { values, matched }
    }

    /// Gets a variable.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.values.get(var)
    }

    /// Sets a variable.
    pub fn set(&mut self, var: impl Into<String>, value: Value) {
        self.values.set(var.into(), value);
    }

    /// All variable values.
    #[must_use]
    pub fn values(&self) -> &Fields {
        &self.values
    }

    /// Ids of the matched completions, in pattern order.
    #[must_use]
    pub fn matched(&self) -> &[RecordId] {
        &self.matched
    }

    /// The firing-guard key of this match under a rule.
    #[must_use]
    pub fn guard_key(&self, rule: &str) -> GuardKey {
        GuardKey::new(rule, self.matched.iter().copied())
    }

    /// Drops the matched-id side channel.
    #[must_use]
    pub fn into_values(self) -> Fields {
        self.values
    }
}

// =============================================================================
// Field and Pattern Matching
// =============================================================================

/// Matches field specs against a field map, extending `values`.
///
/// A missing field fails literal and variable specs.
fn match_fields(specs: &[(String, FieldMatch)], fields: &Fields, values: &mut Fields) -> bool {
    for (name, spec) in specs {
        match spec {
            FieldMatch::Wildcard => {}
            FieldMatch::Literal(expected) => {
                if fields.get(name.as_str()) != Some(expected) {
                    return false;
                }
            }
            FieldMatch::Var(var) => {
                let Some(actual) = fields.get(name.as_str()) else {
                    return false;
                };
                match values.get(var.as_str()) {
                    Some(bound) if bound != actual => return false,
                    Some(_) => {}
                    None => values.set(var.clone(), actual.clone()),
                }
            }
        }
    }
    true
}

/// Matches one pattern against one completion.
///
/// Returns the extended values on success.
#[must_use]
pub fn match_pattern(
    pattern: &TriggerPattern,
    completion: &Completion,
    values: &Fields,
) -> Option<Fields> {
    if pattern.concept != completion.concept || pattern.action != completion.action {
        return None;
    }
    if pattern
        .variant
        .as_ref()
        .is_some_and(|v| *v != completion.variant)
    {
        return None;
    }

    let mut values = values.clone();
    if !match_fields(&pattern.input, &completion.input, &mut values) {
        return None;
    }
    if !match_fields(&pattern.output, &completion.output, &mut values) {
        return None;
    }
    Some(values)
}

// =============================================================================
// Pattern Matcher
// =============================================================================

/// Enumerates rule matches.
pub struct PatternMatcher;

impl PatternMatcher {
    /// Every binding under which all `patterns` are satisfied by completions
    /// in `history`, with at least one pattern satisfied by `trigger`.
    ///
    /// `history` should hold the completions of the trigger's flow; entries
    /// from other flows are ignored. One binding is returned per distinct
    /// set of matched completions, in discovery order.
    #[must_use]
    pub fn match_rule(
        patterns: &[TriggerPattern],
        trigger: &Completion,
        history: &[Completion],
    ) -> Vec<Binding> {
        let history: Vec<&Completion> = history
            .iter()
            .filter(|c| c.flow == trigger.flow)
            .collect();

        let mut out = Vec::new();
        let mut seen: HashSet<Vec<RecordId>> = HashSet::new();

        for (anchor, pattern) in patterns.iter().enumerate() {
            let Some(values) = match_pattern(pattern, trigger, &Fields::new()) else {
                continue;
            };
            let mut assigned = vec![None; patterns.len()];
            assigned[anchor] = Some(trigger.id);
            Self::extend(
                patterns,
                &history,
                0,
                values,
                &mut assigned,
                &mut seen,
                &mut out,
            );
        }
        out
    }

    fn extend(
        patterns: &[TriggerPattern],
        history: &[&Completion],
        pos: usize,
        values: Fields,
        assigned: &mut [Option<RecordId>],
        seen: &mut HashSet<Vec<RecordId>>,
        out: &mut Vec<Binding>,
    ) {
        if pos == patterns.len() {
            let matched: Vec<RecordId> = assigned.iter().flatten().copied().collect();
            let mut key = matched.clone();
            key.sort_unstable();
            key.dedup();
            if seen.insert(key) {
                out.push(Binding::from_parts(values, matched));
            }
            return;
        }

        if assigned[pos].is_some() {
            Self::extend(patterns, history, pos + 1, values, assigned, seen, out);
            return;
        }

        for completion in history {
            if let Some(next) = match_pattern(&patterns[pos], completion, &values) {
                assigned[pos] = Some(completion.id);
                Self::extend(patterns, history, pos + 1, next, assigned, seen, out);
                assigned[pos] = None;
            }
        }
    }
}
