//! Clause evaluation.
//!
//! Clauses run strictly in declaration order over a growing set of
//! bindings: a query fans each binding out over its result rows, a bind
//! adds a derived value, and a filter drops bindings.

use cadence_foundation::{Error, ErrorKind, Fields, Result, SemanticLimit, Value};
use tracing::trace;

use crate::pattern::Binding;
use crate::rule::{Clause, Query, ValueRef};

/// Anything clause queries can be answered from.
pub trait QuerySource {
    /// Runs `relation` on `concept`, filtered by `args`.
    ///
    /// # Errors
    /// Returns an error if the concept cannot answer.
    fn query(&self, concept: &str, relation: &str, args: &Fields) -> Result<Vec<Fields>>;
}

/// Resolves a value reference against a binding.
///
/// # Errors
/// Returns `UnboundVariable` if the variable is missing.
pub fn resolve(value: &ValueRef, binding: &Binding) -> Result<Value> {
    match value {
        ValueRef::Literal(v) => Ok(v.clone()),
        ValueRef::Var(var) => binding
            .get(var)
            .cloned()
            .ok_or_else(|| Error::unbound_variable(var.clone())),
    }
}

/// Runs a rule's clauses over one match.
pub struct ClauseEvaluator<'a> {
    source: &'a dyn QuerySource,
    max_fan_out: usize,
}

impl<'a> ClauseEvaluator<'a> {
    /// Creates an evaluator answering queries from `source`.
    #[must_use]
    pub fn new(source: &'a dyn QuerySource, max_fan_out: usize) -> Self {
        Self {
            source,
            max_fan_out,
        }
    }

    /// Evaluates `clauses` starting from one binding.
    ///
    /// Returns zero or more enriched bindings. Any failure fails the whole
    /// match, because a partially evaluated match cannot be guarded.
    ///
    /// # Errors
    /// Returns an error if a query fails, an expression fails, or the
    /// binding set grows past the fan-out limit.
    pub fn evaluate(
        &self,
        rule: &str,
        clauses: &[Clause],
        binding: Binding,
    ) -> Result<Vec<Binding>> {
        let mut current = vec![binding];

        for clause in clauses {
            if current.is_empty() {
                break;
            }
            current = match clause {
                Clause::Bind { var, expr } => current
                    .into_iter()
                    .map(|mut b| {
                        let value = expr.eval(b.values())?;
                        b.set(var.clone(), value);
                        Ok(b)
                    })
                    .collect::<Result<Vec<_>>>()?,
                Clause::Filter(expr) => {
                    let mut kept = Vec::with_capacity(current.len());
                    for b in current {
                        if expr.eval(b.values())?.is_truthy() {
                            kept.push(b);
                        }
                    }
                    kept
                }
                Clause::Query(query) => self.fan_out(rule, query, current)?,
            };
            trace!(rule, bindings = current.len(), "clause evaluated");
        }

        Ok(current)
    }

    fn fan_out(&self, rule: &str, query: &Query, current: Vec<Binding>) -> Result<Vec<Binding>> {
        let mut next = Vec::new();

        for binding in current {
            let args: Fields = query
                .args
                .iter()
                .map(|(field, value)| Ok((field.clone(), resolve(value, &binding)?)))
                .collect::<Result<_>>()?;

            let rows = self
                .source
                .query(&query.concept, &query.relation, &args)
                .map_err(|e| match e.kind {
                    ErrorKind::QueryFailed { .. }
                    | ErrorKind::Unreachable(_)
                    | ErrorKind::ConceptNotFound(_) => e,
                    _ => Error::query_failed(&query.concept, &query.relation, e.to_string()),
                })?;

            'rows: for row in rows {
                let mut child = binding.clone();
                for (field, var) in &query.bindings {
                    let value = row.get(field.as_str()).cloned().unwrap_or(Value::Nil);
                    match child.get(var) {
                        // Natural join: a row must agree with what is already bound.
                        Some(bound) if *bound != value => continue 'rows,
                        Some(_) => {}
                        None => child.set(var.clone(), value),
                    }
                }
                next.push(child);
                if next.len() > self.max_fan_out {
                    return Err(Error::limit_exceeded(SemanticLimit::MaxFanOut {
                        limit: self.max_fan_out,
                        rule: Some(rule.to_string()),
                    }));
                }
            }
        }

        Ok(next)
    }
}
