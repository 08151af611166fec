//! Invocation building.
//!
//! Turns evaluated bindings into invocations, one per (binding, target).

use cadence_foundation::{Error, Fields, FlowId, Result};
use cadence_log::Invocation;

use crate::pattern::Binding;
use crate::rule::{Rule, ValueRef};

/// Builds the invocations of a rule firing.
pub struct InvocationBuilder;

impl InvocationBuilder {
    /// Builds one invocation per target action of `rule` for one binding.
    ///
    /// Every invocation carries `flow` and the rule's name.
    ///
    /// # Errors
    /// Returns `UnresolvedVariable` if a target field reads a variable the
    /// binding does not hold. Nothing is defaulted.
    pub fn build(rule: &Rule, binding: &Binding, flow: &FlowId) -> Result<Vec<Invocation>> {
        rule.targets
            .iter()
            .map(|target| {
                let mut input = Fields::new();
                for (name, value) in &target.fields {
                    let value = match value {
                        ValueRef::Literal(v) => v.clone(),
                        ValueRef::Var(var) => binding
                            .get(var)
                            .cloned()
                            .ok_or_else(|| Error::unresolved_variable(&rule.name, var))?,
                    };
                    input.set(name.clone(), value);
                }
                Ok(
                    Invocation::new(&target.concept, &target.action, input, flow.clone())
                        .with_rule(&rule.name),
                )
            })
            .collect()
    }

    /// Builds invocations for every binding, in binding order.
    ///
    /// # Errors
    /// Fails on the first unresolved variable.
    pub fn build_all(rule: &Rule, bindings: &[Binding], flow: &FlowId) -> Result<Vec<Invocation>> {
        let mut out = Vec::with_capacity(bindings.len() * rule.targets.len());
        for binding in bindings {
            out.extend(Self::build(rule, binding, flow)?);
        }
        Ok(out)
    }
}
