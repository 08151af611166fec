//! Rule compiler - validates rule IR and precomputes what the engine needs.
//!
//! Malformed rules are rejected here, before they are indexed, so that
//! evaluation never meets a variable nothing could have bound.

use std::collections::BTreeSet;

use cadence_foundation::{Error, Result};

use super::{Clause, Rule, TriggerPattern};

// =============================================================================
// Compiled Rule
// =============================================================================

/// A validated rule ready for indexing.
#[derive(Clone, Debug)]
pub struct CompiledRule {
    rule: Rule,
    target_concepts: Vec<String>,
    referenced_concepts: Vec<String>,
}

impl CompiledRule {
    /// The rule IR.
    #[must_use]
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// The rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.rule.name
    }

    /// The trigger patterns.
    #[must_use]
    pub fn patterns(&self) -> &[TriggerPattern] {
        &self.rule.patterns
    }

    /// Distinct concepts the rule invokes, sorted.
    #[must_use]
    pub fn target_concepts(&self) -> &[String] {
        &self.target_concepts
    }

    /// Distinct concepts the rule invokes or queries, sorted.
    #[must_use]
    pub fn referenced_concepts(&self) -> &[String] {
        &self.referenced_concepts
    }

    /// Returns true if the rule invokes or queries this concept.
    #[must_use]
    pub fn references(&self, concept: &str) -> bool {
        self.referenced_concepts.iter().any(|c| c == concept)
    }
}

// =============================================================================
// Rule Compiler
// =============================================================================

/// Validates rules.
pub struct RuleCompiler;

impl RuleCompiler {
    /// Validate a rule and compile it.
    ///
    /// Checks, in order:
    /// - the name, every pattern, and every target are non-empty
    /// - there is at least one pattern and one target
    /// - every clause reads only variables bound by patterns or earlier clauses
    /// - bind clauses never rebind a variable
    /// - every target field reads only bound variables
    ///
    /// # Errors
    /// Returns `InvalidRule` or `UnknownVariable` describing the first problem.
    pub fn compile(rule: Rule) -> Result<CompiledRule> {
        let name = rule.name.clone();
        if name.trim().is_empty() {
            return Err(Error::invalid_rule(name, "rule name is empty"));
        }
        if rule.patterns.is_empty() {
            return Err(Error::invalid_rule(name, "rule has no trigger patterns"));
        }
        if rule.targets.is_empty() {
            return Err(Error::invalid_rule(name, "rule has no target actions"));
        }

        let mut scope: BTreeSet<&str> = BTreeSet::new();
        for pattern in &rule.patterns {
            if pattern.concept.is_empty() || pattern.action.is_empty() {
                return Err(Error::invalid_rule(
                    name,
                    "trigger pattern needs a concept and an action",
                ));
            }
            scope.extend(pattern.variables());
        }

        for clause in &rule.clauses {
            match clause {
                Clause::Bind { var, expr } => {
                    Self::check_read(&name, &scope, expr.variables())?;
                    if !scope.insert(var.as_str()) {
                        return Err(Error::invalid_rule(
                            name,
                            format!("bind clause rebinds ?{var}"),
                        ));
                    }
                }
                Clause::Query(query) => {
                    if query.concept.is_empty() || query.relation.is_empty() {
                        return Err(Error::invalid_rule(
                            name,
                            "query clause needs a concept and a relation",
                        ));
                    }
                    Self::check_read(
                        &name,
                        &scope,
                        query.args.iter().filter_map(|(_, v)| v.variable()),
                    )?;
                    // Mapping onto an already-bound variable is a join, not a rebind.
                    scope.extend(query.bindings.iter().map(|(_, var)| var.as_str()));
                }
                Clause::Filter(expr) => {
                    Self::check_read(&name, &scope, expr.variables())?;
                }
            }
        }

        for target in &rule.targets {
            if target.concept.is_empty() || target.action.is_empty() {
                return Err(Error::invalid_rule(
                    name,
                    "target action needs a concept and an action",
                ));
            }
            Self::check_read(
                &name,
                &scope,
                target.fields.iter().filter_map(|(_, v)| v.variable()),
            )?;
        }

        let target_concepts: BTreeSet<String> =
            rule.targets.iter().map(|t| t.concept.clone()).collect();
        let mut referenced = target_concepts.clone();
        for clause in &rule.clauses {
            if let Clause::Query(query) = clause {
                referenced.insert(query.concept.clone());
            }
        }

        Ok(CompiledRule {
            rule,
            target_concepts: target_concepts.into_iter().collect(),
            referenced_concepts: referenced.into_iter().collect(),
        })
    }

    fn check_read<'a>(
        rule: &str,
        scope: &BTreeSet<&str>,
        reads: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        for var in reads {
            if !scope.contains(var) {
                return Err(Error::unknown_variable(rule, var));
            }
        }
        Ok(())
    }
}
