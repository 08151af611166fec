//! Integration tests for rule registration and validation

use std::sync::Arc;

use cadence_engine::{
    ConceptRegistry, Expr, FieldMatch, Query, Rule, RuleCompiler, SyncEngine, TargetAction,
    TriggerPattern, ValueRef,
};
use cadence_foundation::ErrorKind;

fn welcome() -> Rule {
    Rule::new("welcome")
        .when(TriggerPattern::new("User", "register").output("user", FieldMatch::var("u")))
        .then(TargetAction::new("Email", "send").field("to", ValueRef::var("u")))
}

fn kind(rule: Rule) -> ErrorKind {
    RuleCompiler::compile(rule).unwrap_err().kind
}

#[test]
fn well_formed_rule_compiles() {
    let compiled = RuleCompiler::compile(welcome()).unwrap();
    assert_eq!(compiled.name(), "welcome");
    assert_eq!(compiled.target_concepts(), &["Email".to_string()]);
    assert!(compiled.references("Email"));
    assert!(!compiled.references("User"));
}

#[test]
fn empty_when_or_then_is_invalid() {
    let no_when = Rule::new("r").then(TargetAction::new("Email", "send"));
    let no_then = Rule::new("r").when(TriggerPattern::new("User", "register"));
    assert!(matches!(kind(no_when), ErrorKind::InvalidRule { .. }));
    assert!(matches!(kind(no_then), ErrorKind::InvalidRule { .. }));
}

#[test]
fn target_reading_unbound_variable_is_rejected() {
    let rule = Rule::new("r")
        .when(TriggerPattern::new("User", "register"))
        .then(TargetAction::new("Email", "send").field("to", ValueRef::var("u")));
    assert!(matches!(
        kind(rule),
        ErrorKind::UnknownVariable { ref variable, .. } if variable == "u"
    ));
}

#[test]
fn clauses_only_see_earlier_bindings() {
    let filter_first = Rule::new("r")
        .when(TriggerPattern::new("User", "register"))
        .filter(Expr::var("plan"))
        .query(Query::new("Billing", "plans").bind("name", "plan"))
        .then(TargetAction::new("Email", "send"));
    assert!(matches!(kind(filter_first), ErrorKind::UnknownVariable { .. }));

    let query_first = Rule::new("r")
        .when(TriggerPattern::new("User", "register"))
        .query(Query::new("Billing", "plans").bind("name", "plan"))
        .filter(Expr::var("plan"))
        .then(TargetAction::new("Email", "send").field("plan", ValueRef::var("plan")));
    let compiled = RuleCompiler::compile(query_first).unwrap();
    assert!(compiled.references("Billing"));
    assert!(!compiled.target_concepts().contains(&"Billing".to_string()));
}

#[test]
fn query_arguments_must_be_bound() {
    let rule = Rule::new("r")
        .when(TriggerPattern::new("User", "register"))
        .query(Query::new("Billing", "plans").arg("owner", ValueRef::var("u")))
        .then(TargetAction::new("Email", "send"));
    assert!(matches!(kind(rule), ErrorKind::UnknownVariable { .. }));
}

#[test]
fn bind_cannot_shadow() {
    let rule = Rule::new("r")
        .when(TriggerPattern::new("User", "register").output("user", FieldMatch::var("u")))
        .bind("u", Expr::lit("other"))
        .then(TargetAction::new("Email", "send"));
    assert!(matches!(kind(rule), ErrorKind::InvalidRule { .. }));
}

#[test]
fn duplicate_names_are_rejected_and_unregister_frees_them() {
    let engine = SyncEngine::new(Arc::new(ConceptRegistry::new()));
    engine.register(welcome()).unwrap();
    assert!(matches!(
        engine.register(welcome()).unwrap_err().kind,
        ErrorKind::DuplicateRule(ref name) if name == "welcome"
    ));

    engine.unregister("welcome").unwrap();
    assert!(engine.rules().unwrap().is_empty());
    assert!(engine.rule("welcome").unwrap().is_none());
    engine.register(welcome()).unwrap();

    assert!(matches!(
        engine.unregister("missing").unwrap_err().kind,
        ErrorKind::RuleNotFound(_)
    ));
}
