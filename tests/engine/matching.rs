//! Integration tests for trigger pattern matching

use cadence_engine::{FieldMatch, PatternMatcher, TriggerPattern, match_pattern};
use cadence_foundation::{Fields, FlowId, Value, fields};
use cadence_log::Completion;

fn register(flow: &str, user: &str) -> Completion {
    Completion::new("User", "register", FlowId::new(flow))
        .with_input(fields([("name", Value::from(user))]))
        .with_output(fields([("user", Value::from(user))]))
}

// =============================================================================
// Single Patterns
// =============================================================================

#[test]
fn literal_must_equal() {
    let c = register("f", "ann");
    let hit = TriggerPattern::new("User", "register").input("name", FieldMatch::lit("ann"));
    let miss = TriggerPattern::new("User", "register").input("name", FieldMatch::lit("bob"));
    assert!(match_pattern(&hit, &c, &Fields::new()).is_some());
    assert!(match_pattern(&miss, &c, &Fields::new()).is_none());
}

#[test]
fn variable_captures_value() {
    let c = register("f", "ann");
    let p = TriggerPattern::new("User", "register").output("user", FieldMatch::var("u"));
    let values = match_pattern(&p, &c, &Fields::new()).unwrap();
    assert_eq!(values.get("u"), Some(&Value::from("ann")));
}

#[test]
fn wildcard_always_matches_and_binds_nothing() {
    let c = register("f", "ann");
    let present = TriggerPattern::new("User", "register").output("user", FieldMatch::Wildcard);
    let absent = TriggerPattern::new("User", "register").output("email", FieldMatch::Wildcard);
    assert!(match_pattern(&present, &c, &Fields::new()).unwrap().is_empty());
    assert!(match_pattern(&absent, &c, &Fields::new()).unwrap().is_empty());
}

#[test]
fn missing_field_fails_literal_and_variable() {
    let c = register("f", "ann");
    let lit = TriggerPattern::new("User", "register").output("email", FieldMatch::lit(Value::Nil));
    let var = TriggerPattern::new("User", "register").output("email", FieldMatch::var("e"));
    assert!(match_pattern(&lit, &c, &Fields::new()).is_none());
    assert!(match_pattern(&var, &c, &Fields::new()).is_none());
}

#[test]
fn repeated_variable_must_agree() {
    let p = TriggerPattern::new("User", "register")
        .input("name", FieldMatch::var("x"))
        .output("user", FieldMatch::var("x"));
    assert!(match_pattern(&p, &register("f", "ann"), &Fields::new()).is_some());

    let mismatched = Completion::new("User", "register", FlowId::new("f"))
        .with_input(fields([("name", Value::from("ann"))]))
        .with_output(fields([("user", Value::from("bob"))]));
    assert!(match_pattern(&p, &mismatched, &Fields::new()).is_none());
}

#[test]
fn variant_is_constrained_only_when_given() {
    let failed = register("f", "ann").with_variant("error");
    let any = TriggerPattern::new("User", "register");
    let ok_only = TriggerPattern::new("User", "register").with_variant("ok");
    let errors = TriggerPattern::new("User", "register").with_variant("error");
    assert!(match_pattern(&any, &failed, &Fields::new()).is_some());
    assert!(match_pattern(&ok_only, &failed, &Fields::new()).is_none());
    assert!(match_pattern(&errors, &failed, &Fields::new()).is_some());
}

#[test]
fn concept_and_action_must_match() {
    let c = register("f", "ann");
    assert!(match_pattern(&TriggerPattern::new("User", "login"), &c, &Fields::new()).is_none());
    assert!(match_pattern(&TriggerPattern::new("Admin", "register"), &c, &Fields::new()).is_none());
}

// =============================================================================
// Multi-pattern Joins
// =============================================================================

fn join_patterns() -> Vec<TriggerPattern> {
    vec![
        TriggerPattern::new("User", "register").output("user", FieldMatch::var("u")),
        TriggerPattern::new("Cart", "checkout").input("user", FieldMatch::var("u")),
    ]
}

fn checkout(flow: &str, user: &str) -> Completion {
    Completion::new("Cart", "checkout", FlowId::new(flow))
        .with_input(fields([("user", Value::from(user))]))
}

#[test]
fn join_binds_shared_variable_across_completions() {
    let reg = register("f", "ann");
    let out = checkout("f", "ann");
    let history = vec![reg.clone(), out.clone()];

    let bindings = PatternMatcher::match_rule(&join_patterns(), &out, &history);
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].get("u"), Some(&Value::from("ann")));
    let mut matched = bindings[0].matched().to_vec();
    matched.sort();
    let mut expected = vec![reg.id, out.id];
    expected.sort();
    assert_eq!(matched, expected);
}

#[test]
fn join_disagreement_yields_nothing() {
    let out = checkout("f", "bob");
    let history = vec![register("f", "ann"), out.clone()];
    assert!(PatternMatcher::match_rule(&join_patterns(), &out, &history).is_empty());
}

#[test]
fn join_never_crosses_flows() {
    let out = checkout("f", "ann");
    let history = vec![register("g", "ann"), out.clone()];
    assert!(PatternMatcher::match_rule(&join_patterns(), &out, &history).is_empty());
}

#[test]
fn trigger_must_take_part_in_the_match() {
    let reg = register("f", "ann");
    let out = checkout("f", "ann");
    let unrelated = Completion::new("Log", "write", FlowId::new("f"));
    let history = vec![reg, out, unrelated.clone()];
    assert!(PatternMatcher::match_rule(&join_patterns(), &unrelated, &history).is_empty());
}

#[test]
fn each_distinct_completion_set_is_one_binding() {
    let out = checkout("f", "ann");
    let history = vec![register("f", "ann"), register("f", "ann"), out.clone()];
    assert_eq!(
        PatternMatcher::match_rule(&join_patterns(), &out, &history).len(),
        2
    );
}
