//! Integration tests for the sync engine

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cadence_engine::{
    ConceptRegistry, FieldMatch, Query, Rule, SyncEngine, TargetAction, TriggerPattern, ValueRef,
};
use cadence_foundation::{ErrorKind, FlowId, RecordId, Value, fields};
use cadence_log::{AppendOutcome, Completion};

fn engine() -> SyncEngine {
    let engine = SyncEngine::new(Arc::new(ConceptRegistry::new()));
    engine
        .register(
            Rule::new("welcome")
                .when(
                    TriggerPattern::new("User", "register").output("user", FieldMatch::var("u")),
                )
                .then(TargetAction::new("Email", "send").field("to", ValueRef::var("u")))
                .then(TargetAction::new("Profile", "create").field("owner", ValueRef::var("u"))),
        )
        .unwrap();
    engine
}

fn register(flow: &str, user: &str) -> Completion {
    Completion::new("User", "register", FlowId::new(flow))
        .with_output(fields([("user", Value::from(user))]))
}

#[test]
fn one_invocation_per_target_in_declaration_order() {
    let engine = engine();
    let c = register("f", "ann");
    let outcome = engine.on_completion(c.clone(), None).unwrap();

    assert_eq!(outcome.appended, AppendOutcome::Appended);
    let targets: Vec<_> = outcome
        .invocations
        .iter()
        .map(|inv| (inv.concept.as_str(), inv.action.as_str()))
        .collect();
    assert_eq!(targets, vec![("Email", "send"), ("Profile", "create")]);
    for inv in &outcome.invocations {
        assert_eq!(inv.flow, c.flow);
        assert_eq!(inv.rule.as_deref(), Some("welcome"));
        let record = engine.log().get(inv.id).unwrap().unwrap();
        assert_eq!(record.parent, Some(c.id));
    }
}

#[test]
fn redelivered_completion_fires_nothing() {
    let engine = engine();
    let c = register("f", "ann");
    assert_eq!(engine.on_completion(c.clone(), None).unwrap().invocations.len(), 2);

    let again = engine.on_completion(c, None).unwrap();
    assert_eq!(again.appended, AppendOutcome::AlreadyPresent);
    assert!(again.invocations.is_empty());
    assert_eq!(engine.log().len().unwrap(), 3);
    assert_eq!(engine.log().edge_count().unwrap(), 1);
}

#[test]
fn rebuilt_redelivery_fires_nothing() {
    let engine = engine();
    let sent = register("f", "ann").with_id(RecordId::new(7));
    assert_eq!(engine.on_completion(sent, None).unwrap().invocations.len(), 2);

    thread::sleep(Duration::from_millis(3));
    let resent = register("f", "ann").with_id(RecordId::new(7));
    let again = engine.on_completion(resent, None).unwrap();
    assert_eq!(again.appended, AppendOutcome::AlreadyPresent);
    assert!(again.invocations.is_empty());
    assert_eq!(engine.log().len().unwrap(), 3);
}

#[test]
fn changed_payload_under_a_logged_id_is_rejected() {
    let engine = engine();
    engine
        .on_completion(register("f", "ann").with_id(RecordId::new(7)), None)
        .unwrap();

    let err = engine
        .on_completion(register("f", "bob").with_id(RecordId::new(7)), None)
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateRecord(_)));
}

#[test]
fn unmatched_completion_is_still_logged() {
    let engine = engine();
    let c = Completion::new("User", "login", FlowId::new("f"));
    let outcome = engine.on_completion(c.clone(), None).unwrap();
    assert!(outcome.invocations.is_empty());
    assert!(engine.log().contains(c.id).unwrap());
}

#[test]
fn evaluation_failure_releases_the_match_for_retry() {
    let engine = SyncEngine::new(Arc::new(ConceptRegistry::new()));
    engine
        .register(
            Rule::new("lookup")
                .when(TriggerPattern::new("User", "register"))
                .query(Query::new("Directory", "users").bind("id", "id"))
                .then(TargetAction::new("Email", "send").field("to", ValueRef::var("id"))),
        )
        .unwrap();

    let c = register("f", "ann");
    let first = engine.on_completion(c.clone(), None).unwrap();
    assert_eq!(first.failures.len(), 1);
    assert!(matches!(
        first.failures[0].error.kind,
        ErrorKind::ConceptNotFound(_)
    ));
    let context = first.failures[0].error.context.as_ref().unwrap();
    assert_eq!(context.rule.as_deref(), Some("lookup"));

    // No edge was written, so the same match is attempted again.
    let again = engine.on_completion(c, None).unwrap();
    assert_eq!(again.failures.len(), 1);
    assert_eq!(engine.log().edge_count().unwrap(), 0);
}

#[test]
fn concurrent_redelivery_fires_once() {
    let engine = Arc::new(engine());
    let c = register("f", "ann");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let c = c.clone();
            thread::spawn(move || engine.on_completion(c, None).unwrap().invocations.len())
        })
        .collect();
    let fired: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(fired, 2);
    assert_eq!(engine.log().edge_count().unwrap(), 1);
}

#[test]
fn unregistered_rule_stops_matching() {
    let engine = engine();
    engine.unregister("welcome").unwrap();
    let outcome = engine.on_completion(register("f", "ann"), None).unwrap();
    assert!(outcome.invocations.is_empty());
}
