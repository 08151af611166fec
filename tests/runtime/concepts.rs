//! Integration tests for in-process concepts

use std::sync::Arc;

use cadence_engine::{ConceptTransport, Health};
use cadence_foundation::{Error, ErrorKind, Fields, FlowId, Value, fields};
use cadence_log::Invocation;
use cadence_runtime::{ActionResult, ERROR_VARIANT, LocalConcept};
use cadence_storage::{ConceptStorage, ConflictResolution, MemoryStorage, WriteOutcome};

fn counter() -> LocalConcept {
    LocalConcept::new("Counter", Arc::new(MemoryStorage::new()))
        .with_action("set", |ctx| {
            let key = ctx.input().get("key").and_then(Value::as_str).unwrap_or("c");
            ctx.put("counts", key, ctx.input().clone())?;
            Ok(ActionResult::ok(fields([("key", Value::from(key))])))
        })
        .with_action("fail", |_| Err(Error::evaluation("counter jammed")))
}

fn invoke(concept: &LocalConcept, action: &str, key: &str) -> cadence_log::Completion {
    concept
        .invoke(&Invocation::new(
            "Counter",
            action,
            fields([("key", Value::from(key)), ("n", Value::Int(1))]),
            FlowId::new("f"),
        ))
        .unwrap()
}

#[test]
fn action_writes_through_storage() {
    let concept = counter();
    let c = invoke(&concept, "set", "a");
    assert_eq!(c.variant, "ok");
    assert_eq!(c.output.get("key"), Some(&Value::from("a")));

    let rows = concept.query("counts", None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("n"), Some(&Value::Int(1)));
}

#[test]
fn query_filters_rows() {
    let concept = counter();
    invoke(&concept, "set", "a");
    invoke(&concept, "set", "b");

    let filter = fields([("key", Value::from("b"))]);
    let rows = concept.query("counts", Some(&filter)).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn handler_error_is_reported_as_variant() {
    let c = invoke(&counter(), "fail", "a");
    assert_eq!(c.variant, ERROR_VARIANT);
    assert!(
        c.output
            .get("message")
            .and_then(Value::as_str)
            .is_some_and(|m| m.contains("counter jammed"))
    );
}

#[test]
fn unknown_action_is_a_transport_error() {
    let concept = counter();
    let err = concept
        .invoke(&Invocation::new(
            "Counter",
            "explode",
            fields([("key", Value::from("a"))]),
            FlowId::new("f"),
        ))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Transport { .. }));
}

#[test]
fn down_concept_refuses_work() {
    let concept = counter();
    concept.set_available(false);
    assert_eq!(concept.health(), Health::down());
    assert!(concept.query("counts", None).is_err());
    assert!(
        concept
            .invoke(&Invocation::new("Counter", "set", Fields::new(), FlowId::new("f")))
            .is_err()
    );

    concept.set_available(true);
    assert_eq!(concept.health(), Health::up());
}

#[test]
fn escalated_writes_are_collected_once() {
    let storage = Arc::new(
        MemoryStorage::new().with_conflict_handler(|_| ConflictResolution::Escalate),
    );
    storage
        .put("counts", "a", fields([("n", Value::Int(0))]))
        .unwrap();
    let concept = LocalConcept::new("Counter", storage.clone()).with_action("set", |ctx| {
        let outcome = ctx.put("counts", "a", ctx.input().clone())?;
        let variant = if matches!(outcome, WriteOutcome::Escalated(_)) {
            "held"
        } else {
            "ok"
        };
        Ok(ActionResult::variant(variant, Fields::new()))
    });

    let c = invoke(&concept, "set", "a");
    assert_eq!(c.variant, "held");

    let conflicts = concept.take_conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].existing.get("n"), Some(&Value::Int(0)));
    assert!(concept.take_conflicts().is_empty());
    assert_eq!(
        storage.get("counts", "a").unwrap(),
        Some(fields([("n", Value::Int(0))]))
    );
}
