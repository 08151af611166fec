//! Integration tests for engine snapshots

use std::sync::Arc;

use cadence_engine::{
    AnnotatedEngine, Annotation, ConceptRegistry, EngineConfig, FieldMatch, Rule, TargetAction,
    TriggerPattern, ValueRef,
};
use cadence_foundation::{Fields, FlowId, Value, fields};
use cadence_log::Completion;
use cadence_runtime::{ActionResult, LocalConcept, load_engine, save_engine};
use cadence_storage::MemoryStorage;
use tempfile::tempdir;

fn rules() -> [Rule; 2] {
    [
        Rule::new("ship")
            .annotate(Annotation::Deferred)
            .when(TriggerPattern::new("Order", "place").output("order", FieldMatch::var("o")))
            .then(TargetAction::new("Shipping", "ship").field("order", ValueRef::var("o"))),
        Rule::new("receipt")
            .annotate(Annotation::LocalOnly)
            .when(TriggerPattern::new("Order", "place"))
            .then(TargetAction::new("Mail", "receipt")),
    ]
}

fn shipping() -> Arc<LocalConcept> {
    Arc::new(
        LocalConcept::new("Shipping", Arc::new(MemoryStorage::new()))
            .with_action("ship", |_| Ok(ActionResult::ok(Fields::new()))),
    )
}

fn place() -> Completion {
    Completion::new("Order", "place", FlowId::new("f"))
        .with_output(fields([("order", Value::from("o-1"))]))
}

#[test]
fn reloaded_engine_keeps_guards_and_queue() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.msgpack");
    let trigger = place();

    {
        let engine = AnnotatedEngine::new(Arc::new(ConceptRegistry::new()));
        for rule in rules() {
            engine.register(rule).unwrap();
        }
        let outcome = engine.on_completion(trigger.clone(), None).unwrap();
        assert_eq!(outcome.invocations.len(), 1);
        assert_eq!(outcome.deferred.len(), 1);
        save_engine(&engine, &path).unwrap();
    }

    let engine = load_engine(
        Arc::new(ConceptRegistry::new()),
        EngineConfig::default(),
        &path,
    )
    .unwrap();
    for rule in rules() {
        engine.register(rule).unwrap();
    }
    assert_eq!(engine.log().len().unwrap(), 2);
    assert_eq!(engine.pending_count().unwrap(), 1);

    // The receipt already fired before the snapshot.
    let replay = engine.on_completion(trigger, None).unwrap();
    assert!(!replay.appended.is_new());
    assert!(replay.invocations.is_empty());
    assert!(replay.deferred.is_empty());

    let report = engine.register_concept("Shipping", shipping()).unwrap();
    assert_eq!(report.invocations.len(), 1);
    assert_eq!(engine.pending_count().unwrap(), 0);
}

#[test]
fn loading_without_rules_reports_queued_work() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.msgpack");
    let engine = AnnotatedEngine::new(Arc::new(ConceptRegistry::new()));
    for rule in rules() {
        engine.register(rule).unwrap();
    }
    engine.on_completion(place(), None).unwrap();
    save_engine(&engine, &path).unwrap();

    let restored = load_engine(
        Arc::new(ConceptRegistry::new()),
        EngineConfig::default(),
        &path,
    )
    .unwrap();
    let report = restored.register_concept("Shipping", shipping()).unwrap();
    assert!(report.fired.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].rule, "ship");
}
