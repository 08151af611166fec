//! Integration tests for engine hierarchies

use std::sync::Arc;

use cadence_engine::{
    AnnotatedEngine, Annotation, ConceptRegistry, EngineConfig, Rule, TargetAction,
    TriggerPattern,
};
use cadence_foundation::FlowId;
use cadence_log::Completion;
use cadence_runtime::{ActionResult, EngineLink, FlowDriver, LocalConcept};
use cadence_storage::MemoryStorage;

fn upstream() -> Arc<AnnotatedEngine> {
    let engine = Arc::new(AnnotatedEngine::new(Arc::new(ConceptRegistry::new())));
    engine
        .register(
            Rule::new("audit")
                .annotate(Annotation::LocalOnly)
                .when(TriggerPattern::new("Cart", "checkout"))
                .then(TargetAction::new("Audit", "record")),
        )
        .unwrap();
    engine
}

fn downstream(config: EngineConfig) -> Arc<AnnotatedEngine> {
    let engine = Arc::new(AnnotatedEngine::with_config(
        Arc::new(ConceptRegistry::new()),
        config,
    ));
    engine
        .register_concept(
            "Cart",
            Arc::new(
                LocalConcept::new("Cart", Arc::new(MemoryStorage::new()))
                    .with_action("checkout", |ctx| Ok(ActionResult::ok(ctx.input().clone()))),
            ),
        )
        .unwrap();
    engine
        .register(
            Rule::new("checkout")
                .when(TriggerPattern::new("Cart", "submit"))
                .then(TargetAction::new("Cart", "checkout")),
        )
        .unwrap();
    engine
}

fn submit(flow: &str) -> Completion {
    Completion::new("Cart", "submit", FlowId::new(flow))
}

#[test]
fn driven_flow_reaches_upstream_rules() {
    let parent = upstream();
    let child = downstream(EngineConfig::default());
    let link = Arc::new(EngineLink::new(Arc::clone(&parent)));
    child.set_upstream(link.clone()).unwrap();

    FlowDriver::new(Arc::clone(&child)).run(submit("f")).unwrap();

    // Both child completions reach the parent; only checkout triggers audit.
    assert_eq!(parent.log().len().unwrap(), 3);
    let produced = link.take_invocations().unwrap();
    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].concept, "Audit");
    assert_eq!(produced[0].flow, FlowId::new("f"));
}

#[test]
fn partition_is_replayed_in_order() {
    let parent = upstream();
    let child = downstream(EngineConfig::default());
    let link = Arc::new(EngineLink::new(Arc::clone(&parent)));
    link.set_connected(false);
    child.set_upstream(link.clone()).unwrap();

    let driver = FlowDriver::new(Arc::clone(&child));
    driver.run(submit("f")).unwrap();
    driver.run(submit("g")).unwrap();
    assert_eq!(child.outbox_len().unwrap(), 4);
    assert!(parent.log().is_empty().unwrap());

    link.set_connected(true);
    assert_eq!(child.flush_outbox().unwrap(), 4);
    assert_eq!(child.outbox_len().unwrap(), 0);

    let flows: Vec<_> = link
        .take_invocations()
        .unwrap()
        .into_iter()
        .map(|inv| inv.flow)
        .collect();
    assert_eq!(flows, [FlowId::new("f"), FlowId::new("g")]);
}

#[test]
fn full_outbox_drops_the_oldest() {
    let parent = upstream();
    let child = downstream(EngineConfig::default().with_outbox_limit(2));
    let link = Arc::new(EngineLink::new(Arc::clone(&parent)));
    link.set_connected(false);
    child.set_upstream(link.clone()).unwrap();

    let first = submit("f");
    let second = submit("g");
    let third = submit("h");
    for c in [&first, &second, &third] {
        child.on_completion(c.clone(), None).unwrap();
    }
    assert_eq!(child.outbox_len().unwrap(), 2);
    assert_eq!(child.outbox_dropped().unwrap(), 1);

    link.set_connected(true);
    child.flush_outbox().unwrap();
    assert!(!parent.log().contains(first.id).unwrap());
    assert!(parent.log().contains(second.id).unwrap());
    assert!(parent.log().contains(third.id).unwrap());
}

#[test]
fn no_upstream_means_no_outbox() {
    let child = downstream(EngineConfig::default());
    child.on_completion(submit("f"), None).unwrap();
    assert_eq!(child.outbox_len().unwrap(), 0);
    assert_eq!(child.outbox_dropped().unwrap(), 0);
}
