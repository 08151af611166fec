//! End-to-end flows through concepts, rules, and the driver

use std::sync::Arc;

use cadence_engine::{
    AnnotatedEngine, ConceptRegistry, Expr, FieldMatch, Query, Rule, TargetAction,
    TriggerPattern, ValueRef,
};
use cadence_foundation::{FlowId, Value, fields};
use cadence_log::Completion;
use cadence_runtime::{ActionResult, FlowDriver, LocalConcept};
use cadence_storage::{ConceptStorage, MemoryStorage};

/// Profiles, a mailer, and the welcome rule that joins them.
pub fn signup() -> Arc<AnnotatedEngine> {
    let engine = Arc::new(AnnotatedEngine::new(Arc::new(ConceptRegistry::new())));

    let profiles = Arc::new(MemoryStorage::new());
    profiles
        .put(
            "profiles",
            "ann",
            fields([("id", Value::from("ann")), ("email", Value::from("ann@example.com"))]),
        )
        .unwrap();
    engine
        .register_concept("Profile", Arc::new(LocalConcept::new("Profile", profiles)))
        .unwrap();
    engine
        .register_concept(
            "Email",
            Arc::new(
                LocalConcept::new("Email", Arc::new(MemoryStorage::new())).with_action(
                    "send",
                    |ctx| {
                        let to = ctx.input().get("to").cloned().unwrap_or(Value::Nil);
                        ctx.put("outbox", &to.to_string(), ctx.input().clone())?;
                        Ok(ActionResult::ok(fields([("to", to)])))
                    },
                ),
            ),
        )
        .unwrap();

    engine
        .register(
            Rule::new("welcome")
                .when(TriggerPattern::new("User", "register").output("user", FieldMatch::var("u")))
                .query(
                    Query::new("Profile", "profiles")
                        .arg("id", ValueRef::var("u"))
                        .bind("email", "email"),
                )
                .bind(
                    "subject",
                    Expr::Concat(vec![Expr::lit("welcome, "), Expr::var("u")]),
                )
                .then(
                    TargetAction::new("Email", "send")
                        .field("to", ValueRef::var("email"))
                        .field("subject", ValueRef::var("subject")),
                ),
        )
        .unwrap();
    engine
}

pub fn register(flow: &str, user: &str) -> Completion {
    Completion::new("User", "register", FlowId::new(flow))
        .with_output(fields([("user", Value::from(user))]))
}

#[test]
fn registration_sends_welcome_mail() {
    let engine = signup();
    let report = FlowDriver::new(Arc::clone(&engine))
        .run(register("signup-1", "ann"))
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.invocations.len(), 1);
    let mail = &report.invocations[0];
    assert_eq!(mail.input.get("to"), Some(&Value::from("ann@example.com")));
    assert_eq!(mail.input.get("subject"), Some(&Value::from("welcome, ann")));
    assert_eq!(report.completions.len(), 2);
}

#[test]
fn unknown_profile_sends_nothing() {
    let engine = signup();
    let report = FlowDriver::new(engine)
        .run(register("signup-2", "bob"))
        .unwrap();

    assert!(report.is_clean());
    assert!(report.invocations.is_empty());
    assert_eq!(report.completions.len(), 1);
}

#[test]
fn variants_route_to_different_rules() {
    let engine = AnnotatedEngine::new(Arc::new(ConceptRegistry::new()));
    for (name, variant, target) in [("paid", "ok", "Ship"), ("declined", "declined", "Notify")] {
        engine
            .register(
                Rule::new(name)
                    .annotate(cadence_engine::Annotation::LocalOnly)
                    .when(TriggerPattern::new("Payment", "charge").with_variant(variant))
                    .then(TargetAction::new(target, "go")),
            )
            .unwrap();
    }

    let declined = Completion::new("Payment", "charge", FlowId::new("f")).with_variant("declined");
    let outcome = engine.on_completion(declined, None).unwrap();
    assert_eq!(outcome.invocations.len(), 1);
    assert_eq!(outcome.invocations[0].concept, "Notify");
}

#[test]
fn join_waits_for_both_sides_in_the_same_flow() {
    let engine = AnnotatedEngine::new(Arc::new(ConceptRegistry::new()));
    engine
        .register(
            Rule::new("confirm")
                .annotate(cadence_engine::Annotation::LocalOnly)
                .when(TriggerPattern::new("Cart", "add").output("item", FieldMatch::var("i")))
                .when(TriggerPattern::new("Stock", "reserve").output("item", FieldMatch::var("i")))
                .then(TargetAction::new("Order", "confirm").field("item", ValueRef::var("i"))),
        )
        .unwrap();

    let add = |flow: &str| {
        Completion::new("Cart", "add", FlowId::new(flow))
            .with_output(fields([("item", Value::from("sku-1"))]))
    };
    let reserve = |flow: &str| {
        Completion::new("Stock", "reserve", FlowId::new(flow))
            .with_output(fields([("item", Value::from("sku-1"))]))
    };

    assert!(engine.on_completion(add("f"), None).unwrap().invocations.is_empty());
    assert!(engine.on_completion(reserve("g"), None).unwrap().invocations.is_empty());

    let outcome = engine.on_completion(reserve("f"), None).unwrap();
    assert_eq!(outcome.invocations.len(), 1);
    assert_eq!(outcome.invocations[0].flow, FlowId::new("f"));
    assert_eq!(outcome.invocations[0].input.get("item"), Some(&Value::from("sku-1")));
}
