//! Integration tests for errors
//!
//! Tests error construction, display, context, and classification.

use cadence_foundation::{Error, ErrorContext, ErrorKind, RecordId, SemanticLimit};

#[test]
fn constructors_pick_the_right_kind() {
    assert!(matches!(
        Error::unknown_variable("welcome", "u").kind,
        ErrorKind::UnknownVariable { .. }
    ));
    assert!(matches!(
        Error::unresolved_variable("welcome", "u").kind,
        ErrorKind::UnresolvedVariable { .. }
    ));
    assert!(matches!(
        Error::record_not_found(RecordId::new(7)).kind,
        ErrorKind::RecordNotFound(id) if id == RecordId::new(7)
    ));
}

#[test]
fn display_names_the_subject() {
    assert_eq!(
        Error::unknown_variable("welcome", "u").to_string(),
        "rule welcome references unknown variable ?u"
    );
    assert_eq!(
        Error::unreachable(vec!["Email".to_string(), "Sms".to_string()]).to_string(),
        "unreachable concepts: Email, Sms"
    );
    assert_eq!(
        Error::query_failed("User", "users", "timeout").to_string(),
        "query User/users failed: timeout"
    );
}

#[test]
fn limits_render_their_scope() {
    let err = Error::limit_exceeded(SemanticLimit::MaxFlowIterations {
        limit: 10,
        flow: Some("f-1".to_string()),
    });
    assert_eq!(
        err.to_string(),
        "limit exceeded: max flow iterations (10) exceeded in f-1"
    );

    let err = Error::limit_exceeded(SemanticLimit::MaxFanOut {
        limit: 3,
        rule: None,
    });
    assert_eq!(err.to_string(), "limit exceeded: max fan-out (3) exceeded");
}

#[test]
fn context_is_attached_and_rendered() {
    let err = Error::evaluation("division by zero").with_context(
        ErrorContext::new()
            .with_rule("split")
            .with_flow("f-1")
            .with_frame("bind ?share"),
    );
    let context = err.context.as_ref().unwrap();
    assert_eq!(context.rule.as_deref(), Some("split"));
    assert_eq!(
        context.to_string(),
        "in rule split (flow f-1)\n  in bind ?share"
    );
}

#[test]
fn availability_errors_are_classified() {
    assert!(Error::unreachable(vec!["Email".to_string()]).is_availability());
    assert!(Error::concept_not_found("Email").is_availability());
    assert!(!Error::transport("Email", "boom").is_availability());
    assert!(!Error::evaluation("boom").is_availability());
}
