//! Integration tests for the action log

use std::sync::Arc;
use std::thread;

use cadence_foundation::{ErrorKind, Fields, FlowId, RecordId, Timestamp, Value, fields};
use cadence_log::{ActionLog, AppendOutcome, Completion, GuardKey, Invocation};

// =============================================================================
// Appending
// =============================================================================

#[test]
fn redelivery_is_idempotent() {
    let log = ActionLog::new();
    let c = Completion::new("User", "register", FlowId::new("f"))
        .with_output(fields([("user", Value::from("ann"))]));

    assert_eq!(
        log.append_completion(c.clone(), None).unwrap(),
        AppendOutcome::Appended
    );
    assert_eq!(
        log.append_completion(c, None).unwrap(),
        AppendOutcome::AlreadyPresent
    );
    assert_eq!(log.len().unwrap(), 1);
}

#[test]
fn reused_id_with_different_payload_is_rejected() {
    let log = ActionLog::new();
    let c = Completion::new("User", "register", FlowId::new("f"));
    log.append_completion(c.clone(), None).unwrap();

    let forged = c.with_variant("error");
    let err = log.append_completion(forged, None).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateRecord(_)));
}

#[test]
fn parent_must_exist_in_the_same_flow() {
    let log = ActionLog::new();
    let root = Completion::new("User", "register", FlowId::new("f"));
    log.append_completion(root.clone(), None).unwrap();

    let stranger = Invocation::new("Email", "send", Fields::new(), FlowId::new("g"));
    let err = log.append_invocation(stranger, Some(root.id)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::CrossFlowParent { .. }));

    let orphan = Invocation::new("Email", "send", Fields::new(), FlowId::new("f"));
    let err = log
        .append_invocation(orphan, Some(cadence_foundation::RecordId::new(99)))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RecordNotFound(_)));
}

#[test]
fn completions_inherit_the_rule_of_their_invocation() {
    let log = ActionLog::new();
    let flow = FlowId::new("f");
    let inv = Invocation::new("Email", "send", Fields::new(), flow).with_rule("welcome");
    let done = inv.complete("ok", Fields::new());
    log.append_invocation(inv.clone(), None).unwrap();
    log.append_completion(done.clone(), Some(inv.id)).unwrap();

    let record = log.get(done.id).unwrap().unwrap();
    assert_eq!(record.rule.as_deref(), Some("welcome"));
    assert_eq!(record.parent, Some(inv.id));
}

// =============================================================================
// Flows
// =============================================================================

#[test]
fn flows_are_partitioned() {
    let log = ActionLog::new();
    for flow in ["a", "b", "a"] {
        log.append_completion(Completion::new("X", "y", FlowId::new(flow)), None)
            .unwrap();
    }
    assert_eq!(log.completions(&FlowId::new("a")).unwrap().len(), 2);
    assert_eq!(log.completions(&FlowId::new("b")).unwrap().len(), 1);
    assert!(log.completions(&FlowId::new("c")).unwrap().is_empty());
    assert_eq!(log.flows().unwrap().len(), 2);
}

#[test]
fn records_keep_append_order() {
    let log = ActionLog::new();
    let flow = FlowId::new("f");
    let ids: Vec<_> = (0..5)
        .map(|i| {
            let c = Completion::new("Counter", "tick", flow.clone())
                .with_output(fields([("n", Value::Int(i))]));
            let id = c.id;
            log.append_completion(c, None).unwrap();
            id
        })
        .collect();

    let logged: Vec<_> = log
        .records(&flow)
        .unwrap()
        .iter()
        .map(cadence_log::ActionRecord::id)
        .collect();
    assert_eq!(logged, ids);
}

#[test]
fn concurrent_flows_append_independently() {
    let log = Arc::new(ActionLog::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                let flow = FlowId::new(format!("flow-{t}"));
                for _ in 0..25 {
                    log.append_completion(Completion::new("X", "y", flow.clone()), None)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(log.len().unwrap(), 100);
    for t in 0..4 {
        let flow = FlowId::new(format!("flow-{t}"));
        assert_eq!(log.completions(&flow).unwrap().len(), 25);
    }
}

#[test]
fn restamped_redelivery_is_idempotent() {
    let log = ActionLog::new();
    let first = Completion::new("User", "register", FlowId::new("f"))
        .with_id(RecordId::new(7))
        .with_output(fields([("user", Value::from("ann"))]))
        .with_timestamp(Timestamp::from_millis(100));
    let resent = first.clone().with_timestamp(Timestamp::from_millis(103));

    log.append_completion(first.clone(), None).unwrap();
    assert_eq!(
        log.append_completion(resent, None).unwrap(),
        AppendOutcome::AlreadyPresent
    );
    // The first copy is the one kept.
    let kept = log.get(first.id).unwrap().unwrap();
    assert_eq!(kept.as_completion().unwrap().timestamp, first.timestamp);
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn snapshot_restores_records_and_edges() {
    let log = ActionLog::new();
    let root = Completion::new("User", "register", FlowId::new("f"));
    let inv = Invocation::new("Email", "send", Fields::new(), FlowId::new("f"));
    log.append_completion(root.clone(), None).unwrap();
    log.record_firing(GuardKey::new("welcome", [root.id]), &[inv.clone()], root.id)
        .unwrap();

    let restored = ActionLog::from_snapshot(log.snapshot().unwrap()).unwrap();
    assert_eq!(restored.len().unwrap(), 2);
    assert!(restored.contains(inv.id).unwrap());
    assert!(restored.has_edge(&GuardKey::new("welcome", [root.id])).unwrap());
    assert_eq!(restored.snapshot().unwrap(), log.snapshot().unwrap());
}
