//! Causal traces of driven flows

use std::sync::Arc;

use cadence_debug::{FlowTrace, TreeFormatter};
use cadence_foundation::FlowId;
use cadence_runtime::FlowDriver;

use crate::scenarios::{register, signup};

#[test]
fn driven_flow_renders_as_a_tree() {
    let engine = signup();
    FlowDriver::new(Arc::clone(&engine))
        .run(register("signup-1", "ann"))
        .unwrap();

    let trace = FlowTrace::build(engine.log(), &FlowId::new("signup-1")).unwrap();
    assert_eq!(trace.len(), 3);
    assert_eq!(trace.depth(), 3);
    assert_eq!(
        trace.render(),
        "<- User/register ok\n  -> Email/send\n    <- Email/send ok"
    );

    let detailed = TreeFormatter::new().with_rules().format(&trace);
    assert_eq!(detailed.lines().nth(1), Some("  -> Email/send (via welcome)"));
}

#[test]
fn traces_stay_within_their_flow() {
    let engine = signup();
    let driver = FlowDriver::new(Arc::clone(&engine));
    driver.run(register("signup-1", "ann")).unwrap();
    driver.run(register("signup-2", "bob")).unwrap();

    let first = FlowTrace::build(engine.log(), &FlowId::new("signup-1")).unwrap();
    let second = FlowTrace::build(engine.log(), &FlowId::new("signup-2")).unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 1);
    assert!(second.roots()[0].children.is_empty());
}
