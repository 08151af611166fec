//! Storage conflicts as completions.

use cadence_foundation::{FlowId, Timestamp, Value, fields};
use cadence_log::{CONFLICT_VARIANT, Completion};
use cadence_storage::ConflictInfo;

/// Action name of synthesized conflict completions.
pub const CONFLICT_ACTION: &str = "conflict";

/// Synthesizes the `conflict` completion for an escalated write.
///
/// Input carries `relation` and `key`. Output carries both versions and
/// both timestamps (milliseconds) so rules can resolve the conflict.
#[must_use]
pub fn conflict_completion(concept: &str, info: &ConflictInfo, flow: FlowId) -> Completion {
    let millis = |ts: Timestamp| {
        Value::Int(i64::try_from(ts.as_millis()).unwrap_or(i64::MAX))
    };
    Completion::new(concept, CONFLICT_ACTION, flow)
        .with_variant(CONFLICT_VARIANT)
        .with_input(fields([
            ("relation", Value::from(info.relation.as_str())),
            ("key", Value::from(info.key.as_str())),
        ]))
        .with_output(fields([
            ("relation", Value::from(info.relation.as_str())),
            ("key", Value::from(info.key.as_str())),
            ("existing", Value::Map(info.existing.clone())),
            ("incoming", Value::Map(info.incoming.clone())),
            ("existing_timestamp", millis(info.existing_timestamp)),
            ("incoming_timestamp", millis(info.incoming_timestamp)),
        ]))
}
