//! Invocation, completion, and action record types.

use cadence_foundation::{Fields, FlowId, RecordId, Timestamp};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Variant tag of a successful completion.
pub const OK_VARIANT: &str = "ok";

/// Variant tag of a synthesized write-conflict completion.
pub const CONFLICT_VARIANT: &str = "conflict";

// =============================================================================
// Invocation
// =============================================================================

/// A request for a concept to perform an action.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Invocation {
    /// Record id, assigned at creation.
    pub id: RecordId,
    /// Target concept.
    pub concept: String,
    /// Action name.
    pub action: String,
    /// Input fields.
    pub input: Fields,
    /// Flow this invocation belongs to.
    pub flow: FlowId,
    /// Name of the rule that produced it, if any.
    pub rule: Option<String>,
    /// Creation time.
    pub timestamp: Timestamp,
}

impl Invocation {
    /// Creates an invocation with a fresh id and the current time.
    #[must_use]
    pub fn new(
        concept: impl Into<String>,
        action: impl Into<String>,
        input: Fields,
        flow: FlowId,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            concept: concept.into(),
            action: action.into(),
            input,
            flow,
            rule: None,
            timestamp: Timestamp::now(),
        }
    }

    /// Sets the originating rule.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Overrides the record id.
    #[must_use]
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = id;
        self
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builds the completion reporting the outcome of this invocation.
    ///
    /// The completion copies concept, action, input, and flow.
    #[must_use]
    pub fn complete(&self, variant: impl Into<String>, output: Fields) -> Completion {
        Completion {
            id: RecordId::generate(),
            concept: self.concept.clone(),
            action: self.action.clone(),
            input: self.input.clone(),
            variant: variant.into(),
            output,
            flow: self.flow.clone(),
            timestamp: Timestamp::now(),
        }
    }
}

// =============================================================================
// Completion
// =============================================================================

/// The outcome of an action: the input it ran with, a variant tag, and output.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Completion {
    /// Record id, assigned at creation.
    pub id: RecordId,
    /// Concept that performed the action.
    pub concept: String,
    /// Action name.
    pub action: String,
    /// Input fields the action ran with.
    pub input: Fields,
    /// Outcome tag (`ok`, `error`, `conflict`, ...).
    pub variant: String,
    /// Output fields.
    pub output: Fields,
    /// Flow this completion belongs to.
    pub flow: FlowId,
    /// Completion time.
    pub timestamp: Timestamp,
}

impl Completion {
    /// Creates an `ok` completion with empty input and output.
    #[must_use]
    pub fn new(concept: impl Into<String>, action: impl Into<String>, flow: FlowId) -> Self {
        Self {
            id: RecordId::generate(),
            concept: concept.into(),
            action: action.into(),
            input: Fields::new(),
            variant: OK_VARIANT.to_string(),
            output: Fields::new(),
            flow,
            timestamp: Timestamp::now(),
        }
    }

    /// Sets the input fields.
    #[must_use]
    pub fn with_input(mut self, input: Fields) -> Self {
        self.input = input;
        self
    }

    /// Sets the output fields.
    #[must_use]
    pub fn with_output(mut self, output: Fields) -> Self {
        self.output = output;
        self
    }

    /// Sets the variant tag.
    #[must_use]
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    /// Overrides the record id.
    #[must_use]
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = id;
        self
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns true if this is a synthesized conflict completion.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.variant == CONFLICT_VARIANT
    }
}

// =============================================================================
// Action Record
// =============================================================================

/// The payload of a logged record.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecordKind {
    /// A logged invocation.
    Invocation(Invocation),
    /// A logged completion.
    Completion(Completion),
}

/// One entry of the action log.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActionRecord {
    /// The invocation or completion.
    pub kind: RecordKind,
    /// Causal parent, always in the same flow.
    pub parent: Option<RecordId>,
    /// Rule that produced this record, directly or through its invocation.
    pub rule: Option<String>,
    /// Global append position.
    pub sequence: u64,
}

impl ActionRecord {
    /// Returns the record id.
    #[must_use]
    pub fn id(&self) -> RecordId {
        match &self.kind {
            RecordKind::Invocation(inv) => inv.id,
            RecordKind::Completion(c) => c.id,
        }
    }

    /// Returns the flow.
    #[must_use]
    pub fn flow(&self) -> &FlowId {
        match &self.kind {
            RecordKind::Invocation(inv) => &inv.flow,
            RecordKind::Completion(c) => &c.flow,
        }
    }

    /// Returns the concept.
    #[must_use]
    pub fn concept(&self) -> &str {
        match &self.kind {
            RecordKind::Invocation(inv) => &inv.concept,
            RecordKind::Completion(c) => &c.concept,
        }
    }

    /// Returns the action name.
    #[must_use]
    pub fn action(&self) -> &str {
        match &self.kind {
            RecordKind::Invocation(inv) => &inv.action,
            RecordKind::Completion(c) => &c.action,
        }
    }

    /// Returns the completion, if this record is one.
    #[must_use]
    pub fn as_completion(&self) -> Option<&Completion> {
        match &self.kind {
            RecordKind::Completion(c) => Some(c),
            RecordKind::Invocation(_) => None,
        }
    }

    /// Returns the invocation, if this record is one.
    #[must_use]
    pub fn as_invocation(&self) -> Option<&Invocation> {
        match &self.kind {
            RecordKind::Invocation(inv) => Some(inv),
            RecordKind::Completion(_) => None,
        }
    }

    /// Returns true if `kind` is a redelivery of this record's payload.
    ///
    /// Creation timestamps are ignored: a sender may rebuild a record with
    /// the same id before sending it again.
    #[must_use]
    pub fn same_payload(&self, kind: &RecordKind) -> bool {
        match (&self.kind, kind) {
            (RecordKind::Invocation(a), RecordKind::Invocation(b)) => {
                a.id == b.id
                    && a.concept == b.concept
                    && a.action == b.action
                    && a.input == b.input
                    && a.flow == b.flow
                    && a.rule == b.rule
            }
            (RecordKind::Completion(a), RecordKind::Completion(b)) => {
                a.id == b.id
                    && a.concept == b.concept
                    && a.action == b.action
                    && a.input == b.input
                    && a.variant == b.variant
                    && a.output == b.output
                    && a.flow == b.flow
            }
            _ => false,
        }
    }
}
