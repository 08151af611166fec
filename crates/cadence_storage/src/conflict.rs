//! Write-conflict descriptions and resolutions.

use std::fmt;

use cadence_foundation::{Fields, Timestamp};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Two competing versions of one stored record.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConflictInfo {
    /// Relation the record lives in.
    pub relation: String,
    /// Record key.
    pub key: String,
    /// Currently stored fields.
    pub existing: Fields,
    /// Fields of the rejected write.
    pub incoming: Fields,
    /// When the stored version was written.
    pub existing_timestamp: Timestamp,
    /// When the incoming version was written.
    pub incoming_timestamp: Timestamp,
}

/// How a conflict handler settles a conflicting write.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConflictResolution {
    /// Discard the incoming write.
    KeepExisting,
    /// Overwrite with the incoming write.
    AcceptIncoming,
    /// Store these merged fields instead of either version.
    Merge(Fields),
    /// Keep the existing version and report the conflict to the sync layer.
    Escalate,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepExisting => write!(f, "keep-existing"),
            Self::AcceptIncoming => write!(f, "accept-incoming"),
            Self::Merge(_) => write!(f, "merge"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// Callback consulted when a write collides with a different stored version.
pub type ConflictHandler = Box<dyn Fn(&ConflictInfo) -> ConflictResolution + Send + Sync>;

/// What a `put` ended up doing.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOutcome {
    /// The fields were stored (new key, identical value, or no handler).
    Written,
    /// The handler kept the existing version.
    KeptExisting,
    /// The handler replaced the stored version with the incoming one.
    AcceptedIncoming,
    /// The handler stored merged fields.
    Merged,
    /// The existing version was kept and the conflict must be escalated.
    Escalated(ConflictInfo),
}

impl WriteOutcome {
    /// Returns the conflict to escalate, if any.
    #[must_use]
    pub fn escalation(&self) -> Option<&ConflictInfo> {
        match self {
            Self::Escalated(info) => Some(info),
            _ => None,
        }
    }
}

/// Merge helper: incoming fields win, fields only in `existing` survive.
#[must_use]
pub fn merge_prefer_incoming(info: &ConflictInfo) -> Fields {
    info.existing.union(&info.incoming)
}
