//! Engine configuration.

/// Default ceiling on bindings a single match may fan out into.
pub const DEFAULT_MAX_FAN_OUT: usize = 10_000;

/// Default number of completions buffered while the upstream is offline.
pub const DEFAULT_OUTBOX_LIMIT: usize = 1_000;

/// Tunables for [`crate::SyncEngine`] and [`crate::AnnotatedEngine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Kill switch for clause cross-products. Exceeding it fails the match.
    pub max_fan_out: usize,
    /// Whether immediate rules verify their targets are reachable.
    pub check_immediate_reachability: bool,
    /// Completions kept for replay while the upstream is disconnected.
    /// The oldest is dropped once full.
    pub outbox_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_fan_out: DEFAULT_MAX_FAN_OUT,
            check_immediate_reachability: true,
            outbox_limit: DEFAULT_OUTBOX_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Tight limits, for tests and untrusted rule sets.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_fan_out: 100,
            check_immediate_reachability: true,
            outbox_limit: 100,
        }
    }

    /// Loose limits and no reachability checks on immediate rules.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            max_fan_out: usize::MAX,
            check_immediate_reachability: false,
            outbox_limit: usize::MAX,
        }
    }

    /// Sets the fan-out ceiling.
    #[must_use]
    pub fn with_max_fan_out(mut self, limit: usize) -> Self {
        self.max_fan_out = limit;
        self
    }

    /// Enables or disables reachability checks for immediate rules.
    #[must_use]
    pub fn with_immediate_reachability(mut self, check: bool) -> Self {
        self.check_immediate_reachability = check;
        self
    }

    /// Sets the outbox size.
    #[must_use]
    pub fn with_outbox_limit(mut self, limit: usize) -> Self {
        self.outbox_limit = limit;
        self
    }
}
