//! In-process upstream link between two engines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cadence_engine::{AnnotatedEngine, UpstreamLink};
use cadence_foundation::{Error, Result};
use cadence_log::{Completion, Invocation};
use tracing::debug;

/// Feeds a downstream engine's completions into an upstream engine.
///
/// Invocations the upstream builds in response are kept for its owner to
/// dispatch. The connection can be toggled to simulate partitions.
pub struct EngineLink {
    upstream: Arc<AnnotatedEngine>,
    connected: AtomicBool,
    produced: Mutex<Vec<Invocation>>,
}

impl EngineLink {
    /// Creates a connected link.
    #[must_use]
    pub fn new(upstream: Arc<AnnotatedEngine>) -> Self {
        Self {
            upstream,
            connected: AtomicBool::new(true),
            produced: Mutex::new(Vec::new()),
        }
    }

    /// Connects or disconnects the link.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// The upstream engine.
    #[must_use]
    pub fn upstream(&self) -> &Arc<AnnotatedEngine> {
        &self.upstream
    }

    /// Takes the invocations the upstream built from forwarded completions.
    ///
    /// # Errors
    /// Returns an error if the buffer lock is poisoned.
    pub fn take_invocations(&self) -> Result<Vec<Invocation>> {
        Ok(std::mem::take(
            &mut *self
                .produced
                .lock()
                .map_err(|_| Error::internal("link buffer lock poisoned"))?,
        ))
    }
}

impl UpstreamLink for EngineLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn forward(&self, completion: &Completion) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::transport("upstream", "link is disconnected"));
        }
        let outcome = self.upstream.on_completion(completion.clone(), None)?;
        debug!(
            record = %completion.id,
            invocations = outcome.invocations.len(),
            "completion forwarded upstream"
        );
        self.produced
            .lock()
            .map_err(|_| Error::internal("link buffer lock poisoned"))?
            .extend(outcome.invocations);
        Ok(())
    }
}
