//! Engine hierarchy: completion forwarders and the upstream link.
//!
//! A downstream engine forwards every new completion to its forwarders and,
//! when one is set, to its upstream. Completions produced while the
//! upstream is disconnected wait in a bounded outbox and are replayed in
//! order once it reconnects.

use std::collections::VecDeque;

use cadence_foundation::Result;
use cadence_log::Completion;
use tracing::warn;

/// Observer of every completion newly appended to an engine.
pub trait CompletionForwarder: Send + Sync {
    /// Receives a completion.
    ///
    /// # Errors
    /// Errors are logged and otherwise ignored.
    fn forward(&self, completion: &Completion) -> Result<()>;
}

/// Connection to a parent engine.
pub trait UpstreamLink: Send + Sync {
    /// Returns true if completions can be delivered now.
    fn is_connected(&self) -> bool;

    /// Delivers one completion upstream.
    ///
    /// # Errors
    /// Returns an error if delivery failed; the completion is kept for replay.
    fn forward(&self, completion: &Completion) -> Result<()>;
}

/// Completions waiting for the upstream, oldest first.
#[derive(Debug)]
pub struct Outbox {
    queue: VecDeque<Completion>,
    limit: usize,
    dropped: u64,
}

impl Outbox {
    /// Creates an outbox holding at most `limit` completions.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            limit,
            dropped: 0,
        }
    }

    /// Queues a completion, dropping the oldest one when full.
    pub fn push(&mut self, completion: Completion) {
        if self.limit == 0 {
            self.dropped += 1;
            return;
        }
        if self.queue.len() >= self.limit {
            if let Some(oldest) = self.queue.pop_front() {
                self.dropped += 1;
                warn!(record = %oldest.id, limit = self.limit, "outbox full, dropped oldest");
            }
        }
        self.queue.push_back(completion);
    }

    /// Delivers queued completions in order until one fails.
    ///
    /// Returns how many were delivered.
    pub fn flush(&mut self, link: &dyn UpstreamLink) -> usize {
        let mut sent = 0;
        while let Some(next) = self.queue.pop_front() {
            if let Err(error) = link.forward(&next) {
                warn!(record = %next.id, %error, "upstream replay failed");
                self.queue.push_front(next);
                break;
            }
            sent += 1;
        }
        sent
    }

    /// Queued completions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Completion> {
        self.queue.iter()
    }

    /// Number of queued completions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Completions dropped because the outbox was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
