//! Concept transports and the concept registry.
//!
//! A transport is how the engine reaches a concept: invoke an action, query
//! its state, or ask whether it is healthy. The registry maps concept names
//! to transports and tracks reachability. Registration, hot-swap,
//! deregistration, and health refreshes report reachability transitions so
//! that deferred rules can be retried.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use cadence_foundation::{Error, Fields, Result};
use cadence_log::{Completion, Invocation};
use cadence_storage::ConflictInfo;
use tracing::{debug, info};

use crate::clause::QuerySource;

/// Reachability report of one transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Health {
    /// Whether the concept can currently be reached.
    pub available: bool,
    /// Round-trip latency, if measured.
    pub latency: Option<Duration>,
}

impl Health {
    /// A reachable concept.
    #[must_use]
    pub const fn up() -> Self {
        Self {
            available: true,
            latency: None,
        }
    }

    /// An unreachable concept.
    #[must_use]
    pub const fn down() -> Self {
        Self {
            available: false,
            latency: None,
        }
    }

    /// Sets the measured latency.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// How the engine talks to one concept.
pub trait ConceptTransport: Send + Sync {
    /// Performs an invocation and returns its completion.
    ///
    /// # Errors
    /// Returns an error if the invocation could not be carried out.
    fn invoke(&self, invocation: &Invocation) -> Result<Completion>;

    /// Reads a relation, optionally filtered by field equality.
    ///
    /// # Errors
    /// Returns an error if the query could not be answered.
    fn query(&self, relation: &str, filter: Option<&Fields>) -> Result<Vec<Fields>>;

    /// Reports reachability.
    fn health(&self) -> Health;

    /// Takes write conflicts the concept escalated since the last call.
    fn take_conflicts(&self) -> Vec<ConflictInfo> {
        Vec::new()
    }
}

/// A concept became reachable or unreachable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvailabilityChange {
    /// The concept.
    pub concept: String,
    /// Its new reachability.
    pub available: bool,
}

struct Registered {
    transport: Arc<dyn ConceptTransport>,
    available: bool,
}

/// Concept name to transport, with cached reachability.
///
/// Reachability is sampled from [`ConceptTransport::health`] on
/// registration and on [`ConceptRegistry::refresh`].
#[derive(Default)]
pub struct ConceptRegistry {
    concepts: RwLock<BTreeMap<String, Registered>>,
}

impl ConceptRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Registered>>> {
        self.concepts
            .read()
            .map_err(|_| Error::internal("concept registry lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Registered>>> {
        self.concepts
            .write()
            .map_err(|_| Error::internal("concept registry lock poisoned"))
    }

    /// Registers a concept, replacing any existing transport.
    ///
    /// Returns the concept's reachability after registration.
    ///
    /// # Errors
    /// Returns an error if the registry lock is poisoned.
    pub fn register(
        &self,
        concept: impl Into<String>,
        transport: Arc<dyn ConceptTransport>,
    ) -> Result<AvailabilityChange> {
        let concept = concept.into();
        let available = transport.health().available;
        let previous = self.write()?.insert(
            concept.clone(),
            Registered {
                transport,
                available,
            },
        );
        if previous.is_some() {
            info!(concept = %concept, available, "concept transport replaced");
        } else {
            info!(concept = %concept, available, "concept registered");
        }
        Ok(AvailabilityChange { concept, available })
    }

    /// Hot-swaps the transport of a registered concept.
    ///
    /// # Errors
    /// Returns `ConceptNotFound` if the concept is not registered.
    pub fn replace(
        &self,
        concept: &str,
        transport: Arc<dyn ConceptTransport>,
    ) -> Result<AvailabilityChange> {
        if !self.read()?.contains_key(concept) {
            return Err(Error::concept_not_found(concept));
        }
        self.register(concept, transport)
    }

    /// Removes a concept. Returns `None` if it was not registered.
    ///
    /// # Errors
    /// Returns an error if the registry lock is poisoned.
    pub fn deregister(&self, concept: &str) -> Result<Option<AvailabilityChange>> {
        let removed = self.write()?.remove(concept);
        Ok(removed.map(|_| {
            info!(concept, "concept deregistered");
            AvailabilityChange {
                concept: concept.to_string(),
                available: false,
            }
        }))
    }

    /// Polls every transport's health and returns the concepts whose
    /// reachability flipped.
    ///
    /// # Errors
    /// Returns an error if the registry lock is poisoned.
    pub fn refresh(&self) -> Result<Vec<AvailabilityChange>> {
        // Sample health outside the write lock; transports may be slow.
        let sampled: Vec<(String, Arc<dyn ConceptTransport>)> = self
            .read()?
            .iter()
            .map(|(name, r)| (name.clone(), Arc::clone(&r.transport)))
            .collect();
        let health: Vec<(String, Arc<dyn ConceptTransport>, bool)> = sampled
            .into_iter()
            .map(|(name, t)| {
                let available = t.health().available;
                (name, t, available)
            })
            .collect();

        let mut changes = Vec::new();
        let mut concepts = self.write()?;
        for (name, transport, available) in health {
            let Some(entry) = concepts.get_mut(&name) else {
                continue;
            };
            // Skip concepts hot-swapped while we were sampling.
            if !Arc::ptr_eq(&entry.transport, &transport) {
                continue;
            }
            if entry.available != available {
                entry.available = available;
                debug!(concept = %name, available, "reachability changed");
                changes.push(AvailabilityChange {
                    concept: name,
                    available,
                });
            }
        }
        Ok(changes)
    }

    /// Returns true if the concept is registered and was last seen healthy.
    ///
    /// # Errors
    /// Returns an error if the registry lock is poisoned.
    pub fn is_reachable(&self, concept: &str) -> Result<bool> {
        Ok(self.read()?.get(concept).is_some_and(|r| r.available))
    }

    /// The subset of `concepts` that cannot be reached.
    ///
    /// # Errors
    /// Returns an error if the registry lock is poisoned.
    pub fn unreachable<'a>(
        &self,
        concepts: impl IntoIterator<Item = &'a String>,
    ) -> Result<Vec<String>> {
        let registered = self.read()?;
        Ok(concepts
            .into_iter()
            .filter(|c| !registered.get(c.as_str()).is_some_and(|r| r.available))
            .cloned()
            .collect())
    }

    /// Looks up a transport.
    ///
    /// # Errors
    /// Returns `ConceptNotFound` if the concept is not registered.
    pub fn transport(&self, concept: &str) -> Result<Arc<dyn ConceptTransport>> {
        self.read()?
            .get(concept)
            .map(|r| Arc::clone(&r.transport))
            .ok_or_else(|| Error::concept_not_found(concept))
    }

    /// Registered concept names, sorted.
    ///
    /// # Errors
    /// Returns an error if the registry lock is poisoned.
    pub fn concepts(&self) -> Result<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    /// Dispatches an invocation to its concept.
    ///
    /// # Errors
    /// Returns `ConceptNotFound` or the transport's error.
    pub fn invoke(&self, invocation: &Invocation) -> Result<Completion> {
        self.transport(&invocation.concept)?.invoke(invocation)
    }
}

impl QuerySource for ConceptRegistry {
    fn query(&self, concept: &str, relation: &str, args: &Fields) -> Result<Vec<Fields>> {
        let filter = if args.is_empty() { None } else { Some(args) };
        self.transport(concept)?.query(relation, filter)
    }
}
