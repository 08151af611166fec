//! In-memory relation storage.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use cadence_foundation::{Error, Fields, LtMap, Result, Timestamp};
use tracing::{debug, info};

use crate::conflict::{ConflictHandler, ConflictInfo, ConflictResolution, WriteOutcome};
use crate::traits::{ConceptStorage, matches_filter};

#[derive(Clone, Debug, PartialEq)]
struct StoredEntry {
    fields: Fields,
    written_at: Timestamp,
}

type Relation = LtMap<String, StoredEntry>;

/// Relation storage held in memory.
///
/// Without a conflict handler, every write overwrites. With one, a write
/// that replaces a *different* stored version is handed to the handler.
/// The handler runs under the storage write lock and must not call back
/// into the same storage.
#[derive(Default)]
pub struct MemoryStorage {
    relations: RwLock<LtMap<String, Relation>>,
    on_conflict: Option<ConflictHandler>,
}

impl MemoryStorage {
    /// Creates empty storage with last-writer-wins semantics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a conflict handler.
    #[must_use]
    pub fn with_conflict_handler(
        mut self,
        handler: impl Fn(&ConflictInfo) -> ConflictResolution + Send + Sync + 'static,
    ) -> Self {
        self.on_conflict = Some(Box::new(handler));
        self
    }

    /// Returns the names of non-empty relations, sorted.
    ///
    /// # Errors
    /// Returns an error if the storage lock is poisoned.
    pub fn relations(&self) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .iter()
            .filter(|(_, rel)| !rel.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    /// Returns the number of records in a relation.
    ///
    /// # Errors
    /// Returns an error if the storage lock is poisoned.
    pub fn count(&self, relation: &str) -> Result<usize> {
        Ok(self.read()?.get(relation).map_or(0, LtMap::len))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LtMap<String, Relation>>> {
        self.relations
            .read()
            .map_err(|_| Error::internal("storage lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LtMap<String, Relation>>> {
        self.relations
            .write()
            .map_err(|_| Error::internal("storage lock poisoned"))
    }

    fn resolve(&self, info: ConflictInfo) -> (Option<StoredEntry>, WriteOutcome) {
        let Some(handler) = &self.on_conflict else {
            let entry = StoredEntry {
                fields: info.incoming,
                written_at: info.incoming_timestamp,
            };
            return (Some(entry), WriteOutcome::Written);
        };

        let resolution = handler(&info);
        debug!(
            relation = %info.relation,
            key = %info.key,
            %resolution,
            "write conflict resolved"
        );
        match resolution {
            ConflictResolution::KeepExisting => (None, WriteOutcome::KeptExisting),
            ConflictResolution::AcceptIncoming => (
                Some(StoredEntry {
                    fields: info.incoming,
                    written_at: info.incoming_timestamp,
                }),
                WriteOutcome::AcceptedIncoming,
            ),
            ConflictResolution::Merge(fields) => (
                Some(StoredEntry {
                    fields,
                    written_at: info.incoming_timestamp.max(info.existing_timestamp),
                }),
                WriteOutcome::Merged,
            ),
            ConflictResolution::Escalate => {
                info!(relation = %info.relation, key = %info.key, "write conflict escalated");
                (None, WriteOutcome::Escalated(info))
            }
        }
    }
}

impl ConceptStorage for MemoryStorage {
    fn put_at(
        &self,
        relation: &str,
        key: &str,
        fields: Fields,
        timestamp: Timestamp,
    ) -> Result<WriteOutcome> {
        let mut relations = self.write()?;
        let mut rel = relations.get(relation).cloned().unwrap_or_default();

        let (entry, outcome) = match rel.get(key) {
            Some(existing) if existing.fields != fields => self.resolve(ConflictInfo {
                relation: relation.to_string(),
                key: key.to_string(),
                existing: existing.fields.clone(),
                incoming: fields,
                existing_timestamp: existing.written_at,
                incoming_timestamp: timestamp,
            }),
            _ => (
                Some(StoredEntry {
                    fields,
                    written_at: timestamp,
                }),
                WriteOutcome::Written,
            ),
        };

        if let Some(entry) = entry {
            rel.set(key.to_string(), entry);
            relations.set(relation.to_string(), rel);
        }
        Ok(outcome)
    }

    fn get(&self, relation: &str, key: &str) -> Result<Option<Fields>> {
        Ok(self
            .read()?
            .get(relation)
            .and_then(|rel| rel.get(key))
            .map(|entry| entry.fields.clone()))
    }

    fn find(&self, relation: &str, filter: Option<&Fields>) -> Result<Vec<Fields>> {
        let relations = self.read()?;
        let Some(rel) = relations.get(relation) else {
            return Ok(Vec::new());
        };
        Ok(rel
            .values()
            .filter(|entry| filter.is_none_or(|f| matches_filter(&entry.fields, f)))
            .map(|entry| entry.fields.clone())
            .collect())
    }

    fn del(&self, relation: &str, key: &str) -> Result<bool> {
        let mut relations = self.write()?;
        let Some(rel) = relations.get(relation) else {
            return Ok(false);
        };
        if !rel.contains_key(key) {
            return Ok(false);
        }
        let rel = rel.remove(key);
        relations.set(relation.to_string(), rel);
        Ok(true)
    }
}
