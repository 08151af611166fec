//! The storage interface concepts persist their state through.

use cadence_foundation::{Fields, Result, Timestamp};

use crate::conflict::WriteOutcome;

/// Key-value storage partitioned into named relations.
///
/// Each relation maps string keys to field maps.
pub trait ConceptStorage: Send + Sync {
    /// Writes a record stamped with the given time.
    ///
    /// # Errors
    /// Returns an error if the backend fails.
    fn put_at(
        &self,
        relation: &str,
        key: &str,
        fields: Fields,
        timestamp: Timestamp,
    ) -> Result<WriteOutcome>;

    /// Writes a record stamped with the current time.
    ///
    /// # Errors
    /// Returns an error if the backend fails.
    fn put(&self, relation: &str, key: &str, fields: Fields) -> Result<WriteOutcome> {
        self.put_at(relation, key, fields, Timestamp::now())
    }

    /// Reads one record.
    ///
    /// # Errors
    /// Returns an error if the backend fails.
    fn get(&self, relation: &str, key: &str) -> Result<Option<Fields>>;

    /// Lists the records of a relation whose fields equal every field of
    /// the filter. No filter returns the whole relation.
    ///
    /// # Errors
    /// Returns an error if the backend fails.
    fn find(&self, relation: &str, filter: Option<&Fields>) -> Result<Vec<Fields>>;

    /// Deletes one record. Returns false if it did not exist.
    ///
    /// # Errors
    /// Returns an error if the backend fails.
    fn del(&self, relation: &str, key: &str) -> Result<bool>;
}

/// Returns true if `row` carries every field of `filter` with an equal value.
#[must_use]
pub fn matches_filter(row: &Fields, filter: &Fields) -> bool {
    filter.iter().all(|(k, v)| row.get(k.as_str()) == Some(v))
}
