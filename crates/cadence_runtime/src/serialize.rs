//! Engine snapshots using `MessagePack`.
//!
//! A snapshot holds the action log, guard edges, pending queue, pending
//! conflicts, and upstream outbox. Rules and concept transports are code
//! and must be registered again after loading.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use cadence_engine::{AnnotatedEngine, ConceptRegistry, EngineConfig, EngineSnapshot};
use cadence_foundation::{Error, ErrorKind, Result};

/// Serializes a snapshot to bytes using `MessagePack` format.
///
/// Uses named serialization to preserve struct field names.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_bytes(snapshot: &EngineSnapshot) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(snapshot)
        .map_err(|e| Error::new(ErrorKind::Serialization(e.to_string())))
}

/// Deserializes a snapshot from `MessagePack` bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails.
pub fn from_bytes(bytes: &[u8]) -> Result<EngineSnapshot> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::new(ErrorKind::Serialization(e.to_string())))
}

/// Saves a snapshot to a file, creating or overwriting it.
///
/// # Errors
///
/// Returns an error if the file cannot be written or serialization fails.
pub fn save_to_file<P: AsRef<Path>>(snapshot: &EngineSnapshot, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        Error::new(ErrorKind::Io(format!(
            "failed to create file '{}': {e}",
            path.display()
        )))
    })?;

    let mut writer = BufWriter::new(file);
    let bytes = to_bytes(snapshot)?;

    writer.write_all(&bytes).map_err(|e| {
        Error::new(ErrorKind::Io(format!(
            "failed to write to file '{}': {e}",
            path.display()
        )))
    })?;

    writer.flush().map_err(|e| {
        Error::new(ErrorKind::Io(format!(
            "failed to flush file '{}': {e}",
            path.display()
        )))
    })?;

    Ok(())
}

/// Loads a snapshot from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or deserialization fails.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<EngineSnapshot> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::new(ErrorKind::Io(format!(
            "failed to open file '{}': {e}",
            path.display()
        )))
    })?;

    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();

    reader.read_to_end(&mut bytes).map_err(|e| {
        Error::new(ErrorKind::Io(format!(
            "failed to read file '{}': {e}",
            path.display()
        )))
    })?;

    from_bytes(&bytes)
}

/// Snapshots an engine straight to a file.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be taken or written.
pub fn save_engine<P: AsRef<Path>>(engine: &AnnotatedEngine, path: P) -> Result<()> {
    save_to_file(&engine.snapshot()?, path)
}

/// Restores an engine from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or holds an inconsistent log.
pub fn load_engine<P: AsRef<Path>>(
    registry: Arc<ConceptRegistry>,
    config: EngineConfig,
    path: P,
) -> Result<AnnotatedEngine> {
    AnnotatedEngine::from_snapshot(registry, config, load_from_file(path)?)
}
