use std::fs::File;
use std::io::{BufReader, ErrorKind, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;

/// Load a snapshot from the backing file.
///
/// A missing or empty file is a fresh store, not an error; anything else
/// that fails to parse is surfaced as a serialization failure.
pub fn load(path: &Path) -> StoreResult<Snapshot> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no backing file yet; starting empty");
            return Ok(Snapshot::default());
        }
        Err(err) => return Err(err.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(Snapshot::default());
    }
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Persist a snapshot to the backing file.
///
/// Writes to a temporary file in the same directory, syncs, then renames
/// over the target so readers never observe a half-written snapshot.
pub fn save(path: &Path, snapshot: &Snapshot) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, snapshot)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    debug!(path = %path.display(), "snapshot persisted");
    Ok(())
}
