//! Process-wide pointer files: active plan and session mode.
//!
//! Single-writer files with no locking, by design. A missing file means "no
//! pointer set". These are explicit, documented files rather than ambient
//! global state: set on command entry, cleared on unrelated input.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::io::store::write_atomic;

/// Read a pointer file; `None` if it does not exist or is blank.
pub fn read_pointer(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| Error::Io {
        op: "read",
        path: path.to_path_buf(),
        source,
    })?;
    let value = contents.trim();
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value.to_string()))
    }
}

/// Set a pointer (atomic single-line write).
pub fn write_pointer(path: &Path, value: &str) -> Result<()> {
    write_atomic(path, &format!("{value}\n"))
}

/// Clear a pointer; clearing an unset pointer is not an error.
pub fn clear_pointer(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(Error::Io {
            op: "remove",
            path: path.to_path_buf(),
            source,
        }),
    }
}
