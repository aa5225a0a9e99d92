//! Atomic filesystem primitives shared by the persistence layer.
//!
//! Every state file is replaced atomically (temp file + rename) so a crash
//! mid-write can never leave a half-written file behind. Append-only logs use
//! plain appends; they are orientation, not authority.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::Io {
        op: "read",
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = read_to_string(path)?;
    toml::from_str(&contents).map_err(|source| Error::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-printed JSON with trailing newline, written atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    buf.push('\n');
    write_atomic(path, &buf)
}

pub fn write_toml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf =
        toml::to_string_pretty(value).map_err(|source| Error::TomlSerialize { source })?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Atomic replace: write a sibling temp file, then rename over the target.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path.parent().ok_or_else(|| Error::Io {
        op: "resolve parent of",
        path: path.to_path_buf(),
        source: std::io::Error::other("path has no parent"),
    })?;
    fs::create_dir_all(parent).map_err(|source| Error::Io {
        op: "create directory",
        path: parent.to_path_buf(),
        source,
    })?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents).map_err(|source| Error::Io {
        op: "write",
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| Error::Io {
        op: "replace",
        path: path.to_path_buf(),
        source,
    })
}

/// Append one line, creating the file and its directory if needed.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| Error::Io {
            op: "create directory",
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::Io {
            op: "open",
            path: path.to_path_buf(),
            source,
        })?;
    writeln!(file, "{line}").map_err(|source| Error::Io {
        op: "append to",
        path: path.to_path_buf(),
        source,
    })
}
