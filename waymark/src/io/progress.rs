//! Append-only progress logs at plan and task granularity.
//!
//! Logs exist purely so a resumed session can orient itself; the state files
//! are authoritative. Entries are timestamped single lines.

use std::path::Path;

use chrono::{SecondsFormat, Utc};

use crate::error::Result;
use crate::io::store::append_line;

/// RFC 3339 UTC timestamp, second precision.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Append `[timestamp] message` to an append-only log file.
pub fn append_entry(path: &Path, timestamp: &str, message: &str) -> Result<()> {
    append_line(path, &format!("[{timestamp}] {message}"))
}
