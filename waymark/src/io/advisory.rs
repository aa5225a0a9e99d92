//! Advisory records: dead ends, challenges, and proposals.
//!
//! Stored append-only in `dead-ends.json`, keyed by task id and kind. These
//! records feed human/agent review flows and never influence the state
//! machine's correctness logic.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::store::{read_json, write_json_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdvisoryKind {
    /// An approach that was tried and failed.
    DeadEnd,
    /// Something discovered that challenges the current plan.
    Challenge,
    /// Documentation or improvement worth adding.
    Proposal,
}

impl FromStr for AdvisoryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dead-end" => Ok(AdvisoryKind::DeadEnd),
            "challenge" => Ok(AdvisoryKind::Challenge),
            "proposal" => Ok(AdvisoryKind::Proposal),
            other => Err(format!(
                "unknown advisory kind '{other}' (expected dead-end, challenge, or proposal)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    pub task_id: String,
    pub kind: AdvisoryKind,
    pub summary: String,
    pub recorded_at: String,
}

/// Load advisory records; a missing file is an empty list.
pub fn load_records(path: &Path) -> Result<Vec<AdvisoryRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_json(path)
}

/// Append one record (read-modify-write, atomic replace).
pub fn append_record(path: &Path, record: AdvisoryRecord) -> Result<()> {
    let mut records = load_records(path)?;
    records.push(record);
    write_json_atomic(path, &records)
}
