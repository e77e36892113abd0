//! Persistence for PR gate records.
//!
//! One JSON file per PR under `<state_dir>/prs/`. Each file carries a
//! version envelope so the layout can evolve. Records are written to a temp
//! file and renamed into place, so a crash never leaves a half-written record.

use crate::error::{Error, Result};
use crate::store::PullRequestRecord;
use crate::types::PrId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current on-disk format version
pub const STATE_VERSION: u32 = 1;

/// Directory holding one file per PR
const RECORDS_DIR: &str = "prs";

/// Versioned wrapper written to disk
#[derive(Debug, Serialize, Deserialize)]
struct RecordFile {
    version: u32,
    record: PullRequestRecord,
}

/// State directory handle
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Use `root` as the state directory (created lazily on first save)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the state directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    /// Path of the record file for a PR
    pub fn record_path(&self, pr: PrId) -> PathBuf {
        self.records_dir().join(format!("{}.json", pr.0))
    }

    /// Load every persisted record.
    ///
    /// Returns an empty list if the directory doesn't exist yet.
    pub fn load_all(&self) -> Result<Vec<PullRequestRecord>> {
        let dir = self.records_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir)
            .map_err(|e| Error::Storage(format!("failed to read {}: {e}", dir.display())))?;

        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::Storage(format!("failed to read {}: {e}", dir.display())))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            records.push(load_record_file(&path)?);
        }
        records.sort_by_key(|r| r.id);

        debug!(count = records.len(), dir = %dir.display(), "Loaded gate records");
        Ok(records)
    }

    /// Load a single record, if present
    pub fn load(&self, pr: PrId) -> Result<Option<PullRequestRecord>> {
        let path = self.record_path(pr);
        if !path.exists() {
            return Ok(None);
        }
        load_record_file(&path).map(Some)
    }

    /// Write a record, replacing any previous version
    pub fn save(&self, record: &PullRequestRecord) -> Result<()> {
        let dir = self.records_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| Error::Storage(format!("failed to create {}: {e}", dir.display())))?;
        }

        let file = RecordFile {
            version: STATE_VERSION,
            record: record.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::Storage(format!("failed to serialize record {}: {e}", record.id)))?;

        let path = self.record_path(record.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .map_err(|e| Error::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| Error::Storage(format!("failed to replace {}: {e}", path.display())))?;

        Ok(())
    }
}

fn load_record_file(path: &Path) -> Result<PullRequestRecord> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Storage(format!("failed to read {}: {e}", path.display())))?;
    let file: RecordFile = serde_json::from_str(&content)
        .map_err(|e| Error::Storage(format!("failed to parse {}: {e}", path.display())))?;
    if file.version > STATE_VERSION {
        return Err(Error::Storage(format!(
            "{} was written by a newer version (format {})",
            path.display(),
            file.version
        )));
    }
    Ok(file.record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatePolicy;
    use crate::escalation::EscalationState;
    use crate::types::Gate;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_dir_returns_empty() {
        let temp = TempDir::new().unwrap();
        let dir = StateDir::new(temp.path().join("state"));
        assert!(dir.load_all().unwrap().is_empty());
        assert!(dir.load(PrId(1)).unwrap().is_none());
    }

    #[test]
    fn test_roundtrip_preserves_gate_and_next_fire() {
        let temp = TempDir::new().unwrap();
        let dir = StateDir::new(temp.path());
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap();
        let policy = GatePolicy::default();

        let mut record = PullRequestRecord::new(PrId(42), "abc123", now);
        record.enter_gate(Gate::Review, now);
        record.escalation = Some(EscalationState::arm(PrId(42), Gate::Review, now, &policy.ladder));

        dir.save(&record).unwrap();
        let loaded = dir.load(PrId(42)).unwrap().unwrap();

        assert_eq!(loaded.gate, Gate::Review);
        assert_eq!(
            loaded.escalation.as_ref().unwrap().next_fire_at,
            record.escalation.as_ref().unwrap().next_fire_at
        );
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_load_all_sorted_and_skips_other_files() {
        let temp = TempDir::new().unwrap();
        let dir = StateDir::new(temp.path());
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap();

        dir.save(&PullRequestRecord::new(PrId(9), "a", now)).unwrap();
        dir.save(&PullRequestRecord::new(PrId(3), "b", now)).unwrap();
        fs::write(temp.path().join("prs").join("README"), "ignore me").unwrap();

        let ids: Vec<PrId> = dir.load_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![PrId(3), PrId(9)]);
    }

    #[test]
    fn test_newer_version_rejected() {
        let temp = TempDir::new().unwrap();
        let dir = StateDir::new(temp.path());
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap();
        dir.save(&PullRequestRecord::new(PrId(1), "a", now)).unwrap();

        let path = dir.record_path(PrId(1));
        let content = fs::read_to_string(&path)
            .unwrap()
            .replacen("\"version\": 1", "\"version\": 99", 1);
        fs::write(&path, content).unwrap();

        assert!(matches!(dir.load(PrId(1)), Err(Error::Storage(_))));
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let temp = TempDir::new().unwrap();
        let dir = StateDir::new(temp.path());
        fs::create_dir_all(temp.path().join("prs")).unwrap();
        fs::write(dir.record_path(PrId(5)), "{not json").unwrap();
        assert!(matches!(dir.load_all(), Err(Error::Storage(_))));
    }
}
