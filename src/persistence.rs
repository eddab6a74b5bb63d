//! Snapshot persistence for run state.
//!
//! Every save writes a fresh `{experiment}_{timestamp}.json` file: first to a
//! hidden temporary name, then renamed into place. A crash mid-write can
//! therefore never damage an earlier snapshot, and `load` always sees whole
//! files. Old snapshots are removed by [`SnapshotStore::prune`].

use crate::config::StoreConfig;
use crate::error::{Result, SweepError};
use crate::state::Snapshot;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Default number of snapshots kept per experiment.
pub const DEFAULT_KEEP: usize = 5;

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// A snapshot file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    /// Timestamp embedded in the file name.
    pub stamp: String,
    /// Disambiguator for saves within the same microsecond.
    pub sequence: u32,
}

impl SnapshotFile {
    fn recency(&self) -> (SystemTime, &str, u32) {
        (self.modified, self.stamp.as_str(), self.sequence)
    }
}

/// Directory of timestamped snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    keep: usize,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep: keep.max(1),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.snapshot_dir.clone(), config.keep)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Write `snapshot` to a new file and return its path.
    pub fn save(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        validate_name(&snapshot.name)?;
        fs::create_dir_all(&self.dir).map_err(|e| SweepError::io(&self.dir, e))?;

        let data = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| SweepError::Serialization(e.to_string()))?;

        let stamp = Utc::now().format(STAMP_FORMAT).to_string();
        let path = self.unused_path(&snapshot.name, &stamp);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let tmp_path = self.dir.join(format!(".{}.tmp", file_name));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .map_err(|e| SweepError::io(&tmp_path, e))?;
        file.write_all(&data)
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_all())
            .map_err(|e| SweepError::io(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &path).map_err(|e| SweepError::io(&path, e))?;
        debug!(path = %path.display(), "snapshot written");

        Ok(path)
    }

    fn unused_path(&self, name: &str, stamp: &str) -> PathBuf {
        let mut path = self.dir.join(format!("{}_{}.json", name, stamp));
        let mut sequence = 1u32;
        while path.exists() {
            path = self
                .dir
                .join(format!("{}_{}-{}.json", name, stamp, sequence));
            sequence += 1;
        }
        path
    }

    /// Snapshots for `name`, newest first. A missing directory is empty.
    pub fn list(&self, name: &str) -> Result<Vec<SnapshotFile>> {
        validate_name(name)?;

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SweepError::io(&self.dir, e)),
        };

        let prefix = format!("{}_", name);
        let mut files = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| SweepError::io(&self.dir, e))?;
            let path = entry.path();

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(rest) = file_name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            let Some((stamp, sequence)) = parse_stamp(rest) else {
                continue;
            };

            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| SweepError::io(&path, e))?;

            files.push(SnapshotFile {
                path,
                modified,
                stamp,
                sequence,
            });
        }

        files.sort_by(|a, b| b.recency().cmp(&a.recency()));
        Ok(files)
    }

    /// Load the most recent readable snapshot for `name`.
    ///
    /// Returns `Ok(None)` when there is no prior state. A snapshot that fails
    /// to parse is skipped in favour of the next older one.
    pub fn load(&self, name: &str) -> Result<Option<Snapshot>> {
        for file in self.list(name)? {
            match load_snapshot(&file.path) {
                Ok(snapshot) => {
                    debug!(path = %file.path.display(), "snapshot loaded");
                    return Ok(Some(snapshot));
                }
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "skipping unreadable snapshot");
                }
            }
        }
        Ok(None)
    }

    /// Delete all but the newest `keep` snapshots for `name`.
    /// Returns how many files were removed.
    pub fn prune(&self, name: &str, keep: usize) -> Result<usize> {
        let files = self.list(name)?;
        let mut removed = 0;

        for file in files.iter().skip(keep.max(1)) {
            match fs::remove_file(&file.path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(SweepError::io(&file.path, e)),
            }
        }

        if removed > 0 {
            debug!(experiment = name, removed, "pruned old snapshots");
        }
        Ok(removed)
    }
}

/// Read a single snapshot file.
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let data = fs::read(path).map_err(|e| SweepError::io(path, e))?;
    serde_json::from_slice(&data).map_err(|e| SweepError::Serialization(e.to_string()))
}

/// `20261016T101500.123456Z` optionally followed by `-N`.
fn parse_stamp(rest: &str) -> Option<(String, u32)> {
    let (stamp, sequence) = match rest.split_once('-') {
        Some((stamp, seq)) => (stamp, seq.parse().ok()?),
        None => (rest, 0),
    };
    chrono::NaiveDateTime::parse_from_str(stamp.trim_end_matches('Z'), "%Y%m%dT%H%M%S%.6f")
        .ok()?;
    if !stamp.ends_with('Z') {
        return None;
    }
    Some((stamp.to_string(), sequence))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
    {
        return Err(SweepError::InvalidConfig(format!(
            "experiment name '{}' cannot be used as a file name prefix",
            name
        )));
    }
    Ok(())
}
