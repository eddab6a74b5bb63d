//! In-memory run state bound to its snapshot store.

use crate::cell::CellKey;
use crate::error::Result;
use crate::persistence::SnapshotStore;
use crate::state::{ResultRecord, RunState, Snapshot};
use std::path::PathBuf;
use tracing::{info, warn};

/// Owns the live [`Snapshot`] of one experiment and persists it.
///
/// Every appended record is followed by a save and a prune, so at most the
/// record currently being produced is lost on a crash.
#[derive(Debug)]
pub struct Checkpoint {
    store: SnapshotStore,
    snapshot: Snapshot,
    saves: usize,
}

impl Checkpoint {
    /// Start from an empty state.
    pub fn fresh(store: SnapshotStore, name: &str, description: &str) -> Self {
        Self {
            store,
            snapshot: Snapshot::new(name, description),
            saves: 0,
        }
    }

    /// Continue from the newest snapshot for `name`, or start fresh.
    ///
    /// Resuming is best effort: a store that cannot be read is logged and
    /// treated as empty.
    pub fn resume(store: SnapshotStore, name: &str, description: &str) -> Self {
        match store.load(name) {
            Ok(Some(mut snapshot)) => {
                info!(
                    experiment = name,
                    cells = snapshot.results.cells.len(),
                    records = snapshot.results.record_count(),
                    "resuming from snapshot"
                );
                snapshot.description = description.to_string();
                Self {
                    store,
                    snapshot,
                    saves: 0,
                }
            }
            Ok(None) => Self::fresh(store, name, description),
            Err(e) => {
                warn!(experiment = name, error = %e, "could not load previous state, starting fresh");
                Self::fresh(store, name, description)
            }
        }
    }

    pub fn state(&self) -> &RunState {
        &self.snapshot.results
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Number of snapshots written by this checkpoint.
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// Remember the identities behind a cell key.
    pub fn register_cell(&mut self, key: &CellKey) {
        let rendered = key.render();
        self.snapshot.results.ensure_cell(&rendered);
        self.snapshot.cells.insert(rendered, key.clone());
    }

    /// Add a timing sample. Persisted with the next save.
    pub fn record_time(&mut self, label: &str, seconds: f64) {
        self.snapshot.results.record_time(label, seconds);
    }

    /// Append a record and persist immediately.
    ///
    /// Means from an earlier evaluation no longer cover every record, so they
    /// are dropped.
    pub fn append(&mut self, key: &str, record: ResultRecord) -> Result<()> {
        self.snapshot.results.push(key, record);
        self.snapshot.results.evaluations = None;
        self.snapshot.results.overall = None;
        self.commit()?;
        Ok(())
    }

    /// Write a snapshot and drop the ones beyond the retention count.
    pub fn commit(&mut self) -> Result<PathBuf> {
        let path = self.store.save(&self.snapshot)?;
        self.saves += 1;
        self.store.prune(&self.snapshot.name, self.store.keep())?;
        Ok(path)
    }

    pub fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(question: &str) -> ResultRecord {
        ResultRecord::new(question, "test answer", vec![], vec![])
    }

    #[test]
    fn test_append_persists_each_record() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), 2);
        let mut checkpoint = Checkpoint::fresh(store.clone(), "exp", "desc");

        checkpoint.append("k", record("A?")).unwrap();
        checkpoint.append("k", record("B?")).unwrap();
        checkpoint.append("k", record("C?")).unwrap();

        assert_eq!(checkpoint.saves(), 3);
        assert_eq!(store.list("exp").unwrap().len(), 2);
        let loaded = store.load("exp").unwrap().unwrap();
        assert_eq!(loaded.results.records("k").len(), 3);
    }

    #[test]
    fn test_resume_picks_up_state() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), 5);

        let mut first = Checkpoint::fresh(store.clone(), "exp", "old");
        first.register_cell(&CellKey::new("c", "r", "q", "d"));
        first.append("c_r_q_d", record("A?")).unwrap();

        let resumed = Checkpoint::resume(store, "exp", "new");
        assert_eq!(resumed.state().records("c_r_q_d").len(), 1);
        assert_eq!(resumed.snapshot().description, "new");
        assert_eq!(resumed.snapshot().cells["c_r_q_d"].dataset, "d");
    }

    #[test]
    fn test_append_drops_stale_means() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), 5);
        let mut checkpoint = Checkpoint::fresh(store, "exp", "desc");
        checkpoint.append("k", record("A?")).unwrap();

        let mut means = std::collections::BTreeMap::new();
        means.insert("k".to_string(), crate::state::Metrics::new());
        checkpoint.snapshot.results.evaluations = Some(means.clone());
        checkpoint.snapshot.results.overall = Some(means);

        checkpoint.append("k", record("B?")).unwrap();
        assert!(checkpoint.state().evaluations.is_none());
        assert!(checkpoint.state().overall.is_none());
    }

    #[test]
    fn test_resume_without_history_is_fresh() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("missing"), 5);
        let checkpoint = Checkpoint::resume(store, "exp", "desc");
        assert_eq!(checkpoint.state().record_count(), 0);
        assert_eq!(checkpoint.saves(), 0);
    }
}
