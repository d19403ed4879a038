//! Snapshot persistence.
//!
//! A snapshot is the full JSON serialization of the key-value mapping,
//! self-contained and content-addressed by its snapshot id. On disk each
//! snapshot is a `<id>.snap` data file plus a `<id>.meta.json` sidecar;
//! retention is bounded (default 2). Devmode keeps the latest snapshot in
//! memory only.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use openraft::SnapshotMeta;

use crate::typeconfig::{Member, NodeId};

pub(crate) const SNAPSHOT_RETAIN: usize = 2;
const SNAPSHOT_DIR: &str = "snapshots";
const DATA_EXT: &str = "snap";
const META_SUFFIX: &str = ".meta.json";

/// A snapshot at rest: raft metadata plus the serialized mapping.
#[derive(Debug, Clone)]
pub(crate) struct StoredSnapshot {
    pub meta: SnapshotMeta<NodeId, Member>,
    pub data: Vec<u8>,
}

/// Where snapshots live.
#[derive(Debug)]
pub(crate) enum SnapshotRepo {
    /// Devmode: latest snapshot only, process-local.
    Mem(RwLock<Option<StoredSnapshot>>),
    /// File-backed store under `<datadir>/snapshots`.
    Dir { dir: PathBuf, retain: usize },
}

impl SnapshotRepo {
    pub fn in_memory() -> Self {
        Self::Mem(RwLock::new(None))
    }

    pub fn on_disk(datadir: &Path) -> io::Result<Self> {
        let dir = datadir.join(SNAPSHOT_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self::Dir {
            dir,
            retain: SNAPSHOT_RETAIN,
        })
    }

    /// Persist a snapshot and prune old generations past the retention
    /// bound.
    pub fn store(&self, snapshot: &StoredSnapshot) -> io::Result<()> {
        match self {
            Self::Mem(slot) => {
                *slot.write().expect("snapshot slot poisoned") = Some(snapshot.clone());
                Ok(())
            }
            Self::Dir { dir, retain } => {
                let id = &snapshot.meta.snapshot_id;
                let meta_json = serde_json::to_vec(&snapshot.meta).map_err(io::Error::other)?;

                fs::write(dir.join(format!("{id}.{DATA_EXT}")), &snapshot.data)?;
                fs::write(dir.join(format!("{id}{META_SUFFIX}")), meta_json)?;

                prune(dir, *retain)?;
                Ok(())
            }
        }
    }

    /// Latest snapshot by applied log index, if any.
    pub fn load_latest(&self) -> io::Result<Option<StoredSnapshot>> {
        match self {
            Self::Mem(slot) => Ok(slot.read().expect("snapshot slot poisoned").clone()),
            Self::Dir { dir, .. } => {
                let mut snapshots = list(dir)?;
                snapshots.sort_by_key(|(meta, _)| applied_index(meta));

                let Some((meta, id)) = snapshots.pop() else {
                    return Ok(None);
                };

                let data = fs::read(dir.join(format!("{id}.{DATA_EXT}")))?;
                Ok(Some(StoredSnapshot { meta, data }))
            }
        }
    }
}

fn applied_index(meta: &SnapshotMeta<NodeId, Member>) -> u64 {
    meta.last_log_id.map(|log_id| log_id.index).unwrap_or(0)
}

/// All `(meta, snapshot_id)` pairs currently on disk.
fn list(dir: &Path) -> io::Result<Vec<(SnapshotMeta<NodeId, Member>, String)>> {
    let mut snapshots = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(id) = name.strip_suffix(META_SUFFIX) else {
            continue;
        };

        let raw = fs::read(entry.path())?;
        match serde_json::from_slice::<SnapshotMeta<NodeId, Member>>(&raw) {
            Ok(meta) => snapshots.push((meta, id.to_string())),
            Err(err) => {
                tracing::warn!(snapshot = id, %err, "skipping unreadable snapshot metadata");
            }
        }
    }

    Ok(snapshots)
}

fn prune(dir: &Path, retain: usize) -> io::Result<()> {
    let mut snapshots = list(dir)?;
    if snapshots.len() <= retain {
        return Ok(());
    }

    snapshots.sort_by_key(|(meta, _)| applied_index(meta));
    let excess = snapshots.len() - retain;

    for (_, id) in snapshots.into_iter().take(excess) {
        tracing::debug!(snapshot = %id, "pruning snapshot");
        let _ = fs::remove_file(dir.join(format!("{id}.{DATA_EXT}")));
        let _ = fs::remove_file(dir.join(format!("{id}{META_SUFFIX}")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openraft::{CommittedLeaderId, LogId};

    fn snapshot(index: u64) -> StoredSnapshot {
        StoredSnapshot {
            meta: SnapshotMeta {
                last_log_id: Some(LogId::new(CommittedLeaderId::new(1, 0), index)),
                last_membership: openraft::StoredMembership::default(),
                snapshot_id: format!("1-{index}-{index}"),
            },
            data: format!("{{\"k\":\"{index}\"}}").into_bytes(),
        }
    }

    #[test]
    fn memory_repo_keeps_latest() {
        let repo = SnapshotRepo::in_memory();
        assert!(repo.load_latest().unwrap().is_none());

        repo.store(&snapshot(1)).unwrap();
        repo.store(&snapshot(2)).unwrap();

        let latest = repo.load_latest().unwrap().unwrap();
        assert_eq!(applied_index(&latest.meta), 2);
    }

    #[test]
    fn dir_repo_round_trips_and_prunes() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = SnapshotRepo::on_disk(tmp.path()).unwrap();

        for index in 1..=4 {
            repo.store(&snapshot(index)).unwrap();
        }

        let latest = repo.load_latest().unwrap().unwrap();
        assert_eq!(applied_index(&latest.meta), 4);
        assert_eq!(latest.data, snapshot(4).data);

        // Only the retention bound survives on disk.
        let metas = list(&tmp.path().join(SNAPSHOT_DIR)).unwrap();
        assert_eq!(metas.len(), SNAPSHOT_RETAIN);
    }

    #[test]
    fn dir_repo_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let repo = SnapshotRepo::on_disk(tmp.path()).unwrap();
            repo.store(&snapshot(7)).unwrap();
        }

        let reopened = SnapshotRepo::on_disk(tmp.path()).unwrap();
        let latest = reopened.load_latest().unwrap().unwrap();
        assert_eq!(applied_index(&latest.meta), 7);
    }
}
