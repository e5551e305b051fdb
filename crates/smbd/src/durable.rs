//! The durable (persistent) handle table.
//!
//! Runs parallel to the per-session FID tables. A durable open leaves a
//! stat snapshot behind; a reconnect revalidates the snapshot against the
//! current inode and fails the record on any mismatch. Durability is
//! scoped to the server process lifetime.

use std::collections::HashMap;
use std::os::unix::fs::MetadataExt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

/// The stat fields a reconnect validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatSnapshot {
    pub dev: u64,
    pub ino: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub size: u64,
    pub blocks: u64,
    pub mtime: i64,
    pub ctime: i64,
    pub atime: i64,
}

impl From<&std::fs::Metadata> for StatSnapshot {
    fn from(meta: &std::fs::Metadata) -> Self {
        StatSnapshot {
            dev: meta.dev(),
            ino: meta.ino(),
            uid: meta.uid(),
            gid: meta.gid(),
            mode: meta.mode(),
            size: meta.size(),
            blocks: meta.blocks(),
            mtime: meta.mtime(),
            ctime: meta.ctime(),
            atime: meta.atime(),
        }
    }
}

/// One persistent-handle index entry.
#[derive(Debug, Clone)]
pub struct DurableRecord {
    pub persistent_id: u64,
    /// Session the handle belonged to at disconnect.
    pub session_uid: u16,
    /// Volatile FID at disconnect, for diagnostics only.
    pub fid: u16,
    /// Share-relative wire name, to reopen by.
    pub wire_name: String,
    pub snapshot: StatSnapshot,
}

/// The process-wide durable table.
#[derive(Default)]
pub struct DurableTable {
    records: Mutex<HashMap<u64, DurableRecord>>,
    next_id: AtomicU64,
}

impl DurableTable {
    pub fn new() -> Self {
        DurableTable {
            records: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a durable open and returns its persistent id.
    pub fn register(
        &self,
        session_uid: u16,
        fid: u16,
        wire_name: String,
        snapshot: StatSnapshot,
    ) -> u64 {
        let persistent_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = DurableRecord {
            persistent_id,
            session_uid,
            fid,
            wire_name,
            snapshot,
        };
        self.records.lock().unwrap().insert(persistent_id, record);
        persistent_id
    }

    /// Removes a record on explicit close of the persistent handle.
    pub fn close_persistent(&self, persistent_id: u64) {
        self.records.lock().unwrap().remove(&persistent_id);
    }

    /// Refreshes the stat snapshot at disconnect time, so a later
    /// reconnect validates against the state the client last saw.
    pub fn update_snapshot(&self, persistent_id: u64, snapshot: StatSnapshot) {
        if let Some(record) = self.records.lock().unwrap().get_mut(&persistent_id) {
            record.snapshot = snapshot;
        }
    }

    /// Validates a reconnect: the current stat must match the snapshot in
    /// every field. A mismatch invalidates the record.
    pub fn reconnect(&self, persistent_id: u64, current: StatSnapshot) -> Result<DurableRecord> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get(&persistent_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("durable handle {persistent_id}")))?;
        if record.snapshot != current {
            log::info!(
                "durable handle {persistent_id} invalidated: inode changed since disconnect"
            );
            records.remove(&persistent_id);
            return Err(Error::NotFound(format!("durable handle {persistent_id}")));
        }
        Ok(record)
    }

    /// Drops every record owned by a session that is going away for good.
    pub fn drop_session(&self, session_uid: u16) {
        self.records
            .lock()
            .unwrap()
            .retain(|_, record| record.session_uid != session_uid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> StatSnapshot {
        StatSnapshot {
            dev: 1,
            ino: 2,
            uid: 1000,
            gid: 1000,
            mode: 0o100644,
            size: 10,
            blocks: 8,
            mtime: 100,
            ctime: 100,
            atime: 100,
        }
    }

    #[test]
    fn test_reconnect_matching_snapshot() {
        let table = DurableTable::new();
        let id = table.register(1, 5, "\\f.txt".into(), snapshot());
        let record = table.reconnect(id, snapshot()).unwrap();
        assert_eq!(record.wire_name, "\\f.txt");
    }

    #[test]
    fn test_reconnect_mismatch_invalidates() {
        let table = DurableTable::new();
        let id = table.register(1, 5, "\\f.txt".into(), snapshot());
        let mut changed = snapshot();
        changed.mtime += 1;
        assert!(table.reconnect(id, changed).is_err());
        // The record is gone even for a later, matching attempt.
        assert!(table.reconnect(id, snapshot()).is_err());
    }

    #[test]
    fn test_close_persistent_removes() {
        let table = DurableTable::new();
        let id = table.register(1, 5, "\\f.txt".into(), snapshot());
        table.close_persistent(id);
        assert!(table.reconnect(id, snapshot()).is_err());
    }
}
