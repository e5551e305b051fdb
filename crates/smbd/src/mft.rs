//! The master-file table: per-inode rendezvous of concurrent opens.
//!
//! Keyed by `(device, inode)` so the relation survives renames. Cross-
//! handle semantics (delete-on-close, share modes, lock conflicts between
//! handles) coalesce here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use crate::file::SmbFile;

const MFT_BUCKETS: usize = 16_384;

/// Cross-handle flags of a MasterFile.
#[derive(Debug, Default, Clone, Copy)]
pub struct MasterFlags {
    /// Unlink the path once the last open drops.
    pub delete_on_close: bool,
    /// The pending delete targets an alternate stream, not the file.
    pub delete_on_close_stream: bool,
}

struct MasterInner {
    flags: MasterFlags,
    /// Back-edges to the opens; relation only, iterated under this guard.
    fp_list: Vec<Weak<SmbFile>>,
    /// Current host path, kept fresh across renames for the final unlink.
    path: PathBuf,
}

/// The per-inode record shared by every open of that inode.
pub struct MasterFile {
    pub key: (u64, u64),
    inner: Mutex<MasterInner>,
}

impl MasterFile {
    fn new(key: (u64, u64), path: PathBuf) -> Self {
        MasterFile {
            key,
            inner: Mutex::new(MasterInner {
                flags: MasterFlags::default(),
                fp_list: Vec::new(),
                path,
            }),
        }
    }

    pub fn attach(&self, file: &Arc<SmbFile>) {
        let mut inner = self.inner.lock().unwrap();
        inner.fp_list.push(Arc::downgrade(file));
    }

    pub fn detach(&self, file: &Arc<SmbFile>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .fp_list
            .retain(|weak| weak.upgrade().is_some_and(|f| !Arc::ptr_eq(&f, file)));
    }

    pub fn flags(&self) -> MasterFlags {
        self.inner.lock().unwrap().flags
    }

    pub fn set_delete_on_close(&self, pending: bool, stream: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.flags.delete_on_close = pending;
        inner.flags.delete_on_close_stream = stream;
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().unwrap().path.clone()
    }

    pub fn set_path(&self, path: PathBuf) {
        self.inner.lock().unwrap().path = path;
    }

    /// Snapshot of the live opens of this inode.
    pub fn open_files(&self) -> Vec<Arc<SmbFile>> {
        let inner = self.inner.lock().unwrap();
        inner.fp_list.iter().filter_map(Weak::upgrade).collect()
    }

    /// Number of live opens reachable through the back-edges.
    pub fn open_count(&self) -> usize {
        self.open_files().len()
    }
}

struct Bucket {
    map: Mutex<HashMap<(u64, u64), (Arc<MasterFile>, u32)>>,
}

/// The process-wide `(device, inode)` → [`MasterFile`] map, partitioned
/// into fixed buckets with an xor-mix hash.
pub struct MasterFileTable {
    buckets: Vec<Bucket>,
}

impl Default for MasterFileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterFileTable {
    pub fn new() -> Self {
        MasterFileTable {
            buckets: (0..MFT_BUCKETS)
                .map(|_| Bucket {
                    map: Mutex::new(HashMap::new()),
                })
                .collect(),
        }
    }

    fn bucket(&self, key: (u64, u64)) -> &Bucket {
        let mut h = key.0 ^ key.1;
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
        h ^= h >> 33;
        &self.buckets[(h as usize) % MFT_BUCKETS]
    }

    /// Returns the inode's MasterFile, creating it on first open. The
    /// returned reference counts as one open; pair with [`release`].
    ///
    /// [`release`]: MasterFileTable::release
    pub fn lookup_or_insert(&self, key: (u64, u64), path: PathBuf) -> Arc<MasterFile> {
        let mut map = self.bucket(key).map.lock().unwrap();
        match map.get_mut(&key) {
            Some((master, refcount)) => {
                *refcount += 1;
                master.set_path(path);
                master.clone()
            }
            None => {
                let master = Arc::new(MasterFile::new(key, path));
                map.insert(key, (master.clone(), 1));
                master
            }
        }
    }

    /// Drops one open. At zero the record is removed, and the path is
    /// unlinked when a delete is pending. The unlink happens after the
    /// bucket guard is released; the record is already unreachable then.
    pub fn release(&self, master: &Arc<MasterFile>) -> std::io::Result<()> {
        let last = {
            let mut map = self.bucket(master.key).map.lock().unwrap();
            match map.get_mut(&master.key) {
                Some((_, refcount)) => {
                    *refcount -= 1;
                    if *refcount == 0 {
                        map.remove(&master.key);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if !last {
            return Ok(());
        }

        let flags = master.flags();
        if flags.delete_on_close {
            let path = master.path();
            if flags.delete_on_close_stream {
                // Stream deletes were already applied to the xattr; the
                // file itself stays.
                return Ok(());
            }
            log::debug!("delete-on-close unlink of {}", path.display());
            let meta = std::fs::symlink_metadata(&path)?;
            if meta.is_dir() {
                std::fs::remove_dir(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Looks up an existing record without affecting the open count.
    pub fn peek(&self, key: (u64, u64)) -> Option<Arc<MasterFile>> {
        let map = self.bucket(key).map.lock().unwrap();
        map.get(&key).map(|(master, _)| master.clone())
    }

    /// Current paths of every live record.
    pub fn paths_snapshot(&self) -> Vec<PathBuf> {
        self.buckets
            .iter()
            .flat_map(|bucket| {
                let map = bucket.map.lock().unwrap();
                map.values().map(|(master, _)| master.path()).collect::<Vec<_>>()
            })
            .collect()
    }

    /// Whether any live open sits strictly under `dir`. Rename of a
    /// directory refuses while this holds.
    pub fn any_open_under(&self, dir: &std::path::Path) -> bool {
        self.paths_snapshot()
            .iter()
            .any(|path| path != dir && path.starts_with(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_master_per_inode() {
        let mft = MasterFileTable::new();
        let a = mft.lookup_or_insert((1, 42), PathBuf::from("/tmp/a"));
        let b = mft.lookup_or_insert((1, 42), PathBuf::from("/tmp/a"));
        assert!(Arc::ptr_eq(&a, &b));
        let other = mft.lookup_or_insert((1, 43), PathBuf::from("/tmp/b"));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_release_removes_at_zero() {
        let mft = MasterFileTable::new();
        let key = (2, 7);
        let a = mft.lookup_or_insert(key, PathBuf::from("/tmp/x"));
        let _b = mft.lookup_or_insert(key, PathBuf::from("/tmp/x"));
        mft.release(&a).unwrap();
        assert!(mft.peek(key).is_some());
        mft.release(&a).unwrap();
        assert!(mft.peek(key).is_none());
    }

    #[test]
    fn test_delete_on_close_unlinks_at_last_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doomed.txt");
        std::fs::write(&path, b"bye").unwrap();

        let mft = MasterFileTable::new();
        let key = (3, 9);
        let first = mft.lookup_or_insert(key, path.clone());
        let _second = mft.lookup_or_insert(key, path.clone());
        first.set_delete_on_close(true, false);

        mft.release(&first).unwrap();
        assert!(path.exists(), "file must survive the first close");
        mft.release(&first).unwrap();
        assert!(!path.exists(), "file must be unlinked at the last close");
    }
}
