//! Per-open file state.
//!
//! One [`SmbFile`] exists per handle a client holds. Concurrent opens of
//! the same inode meet in a shared [`crate::mft::MasterFile`]. Teardown
//! uses the NEW/READY/FREEING tag plus a refcount and notify, so a closer
//! waits for in-flight users without a global lock.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use smbd_dtyp::security::AccessMask;
use tokio::sync::Notify;

use crate::dirent::DirEntryBuffer;
use crate::mft::MasterFile;
use crate::oplock::OplockLevel;

/// Lifecycle tag of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileState {
    /// Allocated but not yet published.
    New = 0,
    /// Published and usable.
    Ready = 1,
    /// Being torn down; lookups must fail.
    Freeing = 2,
}

/// One byte range locked on a handle. `start..=end`, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLock {
    pub start: u64,
    pub end: u64,
    pub shared: bool,
    /// Client process id that established the lock.
    pub pid: u16,
}

impl FileLock {
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start <= end && start <= self.end
    }
}

/// The mutable interior of an open file.
#[derive(Default)]
pub struct FileInner {
    /// Byte-range locks held by this handle.
    pub locks: Vec<FileLock>,
    /// Readdir cursor of directory handles.
    pub dir_buffer: Option<DirEntryBuffer>,
    /// Pattern of the search this handle backs, for FIND_NEXT.
    pub search_pattern: Option<String>,
    /// Implicit position maintained by SMB_COM_SEEK.
    pub position: u64,
}

/// One open handle.
pub struct SmbFile {
    /// Volatile FID as handed to the client.
    pub fid: u16,
    /// Persistent id of durable handles.
    pub persistent_id: Option<u64>,
    /// Owning session and tree.
    pub session_uid: u16,
    pub tid: u16,

    /// Absolute host path at open time; renames keep the MasterFile's copy
    /// current instead.
    pub host_path: PathBuf,
    /// Share-relative wire name the handle was opened by.
    pub wire_name: String,

    /// Open host descriptor; absent for directories and IPC pipes.
    pub host: Option<std::fs::File>,

    /// Granted access rights.
    pub access: AccessMask,
    pub is_directory: bool,
    /// Alternate-data-stream opens carry the backing xattr name.
    pub stream_xattr: Option<String>,
    pub is_durable: bool,
    /// Opened through NT_CREATE (as opposed to the legacy opens).
    pub is_nt_open: bool,
    pub oplock: OplockLevel,
    /// Pipe kind for IPC$ opens.
    pub pipe: Option<crate::pipe::PipeKind>,

    pub master: Arc<MasterFile>,

    state: AtomicU8,
    refcount: AtomicU32,
    unused: Notify,
    pub inner: Mutex<FileInner>,
}

impl SmbFile {
    pub fn state(&self) -> FileState {
        match self.state.load(Ordering::Acquire) {
            0 => FileState::New,
            1 => FileState::Ready,
            _ => FileState::Freeing,
        }
    }

    pub fn set_state(&self, state: FileState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn acquire_use(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_use(&self) {
        if self.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.unused.notify_waiters();
        }
    }

    /// Waits until no [`FileRef`] is outstanding.
    pub async fn wait_unused(&self) {
        loop {
            let notified = self.unused.notified();
            if self.refcount.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// The `(device, inode)` key of the backing inode.
    pub fn inode_key(&self) -> (u64, u64) {
        self.master.key
    }
}

/// A usage-counted reference to an open file, handed out by
/// [`crate::fidtable::FidTable::lookup`]. Dropping it releases the use and
/// wakes a pending teardown.
pub struct FileRef {
    file: Arc<SmbFile>,
}

impl FileRef {
    pub(crate) fn acquire(file: Arc<SmbFile>) -> Self {
        file.acquire_use();
        FileRef { file }
    }

    pub fn arc(&self) -> &Arc<SmbFile> {
        &self.file
    }
}

impl std::ops::Deref for FileRef {
    type Target = SmbFile;

    fn deref(&self) -> &Self::Target {
        &self.file
    }
}

impl Drop for FileRef {
    fn drop(&mut self) {
        self.file.release_use();
    }
}

/// Builder for [`SmbFile`]; the open paths fill in what applies.
pub struct SmbFileBuilder {
    pub fid: u16,
    pub persistent_id: Option<u64>,
    pub session_uid: u16,
    pub tid: u16,
    pub host_path: PathBuf,
    pub wire_name: String,
    pub host: Option<std::fs::File>,
    pub access: AccessMask,
    pub is_directory: bool,
    pub stream_xattr: Option<String>,
    pub is_durable: bool,
    pub is_nt_open: bool,
    pub oplock: OplockLevel,
    pub pipe: Option<crate::pipe::PipeKind>,
    pub master: Arc<MasterFile>,
}

impl SmbFileBuilder {
    pub fn build(self) -> Arc<SmbFile> {
        let file = Arc::new(SmbFile {
            fid: self.fid,
            persistent_id: self.persistent_id,
            session_uid: self.session_uid,
            tid: self.tid,
            host_path: self.host_path,
            wire_name: self.wire_name,
            host: self.host,
            access: self.access,
            is_directory: self.is_directory,
            stream_xattr: self.stream_xattr,
            is_durable: self.is_durable,
            is_nt_open: self.is_nt_open,
            oplock: self.oplock,
            pipe: self.pipe,
            master: self.master,
            state: AtomicU8::new(FileState::New as u8),
            refcount: AtomicU32::new(0),
            unused: Notify::new(),
            inner: Mutex::new(FileInner::default()),
        });
        file.master.attach(&file);
        file
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::mft::MasterFileTable;

    /// A detached file over a synthetic inode, for table tests.
    pub fn open_file_for_tests() -> Arc<SmbFile> {
        static MFT: std::sync::OnceLock<MasterFileTable> = std::sync::OnceLock::new();
        static NEXT_INO: AtomicU32 = AtomicU32::new(1);
        let mft = MFT.get_or_init(MasterFileTable::new);
        let ino = NEXT_INO.fetch_add(1, Ordering::Relaxed) as u64;
        let master = mft.lookup_or_insert((0, ino), PathBuf::from("/nonexistent"));
        let file = SmbFileBuilder {
            fid: 0,
            persistent_id: None,
            session_uid: 1,
            tid: 1,
            host_path: PathBuf::from("/nonexistent"),
            wire_name: "\\test".to_string(),
            host: None,
            access: AccessMask::new(),
            is_directory: false,
            stream_xattr: None,
            is_durable: false,
            is_nt_open: true,
            oplock: OplockLevel::None,
            pipe: None,
            master,
        }
        .build();
        file.set_state(FileState::Ready);
        file
    }

    #[test]
    fn test_lock_overlap() {
        let lock = FileLock {
            start: 10,
            end: 19,
            shared: false,
            pid: 1,
        };
        assert!(lock.overlaps(0, 10));
        assert!(lock.overlaps(19, 30));
        assert!(lock.overlaps(12, 15));
        assert!(!lock.overlaps(20, 25));
        assert!(!lock.overlaps(0, 9));
    }

    #[tokio::test]
    async fn test_refcount_gates_wait_unused() {
        let file = open_file_for_tests();
        let r1 = FileRef::acquire(file.clone());
        let r2 = FileRef::acquire(file.clone());
        drop(r1);

        let waiter = {
            let file = file.clone();
            tokio::spawn(async move { file.wait_unused().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        drop(r2);
        waiter.await.unwrap();
    }
}
