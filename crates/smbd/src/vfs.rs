//! The VFS adapter: a thin, semantically defined boundary around the host
//! filesystem, scoped to one share root.
//!
//! Wire paths come in `\`-separated and share-relative; every entry point
//! resolves them against the root with traversal components rejected.
//! Alternate data streams live in `user.stream:<name>` xattrs; DOS
//! attributes and creation times in `user.dos_attr` / `user.creation_time`
//! when the share enables `store_dos_attr`.

use std::fs::OpenOptions;
use std::os::unix::fs::{FileExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use smbd_dtyp::binrw_util::prelude::FileTime;
use smbd_fscc::DosAttributes;

use crate::file::SmbFile;
use crate::mft::MasterFileTable;
use crate::name::sanitize_wire_path;
use crate::oplock::OplockBroker;
use crate::{Error, Result};

/// Xattr namespace of alternate data streams.
pub const STREAM_PREFIX: &str = "user.stream:";
/// Xattr carrying the DOS attribute bits.
pub const DOS_ATTR_XATTR: &str = "user.dos_attr";
/// Xattr carrying the 64-bit FILETIME creation stamp.
pub const CREATION_TIME_XATTR: &str = "user.creation_time";
/// Upper bound of one xattr value on the host; stream writes truncate to
/// it rather than fail.
pub const XATTR_SIZE_MAX: usize = 65_536;

/// Attribute changes accepted by [`Vfs::setattr`].
#[derive(Debug, Default, Clone)]
pub struct SetAttrs {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
}

/// The share-scoped filesystem boundary.
pub struct Vfs {
    root: PathBuf,
    store_dos_attr: bool,
    oplocks: Arc<dyn OplockBroker>,
    mft: Arc<MasterFileTable>,
}

impl Vfs {
    pub fn new(
        root: PathBuf,
        store_dos_attr: bool,
        oplocks: Arc<dyn OplockBroker>,
        mft: Arc<MasterFileTable>,
    ) -> Self {
        Vfs {
            root,
            store_dos_attr,
            oplocks,
            mft,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a wire path to its local path. No existence check.
    pub fn resolve(&self, wire: &str) -> Result<PathBuf> {
        let relative = sanitize_wire_path(wire)?;
        Ok(self.root.join(relative))
    }

    /// Maps a wire path to an existing local path, retrying component by
    /// component case-insensitively when `caseless` is set.
    pub fn resolve_existing(&self, wire: &str, caseless: bool) -> Result<PathBuf> {
        let exact = self.resolve(wire)?;
        if exact.symlink_metadata().is_ok() || !caseless {
            return Ok(exact);
        }

        let relative = sanitize_wire_path(wire)?;
        let mut current = self.root.clone();
        for component in relative.split('/').filter(|c| !c.is_empty()) {
            let direct = current.join(component);
            if direct.symlink_metadata().is_ok() {
                current = direct;
                continue;
            }
            let found = std::fs::read_dir(&current)
                .map_err(|e| Error::from_io_for(wire, e))?
                .filter_map(|entry| entry.ok())
                .find(|entry| {
                    entry
                        .file_name()
                        .to_string_lossy()
                        .eq_ignore_ascii_case(component)
                });
            match found {
                Some(entry) => current = entry.path(),
                None => return Err(Error::NotFound(wire.to_string())),
            }
        }
        Ok(current)
    }

    pub fn metadata(&self, path: &Path) -> Result<std::fs::Metadata> {
        path.symlink_metadata()
            .map_err(|e| Error::from_io_for(&path.to_string_lossy(), e))
    }

    /// Opens an existing file for data access.
    pub fn open(&self, path: &Path, write: bool) -> Result<std::fs::File> {
        OpenOptions::new()
            .read(true)
            .write(write)
            .open(path)
            .map_err(|e| Error::from_io_for(&path.to_string_lossy(), e))
    }

    /// Fails when any lock on the inode conflicts with the given access.
    ///
    /// A write lock held by another handle conflicts with everything in
    /// range; a read lock conflicts with writes.
    pub fn check_lock_range(
        &self,
        file: &SmbFile,
        offset: u64,
        count: u64,
        is_write: bool,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let end = offset.saturating_add(count - 1);
        for holder in file.master.open_files() {
            let same_handle = holder.fid == file.fid && holder.session_uid == file.session_uid;
            let inner = holder.inner.lock().unwrap();
            for lock in &inner.locks {
                if !lock.overlaps(offset, end) {
                    continue;
                }
                if !lock.shared && !same_handle {
                    return Err(Error::LockConflict(lock.start, lock.end));
                }
                if lock.shared && is_write {
                    return Err(Error::LockConflict(lock.start, lock.end));
                }
            }
        }
        Ok(())
    }

    /// Reads at an explicit offset, honoring byte-range locks and stream
    /// redirection. A zero-byte read succeeds with no data.
    pub fn read(&self, file: &SmbFile, offset: u64, count: u32) -> Result<Vec<u8>> {
        self.check_lock_range(file, offset, count.into(), false)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        if let Some(xattr_name) = &file.stream_xattr {
            let value = self.get_xattr(&file.host_path, xattr_name)?.unwrap_or_default();
            let start = (offset as usize).min(value.len());
            let end = (start + count as usize).min(value.len());
            return Ok(value[start..end].to_vec());
        }

        let host = file
            .host
            .as_ref()
            .ok_or_else(|| Error::fault("data read on a handle with no descriptor"))?;
        let mut buffer = vec![0u8; count as usize];
        let mut filled = 0usize;
        while filled < buffer.len() {
            match host.read_at(&mut buffer[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    /// Writes at an explicit offset. Level-2 oplocks on the inode are
    /// broken first; stream writes land in the backing xattr, truncated to
    /// the xattr value cap rather than refused.
    pub fn write(&self, file: &SmbFile, offset: u64, data: &[u8]) -> Result<u64> {
        self.check_lock_range(file, offset, data.len() as u64, true)?;
        self.oplocks.break_all_level2(file.inode_key());
        if data.is_empty() {
            return Ok(0);
        }

        if let Some(xattr_name) = &file.stream_xattr {
            let mut value = self.get_xattr(&file.host_path, xattr_name)?.unwrap_or_default();
            let offset = offset as usize;
            let mut end = offset.saturating_add(data.len());
            let mut written = data.len();
            if end > XATTR_SIZE_MAX {
                end = XATTR_SIZE_MAX;
                written = end.saturating_sub(offset);
            }
            if written == 0 {
                return Ok(0);
            }
            if value.len() < end {
                value.resize(end, 0);
            }
            value[offset..end].copy_from_slice(&data[..written]);
            self.set_xattr(&file.host_path, xattr_name, &value)?;
            return Ok(written as u64);
        }

        let host = file
            .host
            .as_ref()
            .ok_or_else(|| Error::fault("data write on a handle with no descriptor"))?;
        host.write_all_at(data, offset)?;
        Ok(data.len() as u64)
    }

    pub fn flush(&self, file: &SmbFile) -> Result<()> {
        if let Some(host) = &file.host {
            host.sync_all()?;
        }
        Ok(())
    }

    /// Applies attribute changes with the documented sanitization:
    /// permission updates keep the non-permission mode bits, an ownership
    /// change strips setuid/setgid, and truncation re-checks byte-range
    /// locks over the cut range. ctime moves implicitly with every change.
    pub fn setattr(&self, path: &Path, file: Option<&SmbFile>, attrs: &SetAttrs) -> Result<()> {
        let meta = self.metadata(path)?;

        if let Some(size) = attrs.size {
            if let Some(file) = file {
                self.check_lock_range(file, size, u64::MAX - size, true)?;
            }
            let handle = self.open(path, true)?;
            handle.set_len(size)?;
        }

        if attrs.uid.is_some() || attrs.gid.is_some() {
            std::os::unix::fs::chown(path, attrs.uid, attrs.gid)?;
        }

        if let Some(mode) = attrs.mode {
            let mut mode = (meta.mode() & !0o7777) | (mode & 0o7777);
            if attrs.uid.is_some() || attrs.gid.is_some() {
                mode &= !0o6000;
            }
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        }

        if attrs.atime.is_some() || attrs.mtime.is_some() {
            let mut times = std::fs::FileTimes::new();
            if let Some(atime) = attrs.atime {
                times = times.set_accessed(atime);
            }
            if let Some(mtime) = attrs.mtime {
                times = times.set_modified(mtime);
            }
            let handle = OpenOptions::new().read(true).open(path)?;
            handle.set_times(times)?;
        }
        Ok(())
    }

    /// Renames within the share. Both endpoints must be on one mount, and
    /// a directory with any child currently open refuses to move.
    pub fn rename(&self, old: &Path, new: &Path) -> Result<()> {
        let old_meta = self.metadata(old)?;
        if let Some(new_parent) = new.parent() {
            let parent_meta = self.metadata(new_parent)?;
            if parent_meta.dev() != old_meta.dev() {
                return Err(Error::CrossDevice);
            }
        }
        if old_meta.is_dir() && self.mft.any_open_under(old) {
            return Err(Error::AccessDenied(
                "directory has open children and cannot be renamed",
            ));
        }
        std::fs::rename(old, new).map_err(|e| {
            if e.kind() == std::io::ErrorKind::CrossesDevices {
                Error::CrossDevice
            } else {
                Error::from_io_for(&old.to_string_lossy(), e)
            }
        })?;
        if let Some(master) = self.mft.peek((old_meta.dev(), old_meta.ino())) {
            master.set_path(new.to_path_buf());
        }
        Ok(())
    }

    pub fn unlink(&self, path: &Path) -> Result<()> {
        let meta = self.metadata(path)?;
        if meta.is_dir() {
            return Err(Error::IsDirectory);
        }
        std::fs::remove_file(path).map_err(|e| Error::from_io_for(&path.to_string_lossy(), e))
    }

    pub fn mkdir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir(path).map_err(|e| Error::from_io_for(&path.to_string_lossy(), e))
    }

    pub fn rmdir(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::DirectoryNotEmpty {
                Error::DirectoryNotEmpty
            } else {
                Error::from_io_for(&path.to_string_lossy(), e)
            }
        })
    }

    pub fn symlink(&self, target: &str, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, link)
            .map_err(|e| Error::from_io_for(&link.to_string_lossy(), e))
    }

    pub fn readlink(&self, path: &Path) -> Result<String> {
        let target = std::fs::read_link(path)
            .map_err(|e| Error::from_io_for(&path.to_string_lossy(), e))?;
        Ok(target.to_string_lossy().into_owned())
    }

    pub fn hardlink(&self, original: &Path, link: &Path) -> Result<()> {
        std::fs::hard_link(original, link)
            .map_err(|e| Error::from_io_for(&link.to_string_lossy(), e))
    }

    // Xattr plumbing. The crate performs the size-probe-then-fetch dance
    // internally; callers see the final buffer.

    pub fn get_xattr(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
        match xattr::get(path, name) {
            Ok(value) => Ok(value),
            Err(e) if e.raw_os_error() == Some(libc::ENODATA) => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn set_xattr(&self, path: &Path, name: &str, value: &[u8]) -> Result<()> {
        xattr::set(path, name, value).map_err(Error::Io)
    }

    pub fn remove_xattr(&self, path: &Path, name: &str) -> Result<()> {
        xattr::remove(path, name).map_err(Error::Io)
    }

    pub fn list_xattr(&self, path: &Path) -> Result<Vec<String>> {
        Ok(xattr::list(path)
            .map_err(Error::Io)?
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    /// Names of the alternate data streams attached to a path.
    pub fn list_streams(&self, path: &Path) -> Result<Vec<String>> {
        Ok(self
            .list_xattr(path)?
            .into_iter()
            .filter_map(|name| name.strip_prefix(STREAM_PREFIX).map(str::to_string))
            .collect())
    }

    /// Drops every stream xattr; backs delete-on-close of a stream open.
    pub fn remove_all_stream_xattrs(&self, path: &Path) -> Result<()> {
        for name in self.list_xattr(path)? {
            if name.starts_with(STREAM_PREFIX) {
                self.remove_xattr(path, &name)?;
            }
        }
        Ok(())
    }

    /// Xattrs that are plain EAs rather than stream or bookkeeping slots.
    pub fn list_plain_xattrs(&self, path: &Path) -> Result<Vec<String>> {
        Ok(self
            .list_xattr(path)?
            .into_iter()
            .filter(|name| {
                name.starts_with("user.")
                    && !name.starts_with(STREAM_PREFIX)
                    && name != DOS_ATTR_XATTR
                    && name != CREATION_TIME_XATTR
            })
            .collect())
    }

    /// Stored DOS attributes, when the share keeps them.
    pub fn dos_attributes(&self, path: &Path) -> Result<Option<DosAttributes>> {
        if !self.store_dos_attr {
            return Ok(None);
        }
        Ok(self.get_xattr(path, DOS_ATTR_XATTR)?.and_then(|value| {
            let bytes: [u8; 2] = value.get(0..2)?.try_into().ok()?;
            Some(DosAttributes::from_value(u16::from_le_bytes(bytes)))
        }))
    }

    pub fn set_dos_attributes(&self, path: &Path, attrs: DosAttributes) -> Result<()> {
        if !self.store_dos_attr {
            return Ok(());
        }
        self.set_xattr(path, DOS_ATTR_XATTR, &attrs.value().to_le_bytes())
    }

    /// Stored creation time, when the share keeps it.
    pub fn creation_time(&self, path: &Path) -> Result<Option<FileTime>> {
        if !self.store_dos_attr {
            return Ok(None);
        }
        Ok(self.get_xattr(path, CREATION_TIME_XATTR)?.and_then(|value| {
            let bytes: [u8; 8] = value.get(0..8)?.try_into().ok()?;
            Some(FileTime {
                ticks: u64::from_le_bytes(bytes),
            })
        }))
    }

    pub fn set_creation_time(&self, path: &Path, time: FileTime) -> Result<()> {
        if !self.store_dos_attr {
            return Ok(());
        }
        self.set_xattr(path, CREATION_TIME_XATTR, &time.ticks.to_le_bytes())
    }

    /// statvfs of the share root, for QUERY_FS_INFORMATION.
    pub fn statfs(&self) -> Result<nix::sys::statvfs::Statvfs> {
        nix::sys::statvfs::statvfs(&self.root)
            .map_err(|errno| Error::Io(std::io::Error::from_raw_os_error(errno as i32)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileLock;
    use crate::file::tests::open_file_for_tests;
    use crate::oplock::NullOplockBroker;

    fn vfs_at(root: &Path) -> Vfs {
        Vfs::new(
            root.to_path_buf(),
            true,
            Arc::new(NullOplockBroker),
            Arc::new(MasterFileTable::new()),
        )
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_at(dir.path());
        assert!(vfs.resolve("\\..\\etc\\passwd").is_err());
        assert_eq!(vfs.resolve("\\a\\b.txt").unwrap(), dir.path().join("a/b.txt"));
    }

    #[test]
    fn test_caseless_resolution() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Docs")).unwrap();
        std::fs::write(dir.path().join("Docs/File.TXT"), b"x").unwrap();
        let vfs = vfs_at(dir.path());
        let found = vfs.resolve_existing("\\docs\\file.txt", true).unwrap();
        assert_eq!(found, dir.path().join("Docs/File.TXT"));
    }

    #[test]
    fn test_lock_conflict_blocks_overlapping_read() {
        let file = open_file_for_tests();
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_at(dir.path());

        // An exclusive lock held by another handle over [0,9].
        let other = open_file_for_tests();
        // Rebind both files onto one inode via the same master: simulate by
        // putting the lock on the same file's master.
        file.inner.lock().unwrap().locks.push(FileLock {
            start: 0,
            end: 9,
            shared: false,
            pid: 1,
        });
        drop(other);

        // Same handle: its own exclusive lock does not block it.
        assert!(vfs.check_lock_range(&file, 5, 2, false).is_ok());

        // A shared lock conflicts with writes, even from the same handle.
        file.inner.lock().unwrap().locks.clear();
        file.inner.lock().unwrap().locks.push(FileLock {
            start: 0,
            end: 9,
            shared: true,
            pid: 1,
        });
        assert!(vfs.check_lock_range(&file, 5, 2, true).is_err());
        assert!(vfs.check_lock_range(&file, 10, 5, true).is_ok());
    }

    #[test]
    fn test_stream_write_truncates_at_cap() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_at(dir.path());
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"base").unwrap();

        // A stream handle over the file.
        let mut file = open_file_for_tests();
        {
            let file_mut = Arc::get_mut(&mut file);
            // open_file_for_tests hands us a fresh Arc; no other refs yet.
            let file_mut = file_mut.unwrap();
            file_mut.host_path = path.clone();
            file_mut.stream_xattr = Some(format!("{STREAM_PREFIX}tag"));
        }

        if vfs.set_xattr(&path, "user.smbd_probe", b"1").is_err() {
            // Filesystem without user xattrs; nothing further to verify here.
            return;
        }

        let written = vfs
            .write(&file, (XATTR_SIZE_MAX - 2) as u64, b"abcdef")
            .unwrap();
        assert_eq!(written, 2);
        let value = vfs
            .get_xattr(&path, &format!("{STREAM_PREFIX}tag"))
            .unwrap()
            .unwrap();
        assert_eq!(value.len(), XATTR_SIZE_MAX);
        assert_eq!(&value[XATTR_SIZE_MAX - 2..], b"ab");
    }

    #[test]
    fn test_zero_byte_read() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_at(dir.path());
        let file = open_file_for_tests();
        assert_eq!(vfs.read(&file, 0, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_setattr_strips_setuid_on_chown() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_at(dir.path());
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        let attrs = SetAttrs {
            mode: Some(0o6755),
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
            ..Default::default()
        };
        vfs.setattr(&path, None, &attrs).unwrap();
        let mode = std::fs::metadata(&path).unwrap().mode();
        assert_eq!(mode & 0o7777, 0o755);
    }

    #[test]
    fn test_dos_attr_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = vfs_at(dir.path());
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let attrs = DosAttributes::new().with_hidden(true).with_archive(true);
        if vfs.set_dos_attributes(&path, attrs).is_err() {
            return; // no user-xattr support on this filesystem
        }
        assert_eq!(vfs.dos_attributes(&path).unwrap(), Some(attrs));
    }
}
