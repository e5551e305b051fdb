//! The directory enumeration engine behind TRANS2 FIND_FIRST2/FIND_NEXT2.
//!
//! A directory handle owns a [`DirEntryBuffer`]: a bounded batch of raw
//! dirents pulled from the host directory stream, with a consume cursor
//! that can step back one entry when a serialized record does not fit the
//! client's buffer. FIND_NEXT resumes exactly where the previous call
//! rewound.

use std::io::Cursor;
use std::os::unix::fs::{DirEntryExt, MetadataExt};
use std::path::Path;

use binrw::BinWrite;

use smbd_dtyp::binrw_util::prelude::FileTime;
use smbd_fscc::{
    FileAttributes, FileUnixBasicInfo, FindFileBothDirectoryInfo, FindFileDirectoryInfo,
    FindFileFullDirectoryInfo, FindFileIdBothDirectoryInfo, FindFileIdFullDirectoryInfo,
    FindFileNamesInfo, FindFileUnixInfo, FindInformationLevel, UnixFileType,
};

use crate::name::{short_name_for, wildcard_match};
use crate::vfs::Vfs;
use crate::{Error, Result};

/// Target fill of one buffer refill, in raw name bytes.
const PAGE_SIZE: usize = 4096;

/// Alignment between serialized entries.
const ENTRY_ALIGN: usize = 8;

/// One raw directory entry as produced by a refill.
#[derive(Debug, Clone)]
pub struct RawDirent {
    pub name: String,
    pub ino: u64,
    pub is_dir: bool,
}

/// The per-directory-handle enumeration state.
pub struct DirEntryBuffer {
    stream: Option<std::fs::ReadDir>,
    /// Synthetic `.`/`..` entries still to emit before the stream.
    synthetic: Vec<RawDirent>,
    entries: Vec<RawDirent>,
    /// Consume cursor into `entries`.
    pos: usize,
    /// The host stream is exhausted.
    exhausted: bool,
    started: bool,
}

impl Default for DirEntryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DirEntryBuffer {
    pub fn new() -> Self {
        DirEntryBuffer {
            stream: None,
            synthetic: Vec::new(),
            entries: Vec::new(),
            pos: 0,
            exhausted: false,
            started: false,
        }
    }

    /// Refills the batch from the host stream. An empty refill means the
    /// end of the directory.
    fn refill(&mut self, dir: &Path) -> Result<()> {
        if !self.started {
            self.started = true;
            let meta = dir.symlink_metadata()?;
            self.synthetic = vec![
                RawDirent {
                    name: ".".to_string(),
                    ino: meta.ino(),
                    is_dir: true,
                },
                RawDirent {
                    name: "..".to_string(),
                    ino: meta.ino(),
                    is_dir: true,
                },
            ];
            self.stream = Some(std::fs::read_dir(dir)?);
        }

        self.entries.clear();
        self.pos = 0;

        self.entries.append(&mut self.synthetic);
        let mut filled: usize = self.entries.iter().map(|e| e.name.len()).sum();

        let Some(stream) = self.stream.as_mut() else {
            self.exhausted = true;
            return Ok(());
        };
        while filled < PAGE_SIZE {
            match stream.next() {
                Some(entry) => {
                    let entry = entry?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let file_type = entry.file_type()?;
                    filled += name.len();
                    self.entries.push(RawDirent {
                        name,
                        ino: entry.ino(),
                        is_dir: file_type.is_dir(),
                    });
                }
                None => {
                    self.exhausted = true;
                    self.stream = None;
                    break;
                }
            }
        }
        Ok(())
    }

    /// The next raw entry, refilling as needed; `None` at end of
    /// directory.
    fn next(&mut self, dir: &Path) -> Result<Option<RawDirent>> {
        if self.pos == self.entries.len() {
            if self.exhausted {
                return Ok(None);
            }
            self.refill(dir)?;
            if self.entries.is_empty() {
                return Ok(None);
            }
        }
        let entry = self.entries[self.pos].clone();
        self.pos += 1;
        Ok(Some(entry))
    }

    /// Steps the cursor back over the entry just consumed, so the next
    /// call resumes with it.
    fn rewind_one(&mut self) {
        debug_assert!(self.pos > 0, "rewind with nothing consumed");
        self.pos = self.pos.saturating_sub(1);
    }
}

/// Result of one [`emit_next_batch`] call.
pub struct BatchResult {
    pub entries_written: u16,
    /// The enumeration reached the end of the directory.
    pub ended: bool,
    /// Offset in the emitted data of the last entry's name field.
    pub last_name_offset: u16,
    pub data: Vec<u8>,
}

/// Serializes up to `max_entries` records (bounded by `max_bytes` of
/// output) for the given info level. Non-matching names are skipped when a
/// pattern is given; an entry that no longer fits rewinds the cursor so
/// FIND_NEXT resumes with it.
#[allow(clippy::too_many_arguments)]
pub fn emit_next_batch(
    vfs: &Vfs,
    buffer: &mut DirEntryBuffer,
    dir: &Path,
    level: FindInformationLevel,
    pattern: Option<&str>,
    max_entries: u16,
    max_bytes: usize,
    unicode: bool,
) -> Result<BatchResult> {
    let mut out = Vec::new();
    let mut written: u16 = 0;
    let mut last_entry_start = 0usize;
    let mut prev_offset_slot: Option<usize> = None;
    let mut ended = false;

    while written < max_entries {
        let Some(dirent) = buffer.next(dir)? else {
            ended = true;
            break;
        };
        if let Some(pattern) = pattern {
            if !wildcard_match(pattern, &dirent.name) {
                continue;
            }
        }

        let record = match serialize_entry(vfs, dir, &dirent, level, unicode) {
            Ok(record) => record,
            Err(Error::NotFound(_)) => continue, // raced with an unlink
            Err(e) => return Err(e),
        };

        // Alignment pad lands before the entry, so the last entry never
        // trails padding.
        let aligned_start = if out.is_empty() {
            0
        } else {
            out.len().next_multiple_of(ENTRY_ALIGN)
        };
        if aligned_start + 4 + record.len() > max_bytes {
            if written == 0 {
                return Err(Error::InvalidParameter("FIND buffer below one entry"));
            }
            buffer.rewind_one();
            break;
        }
        out.resize(aligned_start, 0);
        if let Some(slot) = prev_offset_slot {
            let delta = (aligned_start - last_entry_start) as u32;
            out[slot..slot + 4].copy_from_slice(&delta.to_le_bytes());
        }
        last_entry_start = aligned_start;
        prev_offset_slot = Some(aligned_start);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&record);
        written += 1;
    }

    let name_offset = level_name_offset(level);
    Ok(BatchResult {
        entries_written: written,
        ended,
        last_name_offset: (last_entry_start + name_offset) as u16,
        data: out,
    })
}

fn level_name_offset(level: FindInformationLevel) -> usize {
    match level {
        FindInformationLevel::Directory => FindFileDirectoryInfo::NAME_OFFSET,
        FindInformationLevel::FullDirectory => FindFileFullDirectoryInfo::NAME_OFFSET,
        FindInformationLevel::Names => FindFileNamesInfo::NAME_OFFSET,
        FindInformationLevel::BothDirectory => FindFileBothDirectoryInfo::NAME_OFFSET,
        FindInformationLevel::IdFullDirectory => FindFileIdFullDirectoryInfo::NAME_OFFSET,
        FindInformationLevel::IdBothDirectory => FindFileIdBothDirectoryInfo::NAME_OFFSET,
        FindInformationLevel::Unix => FindFileUnixInfo::NAME_OFFSET,
    }
}

/// Stat-derived fields shared by the NT-style entry records.
struct EntryStat {
    creation_time: FileTime,
    last_access_time: FileTime,
    last_write_time: FileTime,
    change_time: FileTime,
    end_of_file: u64,
    allocation_size: u64,
    attributes: FileAttributes,
    meta: std::fs::Metadata,
}

fn stat_entry(vfs: &Vfs, dir: &Path, dirent: &RawDirent) -> Result<EntryStat> {
    let path = dir.join(&dirent.name);
    let meta = path
        .symlink_metadata()
        .map_err(|e| Error::from_io_for(&dirent.name, e))?;

    let mut attributes = FileAttributes::new();
    if meta.is_dir() {
        attributes.set_directory(true);
    } else {
        attributes.set_archive(true);
    }
    if dirent.name.starts_with('.') && dirent.name != "." && dirent.name != ".." {
        attributes.set_hidden(true);
    }
    if meta.mode() & 0o200 == 0 {
        attributes.set_readonly(true);
    }
    if let Some(stored) = vfs.dos_attributes(&path)? {
        let stored: FileAttributes = stored.into();
        attributes = FileAttributes::from_value(
            attributes.value() | (stored.value() & !FileAttributes::new().with_directory(true).value()),
        );
    }

    let change_time = FileTime::from_unix(meta.ctime(), meta.ctime_nsec() as u32);
    let creation_time = vfs.creation_time(&path)?.unwrap_or(change_time);

    Ok(EntryStat {
        creation_time,
        last_access_time: FileTime::from_unix(meta.atime(), meta.atime_nsec() as u32),
        last_write_time: FileTime::from_unix(meta.mtime(), meta.mtime_nsec() as u32),
        change_time,
        end_of_file: meta.size(),
        allocation_size: meta.blocks() * 512,
        attributes,
        meta,
    })
}

fn serialize_entry(
    vfs: &Vfs,
    dir: &Path,
    dirent: &RawDirent,
    level: FindInformationLevel,
    unicode: bool,
) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());

    match level {
        FindInformationLevel::Names => {
            FindFileNamesInfo {
                file_index: 0,
                file_name: dirent.name.as_str().into(),
            }
            .write_args(&mut cursor, (unicode,))?;
        }
        FindInformationLevel::Unix => {
            let stat = stat_entry(vfs, dir, dirent)?;
            FindFileUnixInfo {
                resume_key: 0,
                basic: unix_basic_from_meta(&stat.meta),
                file_name: dirent.name.as_str().into(),
            }
            .write_args(&mut cursor, (unicode,))?;
        }
        FindInformationLevel::Directory => {
            let stat = stat_entry(vfs, dir, dirent)?;
            FindFileDirectoryInfo {
                file_index: 0,
                creation_time: stat.creation_time,
                last_access_time: stat.last_access_time,
                last_write_time: stat.last_write_time,
                change_time: stat.change_time,
                end_of_file: stat.end_of_file,
                allocation_size: stat.allocation_size,
                ext_file_attributes: stat.attributes,
                file_name: dirent.name.as_str().into(),
            }
            .write_args(&mut cursor, (unicode,))?;
        }
        FindInformationLevel::FullDirectory => {
            let stat = stat_entry(vfs, dir, dirent)?;
            FindFileFullDirectoryInfo {
                file_index: 0,
                creation_time: stat.creation_time,
                last_access_time: stat.last_access_time,
                last_write_time: stat.last_write_time,
                change_time: stat.change_time,
                end_of_file: stat.end_of_file,
                allocation_size: stat.allocation_size,
                ext_file_attributes: stat.attributes,
                ea_size: 0,
                file_name: dirent.name.as_str().into(),
            }
            .write_args(&mut cursor, (unicode,))?;
        }
        FindInformationLevel::IdFullDirectory => {
            let stat = stat_entry(vfs, dir, dirent)?;
            FindFileIdFullDirectoryInfo {
                file_index: 0,
                creation_time: stat.creation_time,
                last_access_time: stat.last_access_time,
                last_write_time: stat.last_write_time,
                change_time: stat.change_time,
                end_of_file: stat.end_of_file,
                allocation_size: stat.allocation_size,
                ext_file_attributes: stat.attributes,
                ea_size: 0,
                unique_id: dirent.ino,
                file_name: dirent.name.as_str().into(),
            }
            .write_args(&mut cursor, (unicode,))?;
        }
        FindInformationLevel::BothDirectory => {
            let stat = stat_entry(vfs, dir, dirent)?;
            let short = short_name_for(&dirent.name).unwrap_or_default();
            FindFileBothDirectoryInfo {
                file_index: 0,
                creation_time: stat.creation_time,
                last_access_time: stat.last_access_time,
                last_write_time: stat.last_write_time,
                change_time: stat.change_time,
                end_of_file: stat.end_of_file,
                allocation_size: stat.allocation_size,
                ext_file_attributes: stat.attributes,
                ea_size: 0,
                short_name_length: (short.encode_utf16().count() * 2) as u8,
                short_name: short.as_str().into(),
                file_name: dirent.name.as_str().into(),
            }
            .write_args(&mut cursor, (unicode,))?;
        }
        FindInformationLevel::IdBothDirectory => {
            let stat = stat_entry(vfs, dir, dirent)?;
            let short = short_name_for(&dirent.name).unwrap_or_default();
            FindFileIdBothDirectoryInfo {
                file_index: 0,
                creation_time: stat.creation_time,
                last_access_time: stat.last_access_time,
                last_write_time: stat.last_write_time,
                change_time: stat.change_time,
                end_of_file: stat.end_of_file,
                allocation_size: stat.allocation_size,
                ext_file_attributes: stat.attributes,
                ea_size: 0,
                short_name_length: (short.encode_utf16().count() * 2) as u8,
                short_name: short.as_str().into(),
                unique_id: dirent.ino,
                file_name: dirent.name.as_str().into(),
            }
            .write_args(&mut cursor, (unicode,))?;
        }
    }
    Ok(cursor.into_inner())
}

/// Projects host metadata into the CIFS Unix basic block.
pub fn unix_basic_from_meta(meta: &std::fs::Metadata) -> FileUnixBasicInfo {
    let file_type = match meta.mode() & libc::S_IFMT {
        libc::S_IFDIR => UnixFileType::Dir,
        libc::S_IFLNK => UnixFileType::Symlink,
        libc::S_IFCHR => UnixFileType::CharDevice,
        libc::S_IFBLK => UnixFileType::BlockDevice,
        libc::S_IFIFO => UnixFileType::Fifo,
        libc::S_IFSOCK => UnixFileType::Socket,
        _ => UnixFileType::File,
    };
    FileUnixBasicInfo {
        end_of_file: meta.size(),
        num_of_bytes: meta.blocks() * 512,
        last_status_change: FileTime::from_unix(meta.ctime(), meta.ctime_nsec() as u32),
        last_access_time: FileTime::from_unix(meta.atime(), meta.atime_nsec() as u32),
        last_modification_time: FileTime::from_unix(meta.mtime(), meta.mtime_nsec() as u32),
        uid: meta.uid().into(),
        gid: meta.gid().into(),
        file_type,
        dev_major: 0,
        dev_minor: 0,
        unique_id: meta.ino(),
        permissions: u64::from(meta.mode() & 0o7777),
        nlinks: meta.nlink(),
    }
}
