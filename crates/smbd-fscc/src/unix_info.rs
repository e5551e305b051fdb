//! CIFS Unix-extensions basic info block.

use binrw::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;

/// File type discriminator of [`FileUnixBasicInfo`].
#[binrw::binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[brw(little, repr(u32))]
pub enum UnixFileType {
    #[default]
    File = 0,
    Dir = 1,
    Symlink = 2,
    CharDevice = 3,
    BlockDevice = 4,
    Fifo = 5,
    Socket = 6,
}

/// SMB_QUERY_FILE_UNIX_BASIC (0x200) payload, also embedded in the
/// UNIX FIND entry and accepted by SMB_SET_FILE_UNIX_BASIC.
///
/// A value of all-ones in a settable field means "leave unchanged".
#[binrw::binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[brw(little)]
pub struct FileUnixBasicInfo {
    pub end_of_file: u64,
    pub num_of_bytes: u64,
    pub last_status_change: FileTime,
    pub last_access_time: FileTime,
    pub last_modification_time: FileTime,
    pub uid: u64,
    pub gid: u64,
    pub file_type: UnixFileType,
    pub dev_major: u64,
    pub dev_minor: u64,
    pub unique_id: u64,
    pub permissions: u64,
    pub nlinks: u64,
}

impl FileUnixBasicInfo {
    pub const WIRE_SIZE: usize = 100;

    /// The "leave unchanged" marker for settable u64 fields.
    pub const UNCHANGED: u64 = u64::MAX;
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    #[test]
    fn test_wire_size_matches_constant() {
        let mut cursor = Cursor::new(Vec::new());
        FileUnixBasicInfo::default().write(&mut cursor).unwrap();
        assert_eq!(cursor.into_inner().len(), FileUnixBasicInfo::WIRE_SIZE);
    }

    #[test]
    fn test_round_trip() {
        let info = FileUnixBasicInfo {
            end_of_file: 42,
            num_of_bytes: 4096,
            uid: 1000,
            gid: 1000,
            file_type: UnixFileType::Symlink,
            permissions: 0o644,
            nlinks: 1,
            ..Default::default()
        };
        let mut cursor = Cursor::new(Vec::new());
        info.write(&mut cursor).unwrap();
        cursor.set_position(0);
        assert_eq!(FileUnixBasicInfo::read(&mut cursor).unwrap(), info);
    }
}
