//! SET_PATH_INFORMATION / SET_FILE_INFORMATION level payloads.

use binrw::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;

/// TRANS2 set information levels this server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetInformationLevel {
    /// SMB_INFO_STANDARD (0x001).
    Standard,
    /// SMB_SET_FILE_BASIC_INFO (0x101).
    Basic,
    /// SMB_SET_FILE_DISPOSITION_INFO (0x102).
    Disposition,
    /// SMB_SET_FILE_ALLOCATION_INFO (0x103).
    Allocation,
    /// SMB_SET_FILE_END_OF_FILE_INFO (0x104).
    EndOfFile,
    /// SMB_SET_FILE_UNIX_BASIC (0x200).
    UnixBasic,
    /// SMB_SET_FILE_UNIX_LINK (0x201): create a symlink.
    UnixLink,
    /// SMB_SET_FILE_UNIX_HLINK (0x203): create a hard link.
    UnixHlink,
    /// SMB_SET_POSIX_ACL (0x204).
    PosixAcl,
    /// SMB_POSIX_OPEN (0x209).
    PosixOpen,
    /// SMB_POSIX_UNLINK (0x20a).
    PosixUnlink,
    /// SMB_SET_FILE_RENAME_INFORMATION (0x3f2, info pass-through).
    Rename,
}

impl TryFrom<u16> for SetInformationLevel {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0001 => Self::Standard,
            0x0101 => Self::Basic,
            0x0102 => Self::Disposition,
            0x0103 => Self::Allocation,
            0x0104 => Self::EndOfFile,
            0x0200 => Self::UnixBasic,
            0x0201 => Self::UnixLink,
            0x0203 => Self::UnixHlink,
            0x0204 => Self::PosixAcl,
            0x0209 => Self::PosixOpen,
            0x020a => Self::PosixUnlink,
            0x03f2 => Self::Rename,
            other => return Err(other),
        })
    }
}

/// SMB_SET_FILE_DISPOSITION_INFO payload.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FileDispositionInfo {
    pub delete_pending: Boolean,
}

/// SMB_SET_FILE_ALLOCATION_INFO payload.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FileAllocationInfo {
    pub allocation_size: u64,
}

/// SMB_SET_FILE_END_OF_FILE_INFO payload.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FileEndOfFileInfo {
    pub end_of_file: u64,
}

/// SMB_SET_FILE_RENAME_INFORMATION payload.
///
/// `root_fid` scopes a relative target the same way RootDirectoryFid does
/// for NT_CREATE_ANDX; zero means tree-relative.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little, import(unicode: bool))]
pub struct FileRenameInfo {
    pub overwrite: Boolean,
    #[bw(calc = [0; 3])]
    #[br(temp)]
    _pad: [u8; 3],
    pub root_fid: u32,
    #[bw(try_calc = u32::try_from(target_name.wire_len(unicode)))]
    #[br(temp)]
    _target_name_length: u32,
    #[br(args_raw = SmbStrArgs::bytes(unicode, _target_name_length))]
    #[bw(args_raw = SmbStrArgs::bytes(unicode, 0))]
    pub target_name: SmbString,
}

/// SMB_SET_FILE_UNIX_LINK / SMB_SET_FILE_UNIX_HLINK payload: the link target.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little, import(unicode: bool))]
pub struct FileLinkTarget {
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub target: SmbString,
}

/// Flags of [`PosixOpenRequest`]; the interesting subset of O_* as carried
/// on the wire by the CIFS Unix extensions.
#[smbd_dtyp::mbitfield]
pub struct PosixOpenFlags {
    pub read: bool,
    pub write: bool,
    #[skip]
    __: modular_bitfield::prelude::B4,
    pub creat: bool,
    pub excl: bool,

    pub trunc: bool,
    pub append: bool,
    #[skip]
    __: modular_bitfield::prelude::B6,

    pub directory: bool,
    #[skip]
    __: modular_bitfield::prelude::B15,
}

/// SMB_POSIX_OPEN request payload (carried as set-path data).
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct PosixOpenRequest {
    pub open_flags: PosixOpenFlags,
    pub permissions: u64,
    /// FIND level of the info block requested back; zero for none.
    pub requested_level: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _pad: u16,
}

/// SMB_POSIX_OPEN response payload.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct PosixOpenResponse {
    pub oplock_flags: u16,
    pub fid: u16,
    pub create_action: u32,
    pub returned_level: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _pad: u16,
}

/// SMB_POSIX_UNLINK payload.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
#[brw(little, repr(u16))]
pub enum PosixUnlinkType {
    File = 0,
    Directory = 1,
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        FileDispositionInfo: FileDispositionInfo { delete_pending: true.into() } => "01"
    }

    test_binrw! {
        FileEndOfFileInfo: FileEndOfFileInfo { end_of_file: 0x1234 } => "3412000000000000"
    }

    #[test]
    fn test_rename_info_round_trip() {
        let info = FileRenameInfo {
            overwrite: false.into(),
            root_fid: 0,
            target_name: "new.txt".into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        info.write_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        assert_eq!(data.len(), 12 + 14);
        let parsed = FileRenameInfo::read_args(&mut Cursor::new(&data), (true,)).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_posix_open_flags() {
        let flags = PosixOpenFlags::new().with_creat(true).with_trunc(true);
        let bytes = flags.into_bytes();
        assert_eq!(u32::from_le_bytes(bytes), 0x40 | 0x100);
    }
}
