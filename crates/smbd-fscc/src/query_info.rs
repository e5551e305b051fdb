//! QUERY_PATH_INFORMATION / QUERY_FILE_INFORMATION level payloads.

use binrw::prelude::*;

use crate::{DosAttributes, DosDate, DosTime, FileAttributes};
use smbd_dtyp::binrw_util::prelude::*;

/// TRANS2 query information levels this server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryInformationLevel {
    /// SMB_INFO_STANDARD (0x001).
    Standard,
    /// SMB_INFO_QUERY_EA_SIZE (0x002).
    EaSize,
    /// SMB_INFO_QUERY_ALL_EAS (0x004).
    AllEas,
    /// SMB_QUERY_FILE_BASIC_INFO (0x101).
    Basic,
    /// SMB_QUERY_FILE_STANDARD_INFO (0x102).
    StandardInfo,
    /// SMB_QUERY_FILE_EA_INFO (0x103).
    EaInfo,
    /// SMB_QUERY_FILE_NAME_INFO (0x104).
    NameInfo,
    /// SMB_QUERY_FILE_ALL_INFO (0x107).
    AllInfo,
    /// SMB_QUERY_FILE_ALT_NAME_INFO (0x108).
    AltNameInfo,
    /// SMB_QUERY_FILE_UNIX_BASIC (0x200).
    UnixBasic,
    /// SMB_QUERY_FILE_UNIX_LINK (0x201).
    UnixLink,
    /// SMB_QUERY_POSIX_ACL (0x204).
    PosixAcl,
    /// SMB_QUERY_FILE_INTERNAL_INFO (0x3ee, info pass-through).
    InternalInfo,
}

impl TryFrom<u16> for QueryInformationLevel {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0001 => Self::Standard,
            0x0002 => Self::EaSize,
            0x0004 => Self::AllEas,
            0x0101 => Self::Basic,
            0x0102 => Self::StandardInfo,
            0x0103 => Self::EaInfo,
            0x0104 => Self::NameInfo,
            0x0107 => Self::AllInfo,
            0x0108 => Self::AltNameInfo,
            0x0200 => Self::UnixBasic,
            0x0201 => Self::UnixLink,
            0x0204 => Self::PosixAcl,
            0x03ee => Self::InternalInfo,
            other => return Err(other),
        })
    }
}

/// SMB_INFO_STANDARD response: DOS-coded times and 32-bit sizes.
///
/// The `with_ea` import selects the SMB_INFO_QUERY_EA_SIZE variant, which
/// appends the EA size.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little, import(with_ea: bool))]
pub struct FileInfoStandard {
    pub creation_date: DosDate,
    pub creation_time: DosTime,
    pub last_access_date: DosDate,
    pub last_access_time: DosTime,
    pub last_write_date: DosDate,
    pub last_write_time: DosTime,
    pub data_size: u32,
    pub allocation_size: u32,
    pub attributes: DosAttributes,
    #[br(if(with_ea))]
    #[bw(assert(ea_size.is_some() == with_ea))]
    #[bw(if(with_ea))]
    pub ea_size: Option<u32>,
}

/// SMB_QUERY_FILE_BASIC_INFO response.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FileBasicInfo {
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub change_time: FileTime,
    pub attributes: FileAttributes,
    #[bw(calc = 0)]
    #[br(temp)]
    _pad: u32,
}

/// SMB_QUERY_FILE_STANDARD_INFO response (packed, 22 bytes).
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FileStandardInfo {
    pub allocation_size: u64,
    pub end_of_file: u64,
    pub number_of_links: u32,
    pub delete_pending: Boolean,
    pub directory: Boolean,
}

/// SMB_QUERY_FILE_EA_INFO response.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FileEaInfo {
    pub ea_size: u32,
}

/// SMB_QUERY_FILE_INTERNAL_INFO response.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FileInternalInfo {
    pub index_number: u64,
}

/// SMB_QUERY_FILE_NAME_INFO / SMB_QUERY_FILE_ALT_NAME_INFO response.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little, import(unicode: bool))]
pub struct FileNameInfo {
    #[bw(try_calc = u32::try_from(file_name.wire_len(unicode)))]
    #[br(temp)]
    _file_name_length: u32,
    #[br(args_raw = SmbStrArgs::bytes(unicode, _file_name_length))]
    #[bw(args_raw = SmbStrArgs::bytes(unicode, 0))]
    pub file_name: SmbString,
}

/// SMB_QUERY_FILE_ALL_INFO response (the SMB1 form, without index number).
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little, import(unicode: bool))]
pub struct FileAllInfo {
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub change_time: FileTime,
    pub attributes: FileAttributes,
    #[bw(calc = 0)]
    #[br(temp)]
    _pad1: u32,
    pub allocation_size: u64,
    pub end_of_file: u64,
    pub number_of_links: u32,
    pub delete_pending: Boolean,
    pub directory: Boolean,
    #[bw(calc = 0)]
    #[br(temp)]
    _pad2: u16,
    pub ea_size: u32,
    #[bw(try_calc = u32::try_from(file_name.wire_len(unicode)))]
    #[br(temp)]
    _file_name_length: u32,
    #[br(args_raw = SmbStrArgs::bytes(unicode, _file_name_length))]
    #[bw(args_raw = SmbStrArgs::bytes(unicode, 0))]
    pub file_name: SmbString,
}

/// SMB_QUERY_FILE_UNIX_LINK response: the symlink target.
///
/// The target is carried as a null-terminated string in the session coding.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little, import(unicode: bool))]
pub struct FileUnixLinkInfo {
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub target: SmbString,
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        FileEaInfo: FileEaInfo { ea_size: 0x80 } => "80000000"
    }

    test_binrw! {
        FileStandardInfo => file: FileStandardInfo {
            allocation_size: 4096,
            end_of_file: 5,
            number_of_links: 1,
            delete_pending: false.into(),
            directory: false.into(),
        } => "00100000000000000500000000000000010000000000"
    }

    #[test]
    fn test_all_info_round_trip() {
        let info = FileAllInfo {
            creation_time: FileTime::from_unix(1_600_000_000, 0),
            last_access_time: FileTime::from_unix(1_600_000_001, 0),
            last_write_time: FileTime::from_unix(1_600_000_002, 0),
            change_time: FileTime::from_unix(1_600_000_002, 0),
            attributes: FileAttributes::new().with_archive(true),
            allocation_size: 4096,
            end_of_file: 77,
            number_of_links: 1,
            delete_pending: false.into(),
            directory: false.into(),
            ea_size: 0,
            file_name: "\\file.txt".into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        info.write_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        let parsed = FileAllInfo::read_args(&mut Cursor::new(&data), (true,)).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_info_standard_with_and_without_ea() {
        let mut info = FileInfoStandard {
            data_size: 10,
            allocation_size: 512,
            attributes: DosAttributes::new().with_archive(true),
            ..Default::default()
        };
        let mut cursor = Cursor::new(Vec::new());
        info.write_args(&mut cursor, (false,)).unwrap();
        assert_eq!(cursor.get_ref().len(), 22);

        info.ea_size = Some(4);
        let mut cursor = Cursor::new(Vec::new());
        info.write_args(&mut cursor, (true,)).unwrap();
        assert_eq!(cursor.get_ref().len(), 26);
    }
}
