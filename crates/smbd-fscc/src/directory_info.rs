//! Directory enumeration entry records for TRANS2 FIND_FIRST2/FIND_NEXT2.
//!
//! Each record here is the body of one entry; the enumeration engine
//! prefixes every entry with its 32-bit next-entry offset and pads entries
//! to the 8-byte boundary itself, because a batch is produced incrementally
//! and may be cut short by the client's buffer size.
//!
//! Layouts are the packed SMB1 forms; names are coded per the session's
//! UNICODE flag, which callers pass through the `unicode` import.

use binrw::prelude::*;

use crate::{FileAttributes, FileUnixBasicInfo};
use smbd_dtyp::binrw_util::prelude::*;

/// Alignment of successive entries inside one FIND response.
pub const FIND_ENTRY_ALIGNMENT: usize = 8;

/// TRANS2 FIND information levels served by the enumeration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindInformationLevel {
    Directory,
    FullDirectory,
    Names,
    BothDirectory,
    IdFullDirectory,
    IdBothDirectory,
    Unix,
}

impl TryFrom<u16> for FindInformationLevel {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0101 => Self::Directory,
            0x0102 => Self::FullDirectory,
            0x0103 => Self::Names,
            0x0104 => Self::BothDirectory,
            0x0105 => Self::IdFullDirectory,
            0x0106 => Self::IdBothDirectory,
            0x0202 => Self::Unix,
            other => return Err(other),
        })
    }
}

/// Shared leading fields of the NT-style FIND entry records.
macro_rules! find_entry_type {
    (
        $(#[$meta:meta])*
        $svis:vis struct $name:ident [name_offset = $name_offset:literal] {
            $(
                $(#[$field_meta:meta])*
                $vis:vis $field_name:ident : $field_ty:ty,
            )*
        }
    ) => {
        #[binrw::binrw]
        #[derive(Debug, PartialEq, Eq, Default)]
        #[brw(little, import(unicode: bool))]
        $(#[$meta])*
        $svis struct $name {
            /// Byte offset of the file within its directory stream.
            pub file_index: u32,
            pub creation_time: FileTime,
            pub last_access_time: FileTime,
            pub last_write_time: FileTime,
            pub change_time: FileTime,
            pub end_of_file: u64,
            pub allocation_size: u64,
            pub ext_file_attributes: FileAttributes,
            #[bw(try_calc = u32::try_from(file_name.wire_len(unicode)))]
            #[br(temp)]
            _file_name_length: u32,

            $(
                $(#[$field_meta])*
                $vis $field_name: $field_ty,
            )*

            #[br(args_raw = SmbStrArgs::bytes(unicode, _file_name_length))]
            #[bw(args_raw = SmbStrArgs::bytes(unicode, 0))]
            pub file_name: SmbString,
        }

        impl $name {
            /// Offset of the name field from the start of the entry,
            /// including the 4-byte next-entry-offset prefix.
            pub const NAME_OFFSET: usize = $name_offset;
        }
    };
}

find_entry_type! {
    /// SMB_FIND_FILE_DIRECTORY_INFO (0x101).
    pub struct FindFileDirectoryInfo [name_offset = 64] {}
}

find_entry_type! {
    /// SMB_FIND_FILE_FULL_DIRECTORY_INFO (0x102).
    pub struct FindFileFullDirectoryInfo [name_offset = 68] {
        /// Total size of the file's extended attributes.
        pub ea_size: u32,
    }
}

find_entry_type! {
    /// SMB_FIND_FILE_ID_FULL_DIR_INFO (0x105).
    pub struct FindFileIdFullDirectoryInfo [name_offset = 76] {
        pub ea_size: u32,
        /// File-system unique identifier (inode number).
        pub unique_id: u64,
    }
}

find_entry_type! {
    /// SMB_FIND_FILE_BOTH_DIRECTORY_INFO (0x104).
    pub struct FindFileBothDirectoryInfo [name_offset = 94] {
        pub ea_size: u32,
        /// Length in bytes of the valid part of the short name.
        pub short_name_length: u8,
        #[bw(calc = 0)]
        #[br(temp)]
        reserved: u8,
        /// The mangled 8.3 name, in a fixed 24-byte slot.
        pub short_name: FixedWideString<12>,
    }
}

find_entry_type! {
    /// SMB_FIND_FILE_ID_BOTH_DIR_INFO (0x106).
    pub struct FindFileIdBothDirectoryInfo [name_offset = 104] {
        pub ea_size: u32,
        pub short_name_length: u8,
        #[bw(calc = 0)]
        #[br(temp)]
        reserved: u8,
        pub short_name: FixedWideString<12>,
        #[bw(calc = 0)]
        #[br(temp)]
        reserved2: u16,
        pub unique_id: u64,
    }
}

/// SMB_FIND_FILE_NAMES_INFO (0x103).
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Default)]
#[brw(little, import(unicode: bool))]
pub struct FindFileNamesInfo {
    pub file_index: u32,
    #[bw(try_calc = u32::try_from(file_name.wire_len(unicode)))]
    #[br(temp)]
    _file_name_length: u32,
    #[br(args_raw = SmbStrArgs::bytes(unicode, _file_name_length))]
    #[bw(args_raw = SmbStrArgs::bytes(unicode, 0))]
    pub file_name: SmbString,
}

impl FindFileNamesInfo {
    pub const NAME_OFFSET: usize = 12;
}

/// SMB_FIND_FILE_UNIX (0x202), the CIFS Unix-extensions entry.
///
/// The name is null-terminated; its extent is implied by the next-entry
/// offset rather than a length field.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Default)]
#[brw(little, import(unicode: bool))]
pub struct FindFileUnixInfo {
    /// Resume key echoed back through FIND_NEXT2.
    pub resume_key: u32,
    pub basic: FileUnixBasicInfo,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub file_name: SmbString,
}

impl FindFileUnixInfo {
    pub const NAME_OFFSET: usize = 108;
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    #[test]
    fn test_names_info_wire_layout() {
        let entry = FindFileNamesInfo {
            file_index: 0,
            file_name: "A.TXT".into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        entry.write_le_args(&mut cursor, (true,)).unwrap();
        assert_eq!(
            cursor.into_inner(),
            smbd_tests::decode_hex("000000000a00000041002e00540058005400")
        );
    }

    fn both_entry(name: &str, short: &str) -> FindFileBothDirectoryInfo {
        FindFileBothDirectoryInfo {
            file_index: 0,
            creation_time: FileTime::from_unix(1_600_000_000, 0),
            last_access_time: FileTime::from_unix(1_600_000_100, 0),
            last_write_time: FileTime::from_unix(1_600_000_200, 0),
            change_time: FileTime::from_unix(1_600_000_200, 0),
            end_of_file: 5,
            allocation_size: 4096,
            ext_file_attributes: FileAttributes::new().with_archive(true),
            ea_size: 0,
            short_name_length: (short.encode_utf16().count() * 2) as u8,
            short_name: short.into(),
            file_name: name.into(),
        }
    }

    #[test]
    fn test_both_directory_round_trip_unicode() {
        let entry = both_entry("longfilename.txt", "LONGF~QK.TXT");
        let mut cursor = Cursor::new(Vec::new());
        entry.write_le_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        // Fixed part matches the declared name offset (minus the external prefix).
        assert_eq!(
            data.len(),
            FindFileBothDirectoryInfo::NAME_OFFSET - 4 + "longfilename.txt".len() * 2
        );
        let parsed =
            FindFileBothDirectoryInfo::read_le_args(&mut Cursor::new(&data), (true,)).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_both_directory_round_trip_ascii() {
        let entry = both_entry("readme.md", "README~1.MD");
        let mut cursor = Cursor::new(Vec::new());
        entry.write_le_args(&mut cursor, (false,)).unwrap();
        let data = cursor.into_inner();
        let parsed =
            FindFileBothDirectoryInfo::read_le_args(&mut Cursor::new(&data), (false,)).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_level_lookup() {
        assert_eq!(
            FindInformationLevel::try_from(0x0104),
            Ok(FindInformationLevel::BothDirectory)
        );
        assert_eq!(FindInformationLevel::try_from(0x0001), Err(0x0001));
    }
}
