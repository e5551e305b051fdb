//! File attribute definitions.

use binrw::prelude::*;
use modular_bitfield::prelude::*;

/// Extended (32-bit) file attributes, as carried by NT_CREATE_ANDX and the
/// TRANS2 information levels.
#[smbd_dtyp::mbitfield]
pub struct FileAttributes {
    /// Read-only file or directory.
    pub readonly: bool,
    /// Hidden from ordinary directory listings.
    pub hidden: bool,
    /// Used by the operating system.
    pub system: bool,
    #[skip]
    __: bool,

    /// This item is a directory.
    pub directory: bool,
    /// Marked for backup or removal.
    pub archive: bool,
    #[skip]
    __: bool,
    /// A file with no other attributes set. Ignored when combined.
    pub normal: bool,

    /// Temporary storage; backing store writeout may be avoided.
    pub temporary: bool,
    /// A sparse file.
    pub sparse_file: bool,
    /// Has an associated reparse point.
    pub reparse_point: bool,
    /// Compressed data.
    pub compressed: bool,

    /// Data is physically moved to offline storage.
    pub offline: bool,
    /// Not indexed by the content indexing service.
    pub not_content_indexed: bool,
    /// Encrypted data.
    pub encrypted: bool,
    #[skip]
    __: B17,
}

impl FileAttributes {
    pub fn value(&self) -> u32 {
        u32::from_le_bytes(self.into_bytes())
    }

    pub fn from_value(value: u32) -> Self {
        Self::from_bytes(value.to_le_bytes())
    }
}

/// Legacy 16-bit DOS attributes, as carried by SMB_COM_QUERY_INFORMATION,
/// SMB_COM_SETATTR and SMB_INFO_STANDARD.
#[smbd_dtyp::mbitfield]
pub struct DosAttributes {
    pub readonly: bool,
    pub hidden: bool,
    pub system: bool,
    pub volume: bool,

    pub directory: bool,
    pub archive: bool,
    #[skip]
    __: B10,
}

impl DosAttributes {
    pub fn value(&self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }

    pub fn from_value(value: u16) -> Self {
        Self::from_bytes(value.to_le_bytes())
    }
}

impl From<FileAttributes> for DosAttributes {
    fn from(value: FileAttributes) -> Self {
        DosAttributes::new()
            .with_readonly(value.readonly())
            .with_hidden(value.hidden())
            .with_system(value.system())
            .with_directory(value.directory())
            .with_archive(value.archive())
    }
}

impl From<DosAttributes> for FileAttributes {
    fn from(value: DosAttributes) -> Self {
        FileAttributes::new()
            .with_readonly(value.readonly())
            .with_hidden(value.hidden())
            .with_system(value.system())
            .with_directory(value.directory())
            .with_archive(value.archive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smbd_tests::*;

    test_binrw! {
        FileAttributes => dir: FileAttributes::new().with_directory(true) => "10000000"
    }

    test_binrw! {
        DosAttributes => ro_archive: DosAttributes::new().with_readonly(true).with_archive(true) => "2100"
    }

    #[test]
    fn test_attribute_conversion_drops_extended_bits() {
        let ext = FileAttributes::new()
            .with_archive(true)
            .with_sparse_file(true);
        let dos: DosAttributes = ext.into();
        assert!(dos.archive());
        assert_eq!(dos.value(), 0x20);
    }
}
