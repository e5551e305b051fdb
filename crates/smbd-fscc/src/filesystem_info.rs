//! QUERY_FS_INFORMATION level payloads.

use binrw::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;

/// TRANS2 QUERY_FS information levels this server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsInformationLevel {
    /// SMB_INFO_ALLOCATION (0x001).
    Allocation,
    /// SMB_QUERY_FS_VOLUME_INFO (0x102).
    Volume,
    /// SMB_QUERY_FS_SIZE_INFO (0x103).
    Size,
    /// SMB_QUERY_FS_DEVICE_INFO (0x104).
    Device,
    /// SMB_QUERY_FS_ATTRIBUTE_INFO (0x105).
    Attribute,
    /// SMB_QUERY_CIFS_UNIX_INFO (0x200).
    CifsUnix,
    /// SMB_QUERY_POSIX_FS_INFO (0x201).
    PosixFs,
}

impl TryFrom<u16> for FsInformationLevel {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0001 => Self::Allocation,
            0x0102 => Self::Volume,
            0x0103 => Self::Size,
            0x0104 => Self::Device,
            0x0105 => Self::Attribute,
            0x0200 => Self::CifsUnix,
            0x0201 => Self::PosixFs,
            other => return Err(other),
        })
    }
}

/// SMB_INFO_ALLOCATION response.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FsAllocationInfo {
    pub fs_id: u32,
    pub sectors_per_allocation_unit: u32,
    pub total_allocation_units: u32,
    pub free_allocation_units: u32,
    pub bytes_per_sector: u16,
}

/// SMB_QUERY_FS_VOLUME_INFO response.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little, import(unicode: bool))]
pub struct FsVolumeInfo {
    pub volume_creation_time: FileTime,
    pub serial_number: u32,
    #[bw(try_calc = u32::try_from(volume_label.wire_len(unicode)))]
    #[br(temp)]
    _volume_label_size: u32,
    #[bw(calc = 0)]
    #[br(temp)]
    reserved: u16,
    #[br(args_raw = SmbStrArgs::bytes(unicode, _volume_label_size))]
    #[bw(args_raw = SmbStrArgs::bytes(unicode, 0))]
    pub volume_label: SmbString,
}

/// SMB_QUERY_FS_SIZE_INFO response.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FsSizeInfo {
    pub total_allocation_units: u64,
    pub free_allocation_units: u64,
    pub sectors_per_allocation_unit: u32,
    pub bytes_per_sector: u32,
}

/// SMB_QUERY_FS_DEVICE_INFO response.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FsDeviceInfo {
    pub device_type: u32,
    pub device_characteristics: u32,
}

/// FILE_DEVICE_DISK, the only device type this server exports.
pub const FILE_DEVICE_DISK: u32 = 0x7;

/// Capability bits of [`FsAttributeInfo::attributes`].
#[smbd_dtyp::mbitfield]
pub struct FsAttributes {
    pub case_sensitive_search: bool,
    pub case_preserved_names: bool,
    pub unicode_on_disk: bool,
    pub persistent_acls: bool,

    pub file_compression: bool,
    pub volume_quotas: bool,
    pub supports_sparse_files: bool,
    pub supports_reparse_points: bool,

    #[skip]
    __: modular_bitfield::prelude::B24,
}

/// SMB_QUERY_FS_ATTRIBUTE_INFO response.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little, import(unicode: bool))]
pub struct FsAttributeInfo {
    pub attributes: FsAttributes,
    pub max_path_name_component_length: u32,
    #[bw(try_calc = u32::try_from(file_system_name.wire_len(unicode)))]
    #[br(temp)]
    _file_system_name_size: u32,
    #[br(args_raw = SmbStrArgs::bytes(unicode, _file_system_name_size))]
    #[bw(args_raw = SmbStrArgs::bytes(unicode, 0))]
    pub file_system_name: SmbString,
}

/// Capability bits of the CIFS Unix extensions.
#[smbd_dtyp::mbitfield]
pub struct CifsUnixCaps {
    pub fcntl_locks: bool,
    pub posix_acls: bool,
    pub xattr: bool,
    pub extended_security: bool,

    pub posix_pathnames: bool,
    pub posix_path_operations: bool,
    pub large_read: bool,
    pub large_write: bool,

    #[skip]
    __: modular_bitfield::prelude::B56,
}

/// SMB_QUERY_CIFS_UNIX_INFO response; also the SMB_SET_CIFS_UNIX_INFO
/// request payload, where the client announces the capabilities it will use.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FsUnixInfo {
    pub major_version: u16,
    pub minor_version: u16,
    pub capability: CifsUnixCaps,
}

/// SMB_QUERY_POSIX_FS_INFO response, a statvfs projection.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FsPosixInfo {
    pub optimal_transfer_size: u32,
    pub block_size: u32,
    pub total_blocks: u64,
    pub blocks_avail: u64,
    pub user_blocks_avail: u64,
    pub total_file_nodes: u64,
    pub free_file_nodes: u64,
    pub fs_identifier: u64,
}
