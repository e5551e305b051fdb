//! File-open messages: SMB_COM_NT_CREATE_ANDX, SMB_COM_OPEN_ANDX,
//! SMB_COM_CLOSE and SMB_COM_FLUSH.

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;
use smbd_dtyp::security::AccessMask;
use smbd_fscc::{DosAttributes, FileAttributes};
use smbd_msg_derive::{smb_request_binrw, smb_response_binrw};

use crate::AndX;

/// NT_CREATE_ANDX / SMB_POSIX_OPEN disposition values.
#[binrw::binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little, repr(u32))]
pub enum CreateDisposition {
    /// Replace if present, create otherwise.
    Supersede = 0,
    /// Open; fail if absent.
    Open = 1,
    /// Create; fail if present.
    Create = 2,
    /// Open if present, create otherwise.
    OpenIf = 3,
    /// Open and truncate; fail if absent.
    Overwrite = 4,
    /// Open and truncate if present, create otherwise.
    OverwriteIf = 5,
}

/// NT_CREATE_ANDX CreateAction response values.
#[binrw::binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little, repr(u32))]
pub enum CreateAction {
    Superseded = 0,
    Opened = 1,
    Created = 2,
    Overwritten = 3,
}

/// NT_CREATE_ANDX CreateOptions bits (the subset with server-side effect).
#[smbd_dtyp::mbitfield]
pub struct CreateOptions {
    /// The target must be a directory.
    pub directory_file: bool,
    pub write_through: bool,
    pub sequential_only: bool,
    pub no_intermediate_buffering: bool,

    #[skip]
    __: B2,
    /// The target must not be a directory.
    pub non_directory_file: bool,
    #[skip]
    __: B5,

    /// Delete the file when the last handle to it is closed.
    pub delete_on_close: bool,
    #[skip]
    __: B19,
}

/// NT_CREATE_ANDX ShareAccess bits.
#[smbd_dtyp::mbitfield]
pub struct ShareAccess {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    #[skip]
    __: B29,
}

/// NT_CREATE_ANDX Flags bits.
#[smbd_dtyp::mbitfield]
pub struct NtCreateFlags {
    #[skip]
    __: bool,
    /// Request an exclusive oplock.
    pub request_oplock: bool,
    /// Request a batch oplock.
    pub request_batch_oplock: bool,
    /// The target of the open is a directory.
    pub open_target_dir: bool,
    #[skip]
    __: B28,
}

/// FileType field of the open responses.
#[binrw::binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[brw(little, repr(u16))]
pub enum FileType {
    #[default]
    Disk = 0,
    ByteModePipe = 1,
    MessageModePipe = 2,
    Printer = 3,
}

/// SMB_COM_NT_CREATE_ANDX request (24 words).
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct NtCreateRequest {
    #[bw(calc = 24)]
    #[br(temp)]
    #[br(assert(_word_count == 24))]
    _word_count: u8,
    pub andx: AndX,
    reserved: u8,
    #[bw(try_calc = u16::try_from(file_name.wire_len(unicode)))]
    #[br(temp)]
    name_length: u16,
    pub flags: NtCreateFlags,
    /// FID the name is relative to; zero for tree-relative.
    pub root_directory_fid: u32,
    pub desired_access: AccessMask,
    pub allocation_size: u64,
    pub ext_file_attributes: FileAttributes,
    pub share_access: ShareAccess,
    pub create_disposition: CreateDisposition,
    pub create_options: CreateOptions,
    pub impersonation_level: u32,
    pub security_flags: u8,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[br(args_raw = SmbStrArgs::bytes_aligned(unicode, name_length.into()))]
    #[bw(args_raw = SmbStrArgs::bytes_aligned(unicode, 0))]
    pub file_name: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// SMB_COM_NT_CREATE_ANDX response (34 words).
#[smb_response_binrw]
#[brw(little)]
pub struct NtCreateResponse {
    #[bw(calc = 34)]
    #[br(temp)]
    #[br(assert(_word_count == 34))]
    _word_count: u8,
    pub andx: AndX,
    pub oplock_level: u8,
    pub fid: u16,
    pub create_action: CreateAction,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub change_time: FileTime,
    pub ext_file_attributes: FileAttributes,
    pub allocation_size: u64,
    pub end_of_file: u64,
    pub file_type: FileType,
    /// Named-pipe state; zero for disk files.
    pub device_state: u16,
    pub directory: Boolean,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

/// SMB_COM_OPEN_ANDX access-mode request encoding.
#[smbd_dtyp::mbitfield]
pub struct OpenMode {
    /// 0 = read, 1 = write, 2 = read/write.
    pub access: B2,
    #[skip]
    __: B2,
    /// Deny-mode sharing bits.
    pub sharing: B3,
    #[skip]
    __: bool,
    #[skip]
    __: B8,
}

/// SMB_COM_OPEN_ANDX OpenFunction encoding: what to do on hit/miss.
#[smbd_dtyp::mbitfield]
pub struct OpenFunction {
    /// 0 = fail, 1 = open, 2 = truncate when the file exists.
    pub open_action: B2,
    #[skip]
    __: B2,
    /// Create the file if absent.
    pub create: bool,
    #[skip]
    __: B11,
}

/// SMB_COM_OPEN_ANDX request (15 words).
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct OpenRequest {
    #[bw(calc = 15)]
    #[br(temp)]
    #[br(assert(_word_count == 15))]
    _word_count: u8,
    pub andx: AndX,
    pub flags: u16,
    pub open_mode: OpenMode,
    pub search_attributes: DosAttributes,
    pub file_attributes: DosAttributes,
    /// Creation time as Unix seconds, when creating.
    pub creation_time: u32,
    pub open_function: OpenFunction,
    pub allocation_size: u32,
    pub timeout: u32,
    reserved: u32,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub file_name: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// SMB_COM_OPEN_ANDX response (15 words).
#[smb_response_binrw]
#[brw(little)]
pub struct OpenResponse {
    #[bw(calc = 15)]
    #[br(temp)]
    #[br(assert(_word_count == 15))]
    _word_count: u8,
    pub andx: AndX,
    pub fid: u16,
    pub file_attributes: DosAttributes,
    /// Last write time as Unix seconds.
    pub last_write_time: u32,
    pub data_size: u32,
    pub granted_access: u16,
    pub file_type: FileType,
    pub device_state: u16,
    /// 1 = opened, 2 = created, 3 = truncated.
    pub action: u16,
    pub server_fid: u32,
    reserved: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

/// SMB_COM_CLOSE request (3 words).
#[smb_request_binrw]
#[brw(little)]
pub struct CloseRequest {
    #[bw(calc = 3)]
    #[br(temp)]
    #[br(assert(_word_count == 3))]
    _word_count: u8,
    pub fid: u16,
    /// Client's last-write stamp as Unix seconds; zero or all-ones to skip.
    pub last_write_time: u32,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

/// SMB_COM_FLUSH request (1 word). A FID of 0xFFFF flushes every open
/// file of the session.
#[smb_request_binrw]
#[brw(little)]
pub struct FlushRequest {
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_word_count == 1))]
    _word_count: u8,
    pub fid: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

pub const FLUSH_ALL_FID: u16 = 0xFFFF;

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        CloseRequest: CloseRequest { fid: 1, last_write_time: 0 } => "030100000000000000"
    }

    test_binrw! {
        FlushRequest: FlushRequest { fid: FLUSH_ALL_FID } => "01ffff0000"
    }

    #[test]
    fn test_nt_create_request_round_trip() {
        let request = NtCreateRequest {
            andx: AndX::none(),
            flags: NtCreateFlags::new(),
            root_directory_fid: 0,
            desired_access: AccessMask::new().with_generic_all(true),
            allocation_size: 0,
            ext_file_attributes: FileAttributes::new().with_normal(true),
            share_access: ShareAccess::new().with_read(true).with_write(true),
            create_disposition: CreateDisposition::OpenIf,
            create_options: CreateOptions::new(),
            impersonation_level: 2,
            security_flags: 0,
            file_name: "\\file.txt".into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        let parsed = NtCreateRequest::read_args(&mut Cursor::new(&data), (true,)).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_nt_create_response_word_count() {
        let response = NtCreateResponse {
            andx: AndX::none(),
            oplock_level: 0,
            fid: 1,
            create_action: CreateAction::Created,
            creation_time: FileTime::ZERO,
            last_access_time: FileTime::ZERO,
            last_write_time: FileTime::ZERO,
            change_time: FileTime::ZERO,
            ext_file_attributes: FileAttributes::new().with_archive(true),
            allocation_size: 0,
            end_of_file: 0,
            file_type: FileType::Disk,
            device_state: 0,
            directory: false.into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        response.write(&mut cursor).unwrap();
        // 1 word-count byte + 34 words + 2 byte-count bytes.
        assert_eq!(cursor.into_inner().len(), 1 + 68 + 2);
    }
}
