//! Path-addressed commands: RENAME, NT_RENAME, DELETE, CREATE_DIRECTORY,
//! DELETE_DIRECTORY, CHECK_DIRECTORY, QUERY_INFORMATION, SET_INFORMATION
//! and FIND_CLOSE2.

use binrw::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;
use smbd_fscc::DosAttributes;
use smbd_msg_derive::{smb_request_binrw, smb_response_binrw};

/// The buffer-format marker introducing an ASCII/unicode pathname in the
/// byte block of the legacy commands.
pub const BUFFER_FORMAT_PATHNAME: u8 = 0x04;

/// SMB_COM_RENAME request (1 word): search attributes, then the two
/// pathnames, each introduced by a buffer-format marker.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct RenameRequest {
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_word_count == 1))]
    _word_count: u8,
    pub search_attributes: DosAttributes,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[bw(calc = BUFFER_FORMAT_PATHNAME)]
    #[br(temp)]
    #[br(assert(_fmt1 == BUFFER_FORMAT_PATHNAME))]
    _fmt1: u8,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub old_file_name: SmbString,
    #[bw(calc = BUFFER_FORMAT_PATHNAME)]
    #[br(temp)]
    #[br(assert(_fmt2 == BUFFER_FORMAT_PATHNAME))]
    _fmt2: u8,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub new_file_name: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// SMB_COM_NT_RENAME request (4 words). The information level selects
/// rename, hard link (0x103) or copy semantics.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct NtRenameRequest {
    #[bw(calc = 4)]
    #[br(temp)]
    #[br(assert(_word_count == 4))]
    _word_count: u8,
    pub search_attributes: DosAttributes,
    pub information_level: u16,
    pub cluster_count: u32,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[bw(calc = BUFFER_FORMAT_PATHNAME)]
    #[br(temp)]
    #[br(assert(_fmt1 == BUFFER_FORMAT_PATHNAME))]
    _fmt1: u8,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub old_file_name: SmbString,
    #[bw(calc = BUFFER_FORMAT_PATHNAME)]
    #[br(temp)]
    #[br(assert(_fmt2 == BUFFER_FORMAT_PATHNAME))]
    _fmt2: u8,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub new_file_name: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// NT_RENAME information level requesting a hard link.
pub const NT_RENAME_SET_LINK_INFO: u16 = 0x103;
/// NT_RENAME information level requesting a rename.
pub const NT_RENAME_RENAME_FILE: u16 = 0x104;
/// NT_RENAME information level requesting move-cluster-info (not served).
pub const NT_RENAME_MOVE_CLUSTER_INFO: u16 = 0x105;

/// SMB_COM_DELETE request (1 word).
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct DeleteRequest {
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_word_count == 1))]
    _word_count: u8,
    pub search_attributes: DosAttributes,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[bw(calc = BUFFER_FORMAT_PATHNAME)]
    #[br(temp)]
    #[br(assert(_fmt == BUFFER_FORMAT_PATHNAME))]
    _fmt: u8,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub file_name: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// The shared body of SMB_COM_CREATE_DIRECTORY, SMB_COM_DELETE_DIRECTORY
/// and SMB_COM_CHECK_DIRECTORY: no words, one marked pathname.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct DirectoryRequest {
    #[bw(calc = 0)]
    #[br(temp)]
    #[br(assert(_word_count == 0))]
    _word_count: u8,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[bw(calc = BUFFER_FORMAT_PATHNAME)]
    #[br(temp)]
    #[br(assert(_fmt == BUFFER_FORMAT_PATHNAME))]
    _fmt: u8,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub directory_name: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// SMB_COM_QUERY_INFORMATION request (0 words, one marked pathname).
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct QueryInformationRequest {
    #[bw(calc = 0)]
    #[br(temp)]
    #[br(assert(_word_count == 0))]
    _word_count: u8,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[bw(calc = BUFFER_FORMAT_PATHNAME)]
    #[br(temp)]
    #[br(assert(_fmt == BUFFER_FORMAT_PATHNAME))]
    _fmt: u8,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub file_name: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// SMB_COM_QUERY_INFORMATION response (10 words).
#[smb_response_binrw]
#[brw(little)]
pub struct QueryInformationResponse {
    #[bw(calc = 10)]
    #[br(temp)]
    #[br(assert(_word_count == 10))]
    _word_count: u8,
    pub file_attributes: DosAttributes,
    /// Last write time as Unix seconds.
    pub last_write_time: u32,
    pub file_size: u32,
    reserved: [u8; 10],
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

/// SMB_COM_SET_INFORMATION (SETATTR) request (8 words + pathname).
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct SetInformationRequest {
    #[bw(calc = 8)]
    #[br(temp)]
    #[br(assert(_word_count == 8))]
    _word_count: u8,
    pub file_attributes: DosAttributes,
    /// New last write time as Unix seconds; zero leaves it unchanged.
    pub last_write_time: u32,
    reserved: [u8; 10],
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[bw(calc = BUFFER_FORMAT_PATHNAME)]
    #[br(temp)]
    #[br(assert(_fmt == BUFFER_FORMAT_PATHNAME))]
    _fmt: u8,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub file_name: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// SMB_COM_FIND_CLOSE2 request (1 word): the search handle to close.
#[smb_request_binrw]
#[brw(little)]
pub struct FindClose2Request {
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_word_count == 1))]
    _word_count: u8,
    pub sid: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        FindClose2Request: FindClose2Request { sid: 3 } => "0103000000"
    }

    test_binrw! {
        QueryInformationResponse: QueryInformationResponse {
            file_attributes: DosAttributes::new().with_archive(true),
            last_write_time: 0x5f000000,
            file_size: 77,
        } => "0a20000000005f4d000000000000000000000000000000"
    }

    #[test]
    fn test_rename_round_trip_ascii() {
        let request = RenameRequest {
            search_attributes: DosAttributes::new(),
            old_file_name: "\\a.txt".into(),
            new_file_name: "\\b.txt".into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write_args(&mut cursor, (false,)).unwrap();
        let data = cursor.into_inner();
        // wc + attrs + bc + fmt + "\a.txt\0" + fmt + "\b.txt\0"
        assert_eq!(data.len(), 1 + 2 + 2 + 1 + 7 + 1 + 7);
        let parsed = RenameRequest::read_args(&mut Cursor::new(&data), (false,)).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_directory_request_unicode_round_trip() {
        let request = DirectoryRequest {
            directory_name: "\\newdir".into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        let parsed = DirectoryRequest::read_args(&mut Cursor::new(&data), (true,)).unwrap();
        assert_eq!(parsed, request);
    }
}
