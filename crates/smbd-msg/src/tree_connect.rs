//! SMB_COM_TREE_CONNECT_ANDX and SMB_COM_TREE_DISCONNECT messages.

use binrw::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;
use smbd_msg_derive::{smb_message_binrw, smb_request_binrw, smb_response_binrw};

use crate::AndX;

/// The service string for disk trees.
pub const SERVICE_DISK: &str = "A:";
/// The service string for the IPC$ pipe tree.
pub const SERVICE_IPC: &str = "IPC";
/// The wildcard service string clients send to accept any type.
pub const SERVICE_ANY: &str = "?????";

/// Flag bits of the TREE_CONNECT_ANDX request.
#[smbd_dtyp::mbitfield]
pub struct TreeConnectFlags {
    /// Disconnect the tree in the header's TID first.
    pub disconnect_tid: bool,
    #[skip]
    __: modular_bitfield::prelude::B15,
}

/// SMB_COM_TREE_CONNECT_ANDX request (4 words).
///
/// The path is `\\server\share`; the trailing service string is always
/// OEM-coded regardless of the UNICODE flag.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct TreeConnectRequest {
    #[bw(calc = 4)]
    #[br(temp)]
    #[br(assert(_word_count == 4))]
    _word_count: u8,
    pub andx: AndX,
    pub flags: TreeConnectFlags,
    #[bw(try_calc = u16::try_from(password.len()))]
    #[br(temp)]
    password_length: u16,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[br(count = password_length)]
    pub password: Vec<u8>,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub path: SmbString,
    #[brw(args_raw = SmbStrArgs::nul(false))]
    pub service: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

impl TreeConnectRequest {
    /// The share component of the requested `\\server\share` path.
    pub fn share_name(&self) -> &str {
        let path = self.path.as_str();
        path.rsplit('\\').next().unwrap_or(path)
    }
}

/// OptionalSupport bits of the TREE_CONNECT_ANDX response.
#[smbd_dtyp::mbitfield]
pub struct OptionalSupport {
    /// The server supports SearchAttributes.
    pub search_bits: bool,
    /// This share is in DFS.
    pub in_dfs: bool,
    #[skip]
    __: modular_bitfield::prelude::B14,
}

/// SMB_COM_TREE_CONNECT_ANDX response (3 words).
#[smb_response_binrw]
#[brw(little, import(unicode: bool))]
pub struct TreeConnectResponse {
    #[bw(calc = 3)]
    #[br(temp)]
    #[br(assert(_word_count == 3))]
    _word_count: u8,
    pub andx: AndX,
    pub optional_support: OptionalSupport,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[brw(args_raw = SmbStrArgs::nul(false))]
    pub service: SmbString,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub native_file_system: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

impl TreeConnectResponse {
    pub fn new(andx: AndX, optional_support: OptionalSupport, service: SmbString, native_file_system: SmbString) -> Self {
        Self {
            andx,
            optional_support,
            service,
            native_file_system,
            _end: (),
        }
    }
}

/// SMB_COM_TREE_DISCONNECT request/response: no words, no bytes.
///
/// Several other commands (PROCESS_EXIT, CLOSE and friends' responses)
/// share this empty shape; see [`EmptyBody`].
pub type TreeDisconnectRequest = EmptyBody;

/// A message body with zero parameter words and zero bytes.
#[smb_message_binrw]
#[derive(Default, Clone)]
#[brw(little)]
pub struct EmptyBody {
    #[bw(calc = 0)]
    #[br(temp)]
    #[br(assert(_word_count == 0))]
    _word_count: u8,
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
        EmptyBody: EmptyBody::default() => "000000"
    }

    #[test]
    fn test_tree_connect_round_trip() {
        let request = TreeConnectRequest {
            andx: AndX::none(),
            flags: TreeConnectFlags::new(),
            password: vec![0],
            path: "\\\\srv\\share".into(),
            service: SERVICE_ANY.into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        let parsed = TreeConnectRequest::read_args(&mut Cursor::new(&data), (true,)).unwrap();
        assert_eq!(parsed, request);
        assert_eq!(parsed.share_name(), "share");
    }

    #[test]
    fn test_byte_count_covers_trailing_strings() {
        let response = TreeConnectResponse {
            andx: AndX::none(),
            optional_support: OptionalSupport::new().with_search_bits(true),
            service: SERVICE_DISK.into(),
            native_file_system: "NTFS".into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        response.write_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        // word_count(1) + andx(4) + support(2) + byte_count(2) = 9 fixed bytes.
        let byte_count = u16::from_le_bytes([data[7], data[8]]) as usize;
        assert_eq!(data.len(), 9 + byte_count);
    }
}
