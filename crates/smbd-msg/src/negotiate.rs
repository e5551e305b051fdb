//! SMB_COM_NEGOTIATE messages.

use binrw::io::TakeSeekExt;
use binrw::prelude::*;
use modular_bitfield::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;
use smbd_msg_derive::{smb_request_binrw, smb_response_binrw};

/// The dialect this server speaks.
pub const DIALECT_NT_LM_012: &str = "NT LM 0.12";
/// The SMB2 bootstrap dialect, accepted for dialect handoff only.
pub const DIALECT_SMB2_002: &str = "SMB 2.002";
/// The SMB2 wildcard dialect.
pub const DIALECT_SMB2_WILDCARD: &str = "SMB 2.???";

/// One dialect marker in the NEGOTIATE request.
#[derive(BinRead, BinWrite, Debug, PartialEq, Eq, Clone)]
#[brw(magic(b"\x02"))]
pub struct Dialect {
    pub name: binrw::NullString,
}

impl From<&str> for Dialect {
    fn from(value: &str) -> Self {
        Dialect {
            name: binrw::NullString::from(value),
        }
    }
}

/// SMB_COM_NEGOTIATE request: the client's dialect list.
#[smb_request_binrw]
#[brw(little)]
pub struct NegotiateRequest {
    #[bw(calc = 0)]
    #[br(temp)]
    #[br(assert(_word_count == 0))]
    _word_count: u8,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    byte_count: PosMarker<u16>,
    #[br(map_stream = |s| s.take_seek(byte_count.value.into()), parse_with = binrw::helpers::until_eof)]
    #[bw(write_with = PosMarker::write_size, args(&byte_count))]
    pub dialects: Vec<Dialect>,
}

impl NegotiateRequest {
    /// Index of the preferred NT LM 0.12 dialect, if offered.
    pub fn nt_lm_index(&self) -> Option<u16> {
        self.dialects
            .iter()
            .position(|d| d.name.to_string() == DIALECT_NT_LM_012)
            .map(|i| i as u16)
    }

    /// Whether the client also speaks SMB2.
    pub fn is_smb2_supported(&self) -> bool {
        self.dialects.iter().any(|d| {
            let name = d.name.to_string();
            name == DIALECT_SMB2_002 || name == DIALECT_SMB2_WILDCARD
        })
    }
}

/// SecurityMode field of the NEGOTIATE response.
#[smbd_dtyp::mbitfield]
#[repr(u8)]
pub struct SecurityMode {
    /// User-level security (as opposed to share-level).
    pub user_security: bool,
    /// Challenge/response authentication.
    pub encrypt_passwords: bool,
    /// Message signing is enabled.
    pub security_signatures_enabled: bool,
    /// Message signing is required.
    pub security_signatures_required: bool,
    #[skip]
    __: B4,
}

/// Server capability bits of the NEGOTIATE response.
#[smbd_dtyp::mbitfield]
pub struct Capabilities {
    pub raw_mode: bool,
    pub mpx_mode: bool,
    pub unicode: bool,
    pub large_files: bool,

    pub nt_smbs: bool,
    pub rpc_remote_apis: bool,
    pub nt_status: bool,
    pub level_ii_oplocks: bool,

    pub lock_and_read: bool,
    pub nt_find: bool,
    #[skip]
    __: B2,

    pub dfs: bool,
    pub infolevel_passthru: bool,
    pub large_readx: bool,
    pub large_writex: bool,

    #[skip]
    __: B7,
    /// CIFS Unix extensions.
    pub unix: bool,

    #[skip]
    __: B7,
    pub extended_security: bool,
}

/// SMB_COM_NEGOTIATE response in the NT LM 0.12 (17-word) form.
///
/// `dialect_index` of 0xFFFF tells the client no offered dialect was
/// acceptable.
#[smb_response_binrw]
#[brw(little, import(unicode: bool))]
pub struct NegotiateResponse {
    #[bw(calc = 17)]
    #[br(temp)]
    #[br(assert(_word_count == 17))]
    _word_count: u8,
    pub dialect_index: u16,
    pub security_mode: SecurityMode,
    pub max_mpx_count: u16,
    pub max_number_vcs: u16,
    pub max_buffer_size: u32,
    pub max_raw_size: u32,
    pub session_key: u32,
    pub capabilities: Capabilities,
    pub system_time: FileTime,
    /// Minutes from UTC, negative eastward.
    pub server_time_zone: i16,
    #[bw(calc = 8)]
    #[br(temp)]
    #[br(assert(_encryption_key_length == 8))]
    _encryption_key_length: u8,
    #[bw(try_calc = u16::try_from(8 + domain_name.wire_len_nul(unicode)))]
    #[br(temp)]
    _byte_count: u16,
    /// The challenge nonce for NTLM authentication.
    pub encryption_key: [u8; 8],
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub domain_name: SmbString,
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        NegotiateRequest => single_dialect: NegotiateRequest {
            dialects: vec![Dialect::from(DIALECT_NT_LM_012)],
        } => "000c00024e54204c4d20302e313200"
    }

    #[test]
    fn test_dialect_selection() {
        let request = NegotiateRequest {
            dialects: vec![
                Dialect::from("PC NETWORK PROGRAM 1.0"),
                Dialect::from(DIALECT_NT_LM_012),
                Dialect::from(DIALECT_SMB2_002),
            ],
        };
        assert_eq!(request.nt_lm_index(), Some(1));
        assert!(request.is_smb2_supported());
    }

    #[test]
    fn test_response_round_trip() {
        let response = NegotiateResponse {
            dialect_index: 0,
            security_mode: SecurityMode::new()
                .with_user_security(true)
                .with_encrypt_passwords(true),
            max_mpx_count: 1,
            max_number_vcs: 1,
            max_buffer_size: 65535,
            max_raw_size: 65536,
            session_key: 0,
            capabilities: Capabilities::new()
                .with_unicode(true)
                .with_nt_smbs(true)
                .with_nt_status(true)
                .with_large_files(true),
            system_time: FileTime::from_unix(1_700_000_000, 0),
            server_time_zone: 0,
            encryption_key: [1, 2, 3, 4, 5, 6, 7, 8],
            domain_name: "WORKGROUP".into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        response.write_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        // 1 word count + 34 words + 2 byte count + 8 challenge + 20 domain.
        assert_eq!(data.len(), 1 + 34 + 2 + 8 + 20);
        let parsed = NegotiateResponse::read_args(&mut Cursor::new(&data), (true,)).unwrap();
        assert_eq!(parsed, response);
    }
}
