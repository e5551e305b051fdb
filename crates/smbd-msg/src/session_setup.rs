//! SMB_COM_SESSION_SETUP_ANDX and SMB_COM_LOGOFF_ANDX messages.

use binrw::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;
use smbd_msg_derive::{smb_request_binrw, smb_response_binrw};

use crate::{AndX, Capabilities};

/// SMB_COM_SESSION_SETUP_ANDX request, in the NTLM (13-word) form.
///
/// The case-insensitive password slot carries the LM response, the
/// case-sensitive slot the NTLM/NTLMv2 response; either may be empty.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct SessionSetupRequest {
    #[bw(calc = 13)]
    #[br(temp)]
    #[br(assert(_word_count == 13, "unsupported SESSION_SETUP word count {}", _word_count))]
    _word_count: u8,
    pub andx: AndX,
    pub max_buffer_size: u16,
    pub max_mpx_count: u16,
    pub vc_number: u16,
    pub session_key: u32,
    #[bw(try_calc = u16::try_from(case_insensitive_password.len()))]
    #[br(temp)]
    case_insensitive_password_length: u16,
    #[bw(try_calc = u16::try_from(case_sensitive_password.len()))]
    #[br(temp)]
    case_sensitive_password_length: u16,
    reserved: u32,
    pub capabilities: Capabilities,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[br(count = case_insensitive_password_length)]
    pub case_insensitive_password: Vec<u8>,
    #[br(count = case_sensitive_password_length)]
    pub case_sensitive_password: Vec<u8>,
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub account_name: SmbString,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub primary_domain: SmbString,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub native_os: SmbString,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub native_lan_man: SmbString,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// Action bits of the SESSION_SETUP response.
#[smbd_dtyp::mbitfield]
pub struct SessionSetupAction {
    /// The session was established as guest.
    pub guest: bool,
    #[skip]
    __: modular_bitfield::prelude::B15,
}

/// SMB_COM_SESSION_SETUP_ANDX response (3 words).
#[smb_response_binrw]
#[brw(little, import(unicode: bool))]
pub struct SessionSetupResponse {
    #[bw(calc = 3)]
    #[br(temp)]
    #[br(assert(_word_count == 3))]
    _word_count: u8,
    pub andx: AndX,
    pub action: SessionSetupAction,
    #[bw(try_calc = u16::try_from(
        native_os.wire_len_nul(unicode)
            + native_lan_man.wire_len_nul(unicode)
            + primary_domain.wire_len_nul(unicode)))]
    #[br(temp)]
    _byte_count: u16,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub native_os: SmbString,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub native_lan_man: SmbString,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub primary_domain: SmbString,
}

/// SMB_COM_LOGOFF_ANDX request (2 words, no bytes).
#[smb_request_binrw]
#[brw(little)]
pub struct LogoffRequest {
    #[bw(calc = 2)]
    #[br(temp)]
    #[br(assert(_word_count == 2))]
    _word_count: u8,
    pub andx: AndX,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

/// SMB_COM_LOGOFF_ANDX response.
#[smb_response_binrw]
#[brw(little)]
pub struct LogoffResponse {
    #[bw(calc = 2)]
    #[br(temp)]
    #[br(assert(_word_count == 2))]
    _word_count: u8,
    pub andx: AndX,
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
        LogoffResponse: LogoffResponse { andx: AndX::none() } => "02ff0000000000"
    }

    #[test]
    fn test_session_setup_request_round_trip() {
        let request = SessionSetupRequest {
            andx: AndX::none(),
            max_buffer_size: 4356,
            max_mpx_count: 1,
            vc_number: 0,
            session_key: 0,
            capabilities: Capabilities::new().with_unicode(true).with_nt_status(true),
            case_insensitive_password: vec![],
            case_sensitive_password: vec![0xab; 24],
            account_name: "alice".into(),
            primary_domain: "WORKGROUP".into(),
            native_os: "Linux".into(),
            native_lan_man: "smbd-rs".into(),
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        let parsed = SessionSetupRequest::read_args(&mut Cursor::new(&data), (true,)).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_session_setup_rejects_wrong_word_count() {
        // word count 10 (the pre-NT form) is not served.
        let data = smbd_tests::decode_hex("0aff00000000000000000000");
        assert!(SessionSetupRequest::read_args(&mut Cursor::new(&data), (false,)).is_err());
    }
}
