//! SMB_COM_NT_TRANSACT envelope and the security-descriptor subfunction
//! parameter blocks.

use binrw::prelude::*;
use std::io::SeekFrom;

use smbd_dtyp::binrw_util::prelude::*;
use smbd_msg_derive::{smb_message_binrw, smb_request_binrw, smb_response_binrw};

use crate::trans::write_aligned_blob32;

/// NT_TRANSACT_SET_SECURITY_DESC.
pub const NT_TRANSACT_SET_SECURITY_DESC: u16 = 3;
/// NT_TRANSACT_QUERY_SECURITY_DESC.
pub const NT_TRANSACT_QUERY_SECURITY_DESC: u16 = 6;

/// SMB_COM_NT_TRANSACT request (19 + SetupCount words).
#[smb_request_binrw]
#[brw(little)]
pub struct NtTransactRequest {
    #[bw(try_calc = u8::try_from(19 + setup.len()))]
    #[br(temp)]
    #[br(assert(_word_count >= 19))]
    _word_count: u8,
    pub max_setup_count: u8,
    reserved: u16,
    #[bw(try_calc = u32::try_from(params.len()))]
    #[br(temp)]
    _total_parameter_count: u32,
    #[bw(try_calc = u32::try_from(data.len()))]
    #[br(temp)]
    _total_data_count: u32,
    pub max_parameter_count: u32,
    pub max_data_count: u32,
    #[bw(try_calc = u32::try_from(params.len()))]
    #[br(temp)]
    parameter_count: u32,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    parameter_offset: PosMarker<u32>,
    #[bw(try_calc = u32::try_from(data.len()))]
    #[br(temp)]
    data_count: u32,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    data_offset: PosMarker<u32>,
    #[bw(try_calc = u8::try_from(setup.len()))]
    #[br(temp)]
    setup_count: u8,
    /// The subfunction code.
    pub function: u16,
    #[br(count = setup_count)]
    pub setup: Vec<u16>,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[br(seek_before = SeekFrom::Start(parameter_offset.value.into()), count = parameter_count)]
    #[bw(write_with = write_aligned_blob32, args(&parameter_offset, 4))]
    pub params: Vec<u8>,
    #[br(seek_before = SeekFrom::Start(data_offset.value.into()), count = data_count)]
    #[bw(write_with = write_aligned_blob32, args(&data_offset, 4))]
    pub data: Vec<u8>,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// SMB_COM_NT_TRANSACT response (18 + SetupCount words).
#[smb_response_binrw]
#[brw(little)]
pub struct NtTransResponse {
    #[bw(try_calc = u8::try_from(18 + setup.len()))]
    #[br(temp)]
    #[br(assert(_word_count >= 18))]
    _word_count: u8,
    reserved: [u8; 3],
    #[bw(try_calc = u32::try_from(params.len()))]
    #[br(temp)]
    _total_parameter_count: u32,
    #[bw(try_calc = u32::try_from(data.len()))]
    #[br(temp)]
    _total_data_count: u32,
    #[bw(try_calc = u32::try_from(params.len()))]
    #[br(temp)]
    parameter_count: u32,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    parameter_offset: PosMarker<u32>,
    #[bw(calc = 0)]
    #[br(temp)]
    _parameter_displacement: u32,
    #[bw(try_calc = u32::try_from(data.len()))]
    #[br(temp)]
    data_count: u32,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    data_offset: PosMarker<u32>,
    #[bw(calc = 0)]
    #[br(temp)]
    _data_displacement: u32,
    #[bw(try_calc = u8::try_from(setup.len()))]
    #[br(temp)]
    setup_count: u8,
    #[br(count = setup_count)]
    pub setup: Vec<u16>,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[br(seek_before = SeekFrom::Start(parameter_offset.value.into()), count = parameter_count)]
    #[bw(write_with = write_aligned_blob32, args(&parameter_offset, 4))]
    pub params: Vec<u8>,
    #[br(seek_before = SeekFrom::Start(data_offset.value.into()), count = data_count)]
    #[bw(write_with = write_aligned_blob32, args(&data_offset, 4))]
    pub data: Vec<u8>,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

impl NtTransResponse {
    pub fn new(params: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            setup: Vec::new(),
            params,
            data,
            _end: (),
        }
    }
}

/// Which descriptor parts a security query or set addresses.
#[smbd_dtyp::mbitfield]
pub struct SecurityInfoFields {
    pub owner: bool,
    pub group: bool,
    pub dacl: bool,
    pub sacl: bool,
    #[skip]
    __: modular_bitfield::prelude::B28,
}

/// Parameter block of both security-descriptor subfunctions.
#[smb_message_binrw]
#[derive(Clone, Copy)]
#[brw(little)]
pub struct SecurityDescParams {
    pub fid: u16,
    reserved: u16,
    pub security_info: SecurityInfoFields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        SecurityDescParams => dacl_query: SecurityDescParams {
            fid: 2,
            security_info: SecurityInfoFields::new().with_dacl(true),
        } => "0200000004000000"
    }

    #[test]
    fn test_nt_transact_round_trip() {
        let request = NtTransactRequest {
            max_setup_count: 0,
            max_parameter_count: 4,
            max_data_count: 0x10000,
            function: NT_TRANSACT_QUERY_SECURITY_DESC,
            setup: vec![],
            params: vec![1, 0, 0, 0, 4, 0, 0, 0],
            data: vec![],
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        let parsed = NtTransactRequest::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(parsed, request);
    }
}
