//! SMB_COM_ECHO messages.

use binrw::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;
use smbd_msg_derive::{smb_request_binrw, smb_response_binrw};

/// SMB_COM_ECHO request (1 word): repeat count and an opaque payload.
#[smb_request_binrw]
#[brw(little)]
pub struct EchoRequest {
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_word_count == 1))]
    _word_count: u8,
    pub echo_count: u16,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    byte_count: PosMarker<u16>,
    #[br(count = byte_count.value)]
    #[bw(write_with = PosMarker::write_size, args(&byte_count))]
    pub data: Vec<u8>,
}

/// SMB_COM_ECHO response (1 word): sequence number and the echoed payload.
#[smb_response_binrw]
#[brw(little)]
pub struct EchoResponse {
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_word_count == 1))]
    _word_count: u8,
    pub sequence_number: u16,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    byte_count: PosMarker<u16>,
    #[br(count = byte_count.value)]
    #[bw(write_with = PosMarker::write_size, args(&byte_count))]
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use smbd_tests::*;

    test_binrw! {
        EchoRequest: EchoRequest { echo_count: 1, data: vec![0xde, 0xad] } => "0101000200dead"
    }

    test_binrw! {
        EchoResponse: EchoResponse { sequence_number: 1, data: vec![0xde, 0xad] } => "0101000200dead"
    }
}
