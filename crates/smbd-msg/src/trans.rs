//! SMB_COM_TRANSACTION (named-pipe) messages and the transaction response
//! envelope shared with TRANSACTION2.
//!
//! Parameter and data blocks are addressed by absolute offsets from the
//! start of the SMB header, so requests are parsed from (and responses
//! written into) the full message buffer.

use binrw::prelude::*;
use binrw::{BinResult, Endian};
use std::io::{Seek, SeekFrom, Write};

use smbd_dtyp::binrw_util::prelude::*;
use smbd_msg_derive::{smb_request_binrw, smb_response_binrw};

/// TransactNmPipe, the only TRANSACTION setup opcode the pipe service
/// handles.
pub const TRANS_TRANSACT_NMPIPE: u16 = 0x0026;

/// Pads to `align`, patches `marker` with the blob's absolute offset, and
/// writes the blob. Shared by the transaction request/response byte blocks.
pub(crate) fn write_aligned_blob<W: Write + Seek>(
    obj: &Vec<u8>,
    writer: &mut W,
    endian: Endian,
    (marker, align): (&PosMarker<u16>, u64),
) -> BinResult<()> {
    let pos = writer.stream_position()?;
    let aligned = pos.next_multiple_of(align);
    for _ in pos..aligned {
        0u8.write_options(writer, endian, ())?;
    }
    marker.patch(writer, endian, aligned)?;
    obj.write_options(writer, endian, ())?;
    Ok(())
}

/// [`write_aligned_blob`] for the 32-bit offset fields of NT_TRANSACT.
pub(crate) fn write_aligned_blob32<W: Write + Seek>(
    obj: &Vec<u8>,
    writer: &mut W,
    endian: Endian,
    (marker, align): (&PosMarker<u32>, u64),
) -> BinResult<()> {
    let pos = writer.stream_position()?;
    let aligned = pos.next_multiple_of(align);
    for _ in pos..aligned {
        0u8.write_options(writer, endian, ())?;
    }
    marker.patch(writer, endian, aligned)?;
    obj.write_options(writer, endian, ())?;
    Ok(())
}

/// SMB_COM_TRANSACTION request (14 + SetupCount words).
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct TransactionRequest {
    #[bw(try_calc = u8::try_from(14 + setup.len()))]
    #[br(temp)]
    #[br(assert(_word_count >= 14))]
    _word_count: u8,
    #[bw(try_calc = u16::try_from(params.len()))]
    #[br(temp)]
    _total_parameter_count: u16,
    #[bw(try_calc = u16::try_from(data.len()))]
    #[br(temp)]
    _total_data_count: u16,
    pub max_parameter_count: u16,
    pub max_data_count: u16,
    pub max_setup_count: u8,
    reserved: u8,
    pub flags: u16,
    pub timeout: u32,
    reserved: u16,
    #[bw(try_calc = u16::try_from(params.len()))]
    #[br(temp)]
    parameter_count: u16,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    parameter_offset: PosMarker<u16>,
    #[bw(try_calc = u16::try_from(data.len()))]
    #[br(temp)]
    data_count: u16,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    data_offset: PosMarker<u16>,
    #[bw(try_calc = u8::try_from(setup.len()))]
    #[br(temp)]
    setup_count: u8,
    reserved: u8,
    #[br(count = setup_count)]
    pub setup: Vec<u16>,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    /// The pipe path, e.g. `\PIPE\`.
    #[brw(args_raw = SmbStrArgs::nul_aligned(unicode))]
    pub name: SmbString,
    #[br(seek_before = SeekFrom::Start(parameter_offset.value.into()), count = parameter_count)]
    #[bw(write_with = write_aligned_blob, args(&parameter_offset, 4))]
    pub params: Vec<u8>,
    #[br(seek_before = SeekFrom::Start(data_offset.value.into()), count = data_count)]
    #[bw(write_with = write_aligned_blob, args(&data_offset, 4))]
    pub data: Vec<u8>,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

/// Response envelope shared by SMB_COM_TRANSACTION and SMB_COM_TRANSACTION2
/// (10 + SetupCount words). This server always answers a transaction in one
/// part, so the displacement fields are zero.
#[smb_response_binrw]
#[brw(little)]
pub struct TransResponse {
    #[bw(try_calc = u8::try_from(10 + setup.len()))]
    #[br(temp)]
    #[br(assert(_word_count >= 10))]
    _word_count: u8,
    #[bw(try_calc = u16::try_from(params.len()))]
    #[br(temp)]
    _total_parameter_count: u16,
    #[bw(try_calc = u16::try_from(data.len()))]
    #[br(temp)]
    _total_data_count: u16,
    reserved: u16,
    #[bw(try_calc = u16::try_from(params.len()))]
    #[br(temp)]
    parameter_count: u16,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    parameter_offset: PosMarker<u16>,
    #[bw(calc = 0)]
    #[br(temp)]
    _parameter_displacement: u16,
    #[bw(try_calc = u16::try_from(data.len()))]
    #[br(temp)]
    data_count: u16,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    data_offset: PosMarker<u16>,
    #[bw(calc = 0)]
    #[br(temp)]
    _data_displacement: u16,
    #[bw(try_calc = u8::try_from(setup.len()))]
    #[br(temp)]
    setup_count: u8,
    reserved: u8,
    #[br(count = setup_count)]
    pub setup: Vec<u16>,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _byte_count: PosMarker<u16>,
    #[br(seek_before = SeekFrom::Start(parameter_offset.value.into()), count = parameter_count)]
    #[bw(write_with = write_aligned_blob, args(&parameter_offset, 4))]
    pub params: Vec<u8>,
    #[br(seek_before = SeekFrom::Start(data_offset.value.into()), count = data_count)]
    #[bw(write_with = write_aligned_blob, args(&data_offset, 4))]
    pub data: Vec<u8>,
    #[br(ignore)]
    #[bw(write_with = PosMarker::write_tail_size, args(&_byte_count))]
    _end: (),
}

impl TransResponse {
    /// A response carrying only parameter and data blocks.
    pub fn new(params: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            setup: Vec::new(),
            params,
            data,
            _end: (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    #[test]
    fn test_transaction_request_round_trip() {
        let request = TransactionRequest {
            max_parameter_count: 0,
            max_data_count: 1024,
            max_setup_count: 0,
            flags: 0,
            timeout: 0,
            setup: vec![TRANS_TRANSACT_NMPIPE, 0x4000],
            name: "\\PIPE\\".into(),
            params: vec![],
            data: vec![1, 2, 3, 4, 5],
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write_args(&mut cursor, (true,)).unwrap();
        let data = cursor.into_inner();
        let parsed = TransactionRequest::read_args(&mut Cursor::new(&data), (true,)).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_trans_response_round_trip() {
        let response = TransResponse::new(vec![0xaa; 3], vec![0xbb; 9]);
        let mut cursor = Cursor::new(Vec::new());
        response.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        let parsed = TransResponse::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(parsed, response);
    }
}
