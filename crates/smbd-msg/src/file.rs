//! Data transfer messages: SMB_COM_READ_ANDX, SMB_COM_WRITE_ANDX, their
//! legacy core variants, and SMB_COM_SEEK.

use binrw::prelude::*;
use std::io::SeekFrom;

use smbd_dtyp::binrw_util::prelude::*;
use smbd_msg_derive::{smb_request_binrw, smb_response_binrw};

use crate::AndX;

/// SMB_COM_READ_ANDX request (10 words, 12 with the large-offset extension).
#[smb_request_binrw]
#[brw(little)]
pub struct ReadRequest {
    #[br(temp)]
    #[br(assert(_word_count == 10 || _word_count == 12, "bad READ_ANDX word count {}", _word_count))]
    #[bw(calc = if offset_high.is_some() { 12 } else { 10 })]
    _word_count: u8,
    pub andx: AndX,
    pub fid: u16,
    pub offset: u32,
    pub max_count: u16,
    pub min_count: u16,
    /// High 16 bits of the read size for large reads; timeout for pipes.
    pub max_count_high: u32,
    pub remaining: u16,
    #[br(if(_word_count == 12))]
    pub offset_high: Option<u32>,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

impl ReadRequest {
    /// The full 64-bit read offset.
    pub fn full_offset(&self) -> u64 {
        u64::from(self.offset) | (u64::from(self.offset_high.unwrap_or(0)) << 32)
    }

    /// The requested read size, including the large-read high bits.
    pub fn full_count(&self) -> u32 {
        u32::from(self.max_count) | ((self.max_count_high & 0xffff) << 16)
    }
}

/// SMB_COM_READ_ANDX response (12 words). The data block sits at
/// `data_offset` from the header start; one pad byte keeps it off the
/// byte-count field.
#[smb_response_binrw]
#[brw(little)]
pub struct ReadResponse {
    #[bw(calc = 12)]
    #[br(temp)]
    #[br(assert(_word_count == 12))]
    _word_count: u8,
    pub andx: AndX,
    pub available: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _data_compaction_mode: u16,
    reserved: u16,
    #[bw(try_calc = u16::try_from(data.len() & 0xffff))]
    #[br(temp)]
    data_length: u16,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    data_offset: PosMarker<u16>,
    #[bw(try_calc = u16::try_from(data.len() >> 16))]
    #[br(temp)]
    data_length_high: u16,
    reserved: [u8; 8],
    #[bw(try_calc = u16::try_from(1 + data.len()))]
    #[br(temp)]
    _byte_count: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _pad: u8,
    #[br(seek_before = SeekFrom::Start(data_offset.value.into()))]
    #[br(count = u32::from(data_length) | (u32::from(data_length_high) << 16))]
    #[bw(write_with = PosMarker::write_aoff, args(&data_offset))]
    pub data: Vec<u8>,
}

/// SMB_COM_WRITE_ANDX request (12 words, 14 with the large-offset
/// extension). The data block is located through `data_offset`, absolute
/// from the header start.
#[smb_request_binrw]
#[brw(little)]
pub struct WriteRequest {
    #[br(temp)]
    #[br(assert(_word_count == 12 || _word_count == 14, "bad WRITE_ANDX word count {}", _word_count))]
    #[bw(calc = if offset_high.is_some() { 14 } else { 12 })]
    _word_count: u8,
    pub andx: AndX,
    pub fid: u16,
    pub offset: u32,
    pub timeout: u32,
    pub write_mode: WriteMode,
    pub remaining: u16,
    #[bw(try_calc = u16::try_from(data.len() >> 16))]
    #[br(temp)]
    data_length_high: u16,
    #[bw(try_calc = u16::try_from(data.len() & 0xffff))]
    #[br(temp)]
    data_length: u16,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    data_offset: PosMarker<u16>,
    #[br(if(_word_count == 14))]
    pub offset_high: Option<u32>,
    #[bw(try_calc = u16::try_from(1 + data.len()))]
    #[br(temp)]
    _byte_count: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _pad: u8,
    #[br(seek_before = SeekFrom::Start(data_offset.value.into()))]
    #[br(count = u32::from(data_length) | (u32::from(data_length_high) << 16))]
    #[bw(write_with = PosMarker::write_aoff, args(&data_offset))]
    pub data: Vec<u8>,
}

impl WriteRequest {
    pub fn full_offset(&self) -> u64 {
        u64::from(self.offset) | (u64::from(self.offset_high.unwrap_or(0)) << 32)
    }
}

/// WriteMode bits of SMB_COM_WRITE_ANDX.
#[smbd_dtyp::mbitfield]
pub struct WriteMode {
    /// Write through to stable storage before answering.
    pub write_through: bool,
    /// Return the number of bytes remaining.
    pub read_bytes_available: bool,
    #[skip]
    __: bool,
    /// Message-mode pipe write: the block is one message.
    pub message_start: bool,
    #[skip]
    __: modular_bitfield::prelude::B12,
}

/// SMB_COM_WRITE_ANDX response (6 words).
#[smb_response_binrw]
#[brw(little)]
pub struct WriteResponse {
    #[bw(calc = 6)]
    #[br(temp)]
    #[br(assert(_word_count == 6))]
    _word_count: u8,
    pub andx: AndX,
    pub count: u16,
    pub remaining: u16,
    pub count_high: u16,
    reserved: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

/// Legacy SMB_COM_READ request (5 words).
#[smb_request_binrw]
#[brw(little)]
pub struct ReadCoreRequest {
    #[bw(calc = 5)]
    #[br(temp)]
    #[br(assert(_word_count == 5))]
    _word_count: u8,
    pub fid: u16,
    pub count: u16,
    pub offset: u32,
    pub remaining: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

/// Legacy SMB_COM_READ response (5 words): count, then a data block
/// introduced by a buffer-format marker.
#[smb_response_binrw]
#[brw(little)]
pub struct ReadCoreResponse {
    #[bw(calc = 5)]
    #[br(temp)]
    #[br(assert(_word_count == 5))]
    _word_count: u8,
    #[bw(try_calc = u16::try_from(data.len()))]
    #[br(temp)]
    count: u16,
    reserved: [u8; 8],
    #[bw(try_calc = u16::try_from(3 + data.len()))]
    #[br(temp)]
    _byte_count: u16,
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_buffer_format == 1))]
    _buffer_format: u8,
    #[bw(try_calc = u16::try_from(data.len()))]
    #[br(temp)]
    _data_length: u16,
    #[br(count = count)]
    pub data: Vec<u8>,
}

/// Legacy SMB_COM_WRITE request (5 words).
#[smb_request_binrw]
#[brw(little)]
pub struct WriteCoreRequest {
    #[bw(calc = 5)]
    #[br(temp)]
    #[br(assert(_word_count == 5))]
    _word_count: u8,
    pub fid: u16,
    #[bw(try_calc = u16::try_from(data.len()))]
    #[br(temp)]
    count: u16,
    pub offset: u32,
    pub remaining: u16,
    #[bw(try_calc = u16::try_from(3 + data.len()))]
    #[br(temp)]
    _byte_count: u16,
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_buffer_format == 1))]
    _buffer_format: u8,
    #[bw(try_calc = u16::try_from(data.len()))]
    #[br(temp)]
    _data_length: u16,
    #[br(count = count)]
    pub data: Vec<u8>,
}

/// Legacy SMB_COM_WRITE response (1 word).
#[smb_response_binrw]
#[brw(little)]
pub struct WriteCoreResponse {
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_word_count == 1))]
    _word_count: u8,
    pub count: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

/// Seek origin of SMB_COM_SEEK.
#[binrw::binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little, repr(u16))]
pub enum SeekMode {
    Start = 0,
    Current = 1,
    End = 2,
}

/// SMB_COM_SEEK request (4 words).
#[smb_request_binrw]
#[brw(little)]
pub struct SeekRequest {
    #[bw(calc = 4)]
    #[br(temp)]
    #[br(assert(_word_count == 4))]
    _word_count: u8,
    pub fid: u16,
    pub mode: SeekMode,
    pub offset: i32,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

/// SMB_COM_SEEK response (2 words): the resulting absolute offset.
#[smb_response_binrw]
#[brw(little)]
pub struct SeekResponse {
    #[bw(calc = 2)]
    #[br(temp)]
    #[br(assert(_word_count == 2))]
    _word_count: u8,
    pub offset: u32,
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
        WriteResponse: WriteResponse {
            andx: AndX::none(),
            count: 5,
            remaining: 0xffff,
            count_high: 0,
        } => "06ff0000000500ffff000000000000"
    }

    test_binrw! {
        SeekRequest: SeekRequest {
            fid: 2,
            mode: SeekMode::End,
            offset: -16,
        } => "0402000200f0ffffff0000"
    }

    #[test]
    fn test_read_request_parses_both_word_counts() {
        let short = ReadRequest {
            andx: AndX::none(),
            fid: 1,
            offset: 1024,
            max_count: 512,
            min_count: 0,
            max_count_high: 0,
            remaining: 0,
            offset_high: None,
        };
        let mut cursor = Cursor::new(Vec::new());
        short.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        assert_eq!(data.len(), 1 + 20 + 2);
        assert_eq!(ReadRequest::read(&mut Cursor::new(&data)).unwrap(), short);

        let large = ReadRequest {
            offset_high: Some(2),
            ..short
        };
        let mut cursor = Cursor::new(Vec::new());
        large.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        assert_eq!(data.len(), 1 + 24 + 2);
        let parsed = ReadRequest::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(parsed.full_offset(), (2u64 << 32) | 1024);
    }

    #[test]
    fn test_write_request_data_through_offset() {
        let request = WriteRequest {
            andx: AndX::none(),
            fid: 1,
            offset: 0,
            timeout: 0,
            write_mode: WriteMode::new(),
            remaining: 0,
            offset_high: None,
            data: b"HELLO".to_vec(),
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        let parsed = WriteRequest::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(parsed.data, b"HELLO");
    }

    #[test]
    fn test_read_response_data_offset_patched() {
        let response = ReadResponse {
            andx: AndX::none(),
            available: 0,
            data: b"HELLO".to_vec(),
        };
        let mut cursor = Cursor::new(Vec::new());
        response.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        // data_offset field lives at byte 13..15 of the body.
        let data_offset = u16::from_le_bytes([data[13], data[14]]) as usize;
        assert_eq!(&data[data_offset..data_offset + 5], b"HELLO");
    }
}
