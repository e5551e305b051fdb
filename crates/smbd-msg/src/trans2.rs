//! SMB_COM_TRANSACTION2 request envelope and sub-command parameter blocks.

use binrw::prelude::*;
use modular_bitfield::prelude::*;
use std::io::SeekFrom;

use smbd_dtyp::binrw_util::prelude::*;
use smbd_msg_derive::{smb_message_binrw, smb_request_binrw};

use crate::trans::write_aligned_blob;

/// TRANSACTION2 sub-command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans2SubCommand {
    FindFirst2,
    FindNext2,
    QueryFsInformation,
    SetFsInformation,
    QueryPathInformation,
    SetPathInformation,
    QueryFileInformation,
    SetFileInformation,
    CreateDirectory,
    GetDfsReferral,
}

impl TryFrom<u16> for Trans2SubCommand {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0001 => Self::FindFirst2,
            0x0002 => Self::FindNext2,
            0x0003 => Self::QueryFsInformation,
            0x0004 => Self::SetFsInformation,
            0x0005 => Self::QueryPathInformation,
            0x0006 => Self::SetPathInformation,
            0x0007 => Self::QueryFileInformation,
            0x0008 => Self::SetFileInformation,
            0x000d => Self::CreateDirectory,
            0x0010 => Self::GetDfsReferral,
            other => return Err(other),
        })
    }
}

/// SMB_COM_TRANSACTION2 request (15 words: 14 fixed + 1 setup word).
///
/// The single setup word is the sub-command; secondary (multi-part)
/// transactions are not served, so the total counts must equal the counts
/// carried here.
#[smb_request_binrw]
#[brw(little)]
pub struct Trans2Request {
    #[bw(calc = 15)]
    #[br(temp)]
    #[br(assert(_word_count == 15, "bad TRANSACTION2 word count {}", _word_count))]
    _word_count: u8,
    pub total_parameter_count: u16,
    pub total_data_count: u16,
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
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(setup_count == 1, "bad TRANSACTION2 setup count {}", setup_count))]
    setup_count: u8,
    reserved: u8,
    /// The sub-command; see [`Trans2SubCommand`].
    pub sub_command: u16,
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

impl Trans2Request {
    /// Whether the request is complete in this single part.
    pub fn is_single_part(&self) -> bool {
        usize::from(self.total_parameter_count) == self.params.len()
            && usize::from(self.total_data_count) == self.data.len()
    }
}

/// Flags of FIND_FIRST2/FIND_NEXT2.
#[smbd_dtyp::mbitfield]
pub struct FindFlags {
    /// Close the search after this request.
    pub close_after_request: bool,
    /// Close the search when the end of the directory is reached.
    pub close_at_eos: bool,
    /// Prefix each entry with a resume key.
    pub return_resume_keys: bool,
    /// Continue from where the previous search left off.
    pub continue_from_last: bool,

    /// Search with backup intent.
    pub with_backup_intent: bool,
    #[skip]
    __: B11,
}

/// TRANS2_FIND_FIRST2 parameter block.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct FindFirst2Params {
    pub search_attributes: u16,
    pub search_count: u16,
    pub flags: FindFlags,
    pub information_level: u16,
    pub search_storage_type: u32,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub file_name: SmbString,
}

/// TRANS2_FIND_FIRST2 response parameter block.
#[smb_message_binrw]
#[derive(Default, Clone)]
#[brw(little)]
pub struct FindFirst2ResponseParams {
    /// The search handle for FIND_NEXT2, valid until the search closes.
    pub sid: u16,
    pub search_count: u16,
    pub end_of_search: u16,
    pub ea_error_offset: u16,
    /// Offset in the data block of the last entry's file name, for resume.
    pub last_name_offset: u16,
}

/// TRANS2_FIND_NEXT2 parameter block.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct FindNext2Params {
    pub sid: u16,
    pub search_count: u16,
    pub information_level: u16,
    pub resume_key: u32,
    pub flags: FindFlags,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub file_name: SmbString,
}

/// TRANS2_FIND_NEXT2 response parameter block.
#[smb_message_binrw]
#[derive(Default, Clone)]
#[brw(little)]
pub struct FindNext2ResponseParams {
    pub search_count: u16,
    pub end_of_search: u16,
    pub ea_error_offset: u16,
    pub last_name_offset: u16,
}

/// TRANS2_QUERY_PATH_INFORMATION parameter block.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct QueryPathInfoParams {
    pub information_level: u16,
    reserved: u32,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub file_name: SmbString,
}

/// TRANS2_QUERY_FILE_INFORMATION parameter block.
#[smb_request_binrw]
#[brw(little)]
pub struct QueryFileInfoParams {
    pub fid: u16,
    pub information_level: u16,
}

/// TRANS2_SET_PATH_INFORMATION parameter block.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct SetPathInfoParams {
    pub information_level: u16,
    reserved: u32,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub file_name: SmbString,
}

/// TRANS2_SET_FILE_INFORMATION parameter block.
#[smb_request_binrw]
#[brw(little)]
pub struct SetFileInfoParams {
    pub fid: u16,
    pub information_level: u16,
    reserved: u16,
}

/// TRANS2_QUERY_FS_INFORMATION parameter block.
#[smb_request_binrw]
#[brw(little)]
pub struct QueryFsInfoParams {
    pub information_level: u16,
}

/// TRANS2_SET_FS_INFORMATION parameter block.
#[smb_request_binrw]
#[brw(little)]
pub struct SetFsInfoParams {
    pub fid: u16,
    pub information_level: u16,
}

/// TRANS2_CREATE_DIRECTORY parameter block.
#[smb_request_binrw]
#[brw(little, import(unicode: bool))]
pub struct Trans2CreateDirectoryParams {
    reserved: u32,
    #[brw(args_raw = SmbStrArgs::nul(unicode))]
    pub directory_name: SmbString,
}

/// Generic response parameter block for the SET_* sub-commands: the EA
/// error offset, zero on success.
#[smb_message_binrw]
#[derive(Default, Clone)]
#[brw(little)]
pub struct SetInfoResponseParams {
    pub ea_error_offset: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        FindFirst2ResponseParams: FindFirst2ResponseParams {
            sid: 1,
            search_count: 2,
            end_of_search: 0,
            ea_error_offset: 0,
            last_name_offset: 0x60,
        } => "01000200000000006000"
    }

    #[test]
    fn test_trans2_request_round_trip() {
        let params = {
            let p = FindFirst2Params {
                search_attributes: 0x16,
                search_count: 50,
                flags: FindFlags::new().with_close_at_eos(true),
                information_level: 0x104,
                search_storage_type: 0,
                file_name: "\\d\\*.TXT".into(),
            };
            let mut cursor = Cursor::new(Vec::new());
            p.write_args(&mut cursor, (true,)).unwrap();
            cursor.into_inner()
        };
        let request = Trans2Request {
            total_parameter_count: params.len() as u16,
            total_data_count: 0,
            max_parameter_count: 10,
            max_data_count: 16384,
            max_setup_count: 0,
            flags: 0,
            timeout: 0,
            sub_command: 0x0001,
            params,
            data: vec![],
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        let parsed = Trans2Request::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(parsed, request);
        assert!(parsed.is_single_part());
        assert_eq!(
            Trans2SubCommand::try_from(parsed.sub_command),
            Ok(Trans2SubCommand::FindFirst2)
        );

        let inner =
            FindFirst2Params::read_args(&mut Cursor::new(&parsed.params), (true,)).unwrap();
        assert_eq!(inner.file_name.as_str(), "\\d\\*.TXT");
        assert_eq!(inner.information_level, 0x104);
    }
}
