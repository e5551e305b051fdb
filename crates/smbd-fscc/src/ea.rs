//! OS/2-style extended attribute (FEA) lists, as carried by
//! SMB_INFO_QUERY_ALL_EAS and SMB_INFO_STANDARD set operations.

use binrw::io::TakeSeekExt;
use binrw::prelude::*;

use smbd_dtyp::binrw_util::prelude::*;

/// One extended attribute. The name is OEM-coded and null-terminated on the
/// wire; the value is an opaque byte blob.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct FeaEntry {
    pub flags: u8,
    #[bw(try_calc = u8::try_from(name.len()))]
    #[br(temp)]
    name_length: u8,
    #[bw(try_calc = u16::try_from(value.len()))]
    #[br(temp)]
    value_length: u16,
    #[br(count = name_length)]
    pub name: Vec<u8>,
    #[bw(calc = 0)]
    #[br(temp)]
    #[br(assert(_name_terminator == 0))]
    _name_terminator: u8,
    #[br(count = value_length)]
    pub value: Vec<u8>,
}

impl FeaEntry {
    pub fn new(name: &str, value: &[u8]) -> Self {
        Self {
            flags: 0,
            name: name.as_bytes().to_vec(),
            value: value.to_vec(),
        }
    }

    /// Size of this entry on the wire.
    pub fn wire_size(&self) -> usize {
        4 + self.name.len() + 1 + self.value.len()
    }
}

/// A FEALIST: a 32-bit total size (including the size field itself)
/// followed by the packed entries.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct FeaList {
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _list_size: PosMarker<u32>,
    #[br(map_stream = |s| s.take_seek(u64::from(_list_size.value).saturating_sub(4)), parse_with = binrw::helpers::until_eof)]
    #[bw(write_with = PosMarker::write_size_plus, args(&_list_size, 4))]
    pub entries: Vec<FeaEntry>,
}

impl From<Vec<FeaEntry>> for FeaList {
    fn from(entries: Vec<FeaEntry>) -> Self {
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        FeaEntry => plain: FeaEntry::new("COMMENT", b"hi") => "00070200434f4d4d454e54006869"
    }

    #[test]
    fn test_list_round_trip() {
        let list = FeaList::from(vec![
            FeaEntry::new("COMMENT", b"hello"),
            FeaEntry::new("ICON", &[1, 2, 3, 4]),
        ]);
        let mut cursor = Cursor::new(Vec::new());
        list.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        assert_eq!(
            u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize,
            data.len()
        );
        let parsed = FeaList::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(parsed, list);
    }

    #[test]
    fn test_empty_list() {
        let mut cursor = Cursor::new(Vec::new());
        FeaList::default().write(&mut cursor).unwrap();
        assert_eq!(cursor.get_ref().as_slice(), &[4, 0, 0, 0]);
        cursor.set_position(0);
        assert!(FeaList::read(&mut cursor).unwrap().entries.is_empty());
    }
}
