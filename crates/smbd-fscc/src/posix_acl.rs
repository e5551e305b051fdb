//! CIFS POSIX ACL wire format (SMB_QUERY_POSIX_ACL / SMB_SET_POSIX_ACL).

use binrw::prelude::*;

pub const CIFS_ACL_VERSION: u16 = 1;

/// Entry tags, matching the POSIX `ACL_*` tag values as carried on the wire.
#[binrw::binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(repr(u8))]
pub enum PosixAclTag {
    UserObj = 0x01,
    User = 0x02,
    GroupObj = 0x04,
    Group = 0x08,
    Mask = 0x10,
    Other = 0x20,
}

/// One POSIX ACL entry: a permission triplet for a tag/id pair.
///
/// The id is meaningful only for the `User` and `Group` tags; all-ones
/// otherwise.
#[binrw::binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct PosixAclEntry {
    pub tag: PosixAclTag,
    /// rwx bits, `0o0`..=`0o7`.
    pub perm: u8,
    pub id: u64,
}

impl PosixAclEntry {
    pub const NO_ID: u64 = u64::MAX;
}

/// The SMB_QUERY_POSIX_ACL payload: version, entry counts, then the access
/// entries followed by the default entries.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct PosixAclWire {
    #[bw(calc = CIFS_ACL_VERSION)]
    #[br(temp)]
    #[br(assert(_version == CIFS_ACL_VERSION, "unsupported POSIX ACL version {}", _version))]
    _version: u16,
    #[bw(try_calc = u16::try_from(access.len()))]
    #[br(temp)]
    access_entry_count: u16,
    #[bw(try_calc = u16::try_from(default.len()))]
    #[br(temp)]
    default_entry_count: u16,
    #[br(count = access_entry_count)]
    pub access: Vec<PosixAclEntry>,
    #[br(count = default_entry_count)]
    pub default: Vec<PosixAclEntry>,
}

impl PosixAclWire {
    /// Renders a minimal access ACL for a plain file mode.
    pub fn from_mode(mode: u32) -> Self {
        let entry = |tag, shift: u32| PosixAclEntry {
            tag,
            perm: ((mode >> shift) & 0o7) as u8,
            id: PosixAclEntry::NO_ID,
        };
        Self {
            access: vec![
                entry(PosixAclTag::UserObj, 6),
                entry(PosixAclTag::GroupObj, 3),
                entry(PosixAclTag::Other, 0),
            ],
            default: Vec::new(),
        }
    }

    /// Collapses the access entries back into mode permission bits.
    pub fn to_mode(&self) -> u32 {
        let mut mode = 0u32;
        for entry in &self.access {
            let perm = u32::from(entry.perm & 0o7);
            match entry.tag {
                PosixAclTag::UserObj => mode |= perm << 6,
                PosixAclTag::GroupObj | PosixAclTag::Mask => mode |= perm << 3,
                PosixAclTag::Other => mode |= perm,
                _ => {}
            }
        }
        mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        PosixAclEntry => other: PosixAclEntry {
            tag: PosixAclTag::Other,
            perm: 0o5,
            id: PosixAclEntry::NO_ID,
        } => "2005ffffffffffffffff"
    }

    #[test]
    fn test_mode_round_trip() {
        let acl = PosixAclWire::from_mode(0o754);
        assert_eq!(acl.to_mode(), 0o754);
        let mut cursor = Cursor::new(Vec::new());
        acl.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        assert_eq!(data.len(), 6 + 3 * 10);
        let parsed = PosixAclWire::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(parsed, acl);
    }
}
