//! MS-DTYP 2.4.4/2.4.5: ACE and ACL

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use super::SID;

/// Access rights bits shared by all ACE kinds.
///
/// Reference: MS-DTYP 2.4.3
#[crate::mbitfield]
pub struct AccessMask {
    pub read_data: bool,
    pub write_data: bool,
    pub append_data: bool,
    pub read_ea: bool,
    pub write_ea: bool,
    pub execute: bool,
    pub delete_child: bool,
    pub read_attributes: bool,

    pub write_attributes: bool,
    #[skip]
    __: B7,

    pub delete: bool,
    pub read_control: bool,
    pub write_dac: bool,
    pub write_owner: bool,
    pub synchronize: bool,
    #[skip]
    __: B3,

    pub system_security: bool,
    pub maximum_allowed: bool,
    #[skip]
    __: B2,
    pub generic_all: bool,
    pub generic_execute: bool,
    pub generic_write: bool,
    pub generic_read: bool,
}

impl AccessMask {
    pub fn value(&self) -> u32 {
        u32::from_le_bytes(self.into_bytes())
    }

    pub fn from_value(value: u32) -> Self {
        Self::from_bytes(value.to_le_bytes())
    }
}

/// ACE type discriminator. Only the access ACEs the DACL codec produces
/// and consumes are recognized; object ACEs fail the parse.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[brw(repr(u8))]
pub enum AceType {
    AccessAllowed = 0,
    AccessDenied = 1,
    SystemAudit = 2,
    SystemAlarm = 3,
}

#[crate::mbitfield]
#[repr(u8)]
pub struct AceFlags {
    pub object_inherit: bool,
    pub container_inherit: bool,
    pub no_propagate_inherit: bool,
    pub inherit_only: bool,

    pub inherited: bool,
    #[skip]
    __: bool,
    pub successful_access: bool,
    pub failed_access: bool,
}

/// A single access-control entry.
///
/// The declared size may exceed the parsed fields (application data is
/// permitted after the SID); parsing consumes up to the declared end, and
/// fails if the size would not even cover the mandatory fields.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct ACE {
    pub ace_type: AceType,
    pub ace_flags: AceFlags,
    #[bw(try_calc = u16::try_from(sid.wire_size() + 8))]
    #[br(temp)]
    #[br(assert(ace_size >= 16, "ACE size {} below minimum", ace_size))]
    ace_size: u16,
    pub access_mask: AccessMask,
    #[br(assert(usize::from(ace_size) >= 8 + sid.wire_size(), "ACE size {} does not cover its SID", ace_size))]
    pub sid: SID,
    // Application data is permitted after the SID, up to the declared size.
    #[br(temp, count = usize::from(ace_size).saturating_sub(8 + sid.wire_size()))]
    #[bw(calc = Vec::new())]
    _trailing: Vec<u8>,
}

impl ACE {
    pub fn allowed(sid: SID, access_mask: AccessMask) -> Self {
        Self {
            ace_type: AceType::AccessAllowed,
            ace_flags: AceFlags::new(),
            access_mask,
            sid,
        }
    }

    pub fn denied(sid: SID, access_mask: AccessMask) -> Self {
        Self {
            ace_type: AceType::AccessDenied,
            ace_flags: AceFlags::new(),
            access_mask,
            sid,
        }
    }

    pub fn is_allow(&self) -> bool {
        self.ace_type == AceType::AccessAllowed
    }
}

/// An access-control list: a revision header followed by its ACEs.
///
/// The declared ACL size bounds the ACE area; an ACE whose declared size
/// walks past it fails the parse rather than reading out of bounds.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct ACL {
    #[bw(calc = crate::binrw_util::prelude::PosMarker::default())]
    #[br(temp)]
    _acl_start: crate::binrw_util::prelude::PosMarker<()>,
    pub acl_revision: AclRevision,
    #[bw(calc = 0)]
    #[br(temp)]
    #[br(assert(sbz1 == 0))]
    sbz1: u8,
    #[bw(calc = crate::binrw_util::prelude::PosMarker::default())]
    #[br(temp)]
    _acl_size: crate::binrw_util::prelude::PosMarker<u16>,
    #[bw(calc = ace.len() as u16)]
    #[br(temp)]
    ace_count: u16,
    #[bw(calc = 0)]
    #[br(temp)]
    #[br(assert(sbz2 == 0))]
    sbz2: u16,

    #[br(count = ace_count)]
    #[br(map_stream = |s| binrw::io::TakeSeekExt::take_seek(s, _acl_size.value.saturating_sub(Self::HEADER_SIZE as u16).into()))]
    #[bw(write_with = crate::binrw_util::prelude::PosMarker::write_size_plus, args(&_acl_size, Self::HEADER_SIZE))]
    pub ace: Vec<ACE>,
}

impl ACL {
    const HEADER_SIZE: u64 = 8;

    /// An ACL that grants or denies nothing ("no permission" when present).
    pub fn empty() -> Self {
        Self {
            acl_revision: AclRevision::Nt4,
            ace: Vec::new(),
        }
    }
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[brw(repr(u8))]
pub enum AclRevision {
    /// Windows NT 4.0
    Nt4 = 2,
    /// Active directory
    DS = 4,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn everyone_allow() -> ACE {
        ACE::allowed(
            SID::from_str(SID::S_EVERYONE).unwrap(),
            AccessMask::new().with_read_data(true).with_execute(true),
        )
    }

    #[test]
    fn test_acl_round_trip() {
        let acl = ACL {
            acl_revision: AclRevision::Nt4,
            ace: vec![
                ACE::denied(SID::unix_user(7), AccessMask::new().with_write_data(true)),
                everyone_allow(),
            ],
        };
        let mut cursor = binrw::io::Cursor::new(Vec::new());
        acl.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        // Size field covers header + both ACEs.
        assert_eq!(
            u16::from_le_bytes([data[2], data[3]]) as usize,
            data.len()
        );
        let parsed = ACL::read(&mut binrw::io::Cursor::new(&data)).unwrap();
        assert_eq!(parsed, acl);
    }

    #[test]
    fn test_ace_size_below_minimum_rejected() {
        // type=0 flags=0 size=8: cannot cover mask + SID header.
        let data = smbd_tests::decode_hex("02000c000100000000000800010000000000000100000000");
        assert!(ACL::read(&mut binrw::io::Cursor::new(&data)).is_err());
    }

    #[test]
    fn test_ace_overrunning_acl_rejected() {
        let mut cursor = binrw::io::Cursor::new(Vec::new());
        ACL {
            acl_revision: AclRevision::Nt4,
            ace: vec![everyone_allow()],
        }
        .write(&mut cursor)
        .unwrap();
        let mut data = cursor.into_inner();
        // Inflate the ACE's declared size past the ACL end.
        data[10] = 0x40;
        assert!(ACL::read(&mut binrw::io::Cursor::new(&data)).is_err());
    }
}
