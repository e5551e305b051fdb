//! MS-DTYP 2.4.6: Security Descriptor

use binrw::prelude::*;

use crate::binrw_util::prelude::*;

use super::{ACL, SID};

/// Self-relative security descriptor.
///
/// Offsets of the owner/group/DACL parts are relative to the start of the
/// descriptor and are zero for absent parts. The SACL is accepted on parse
/// but this server never produces one.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct SecurityDescriptor {
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    _sd_begin: PosMarker<()>,

    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_revision == 1))]
    _revision: u8,
    pub sbz1: u8,
    #[brw(assert(control.self_relative()))]
    pub control: SecurityDescriptorControl,

    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    offset_owner: PosMarker<u32>,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    offset_group: PosMarker<u32>,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    offset_sacl: PosMarker<u32>,
    #[bw(calc = PosMarker::default())]
    #[br(temp)]
    offset_dacl: PosMarker<u32>,

    #[br(if(offset_owner.value != 0))]
    #[bw(if(owner_sid.is_some()))]
    #[bw(write_with = PosMarker::write_roff_b, args(&offset_owner, &_sd_begin))]
    pub owner_sid: Option<SID>,

    #[br(if(offset_group.value != 0))]
    #[bw(if(group_sid.is_some()))]
    #[bw(write_with = PosMarker::write_roff_b, args(&offset_group, &_sd_begin))]
    pub group_sid: Option<SID>,

    #[bw(assert(sacl.is_some() == control.sacl_present()))]
    #[br(assert((offset_sacl.value != 0) == (control.sacl_present())))]
    #[bw(if(sacl.is_some()))]
    #[bw(write_with = PosMarker::write_roff_b, args(&offset_sacl, &_sd_begin))]
    #[br(if(offset_sacl.value != 0))]
    pub sacl: Option<ACL>,

    #[bw(assert(dacl.is_some() == control.dacl_present()))]
    #[br(assert((offset_dacl.value != 0) == control.dacl_present()))]
    #[bw(if(dacl.is_some()))]
    #[bw(write_with = PosMarker::write_roff_b, args(&offset_dacl, &_sd_begin))]
    #[br(if(offset_dacl.value != 0))]
    pub dacl: Option<ACL>,
}

#[crate::mbitfield]
pub struct SecurityDescriptorControl {
    pub owner_defaulted: bool,
    pub group_defaulted: bool,
    pub dacl_present: bool,
    pub dacl_defaulted: bool,

    pub sacl_present: bool,
    pub sacl_defaulted: bool,
    pub dacl_trusted: bool,
    pub server_security: bool,

    pub dacl_computed: bool,
    pub sacl_computed: bool,
    pub dacl_auto_inherited: bool,
    pub sacl_auto_inherited: bool,

    pub dacl_protected: bool,
    pub sacl_protected: bool,
    pub rm_control_valid: bool,
    pub self_relative: bool,
}

impl SecurityDescriptor {
    /// Builds a self-relative descriptor with the given parts; the control
    /// presence bits are derived from what is actually carried.
    pub fn new(owner_sid: Option<SID>, group_sid: Option<SID>, dacl: Option<ACL>) -> Self {
        let control = SecurityDescriptorControl::new()
            .with_self_relative(true)
            .with_dacl_present(dacl.is_some());
        Self {
            sbz1: 0,
            control,
            owner_sid,
            group_sid,
            sacl: None,
            dacl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{ACE, AccessMask, AclRevision};
    use std::str::FromStr;

    #[test]
    fn test_round_trip_with_dacl() {
        let sd = SecurityDescriptor::new(
            Some(SID::unix_user(1000)),
            Some(SID::unix_group(1000)),
            Some(ACL {
                acl_revision: AclRevision::Nt4,
                ace: vec![ACE::allowed(
                    SID::from_str(SID::S_EVERYONE).unwrap(),
                    AccessMask::new().with_read_data(true),
                )],
            }),
        );
        let mut cursor = binrw::io::Cursor::new(Vec::new());
        sd.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        let parsed = SecurityDescriptor::read(&mut binrw::io::Cursor::new(&data)).unwrap();
        assert_eq!(parsed, sd);
    }

    #[test]
    fn test_absent_dacl_round_trip() {
        let sd = SecurityDescriptor::new(Some(SID::unix_user(0)), None, None);
        let mut cursor = binrw::io::Cursor::new(Vec::new());
        sd.write(&mut cursor).unwrap();
        let parsed =
            SecurityDescriptor::read(&mut binrw::io::Cursor::new(&cursor.into_inner())).unwrap();
        assert!(parsed.dacl.is_none());
        assert!(!parsed.control.dacl_present());
    }
}
