//! The NT security-descriptor codec: SID ↔ uid/gid through the id-mapping
//! oracle, DACL ↔ POSIX mode, and the DACL access check.

use std::str::FromStr;

use smbd_dtyp::security::{ACE, ACL, AccessMask, AclRevision, SID, SecurityDescriptor};

use crate::idmap::{IdKind, IdMapOracle, IdMapping, descriptor};
use crate::{Error, Result};

/// Rights granted by every encoded ACE, whatever the mode says.
pub fn set_minimum_rights() -> AccessMask {
    AccessMask::new()
        .with_read_control(true)
        .with_synchronize(true)
        .with_read_attributes(true)
}

fn read_rights() -> AccessMask {
    AccessMask::new().with_read_data(true).with_read_ea(true)
}

fn write_rights() -> AccessMask {
    AccessMask::new()
        .with_write_data(true)
        .with_append_data(true)
        .with_write_ea(true)
        .with_write_attributes(true)
}

fn exec_rights() -> AccessMask {
    AccessMask::new().with_execute(true)
}

/// Translates one rwx triplet into an ACE access mask.
fn mask_for_rwx(rwx: u32) -> AccessMask {
    let mut mask = set_minimum_rights().value();
    if rwx & 0o4 != 0 {
        mask |= read_rights().value();
    }
    if rwx & 0o2 != 0 {
        mask |= write_rights().value();
    }
    if rwx & 0o1 != 0 {
        mask |= exec_rights().value();
    }
    AccessMask::from_value(mask)
}

/// Translates an ACE access mask back into rwx bits.
fn rwx_for_mask(mask: &AccessMask) -> u32 {
    let mut rwx = 0;
    if mask.generic_all() {
        return 0o7;
    }
    if mask.read_data() || mask.generic_read() {
        rwx |= 0o4;
    }
    if mask.write_data() || mask.append_data() || mask.generic_write() {
        rwx |= 0o2;
    }
    if mask.execute() || mask.generic_execute() {
        rwx |= 0o1;
    }
    rwx
}

/// The SID ↔ id and DACL ↔ mode codec, bound to an id-mapping oracle.
pub struct SecDescCodec<'a> {
    oracle: &'a dyn IdMapOracle,
}

impl<'a> SecDescCodec<'a> {
    pub fn new(oracle: &'a dyn IdMapOracle) -> Self {
        Self { oracle }
    }

    /// Renders an id as a SID through the oracle. Failure here is fatal:
    /// an outgoing descriptor cannot be built without it.
    pub fn id_to_sid(&self, id: u32, kind: IdKind) -> Result<SID> {
        match self.oracle.resolve(&descriptor::for_id(id, kind)) {
            Some(IdMapping::Sid(sid)) => Ok(sid),
            Some(IdMapping::Id(_)) => Err(Error::fault(format!(
                "idmap oracle answered an id for descriptor {}",
                descriptor::for_id(id, kind)
            ))),
            None => Err(Error::NotFound(format!("idmap for id {id}"))),
        }
    }

    /// Resolves a SID to a local id. Failure is non-fatal; the caller
    /// falls back to mount defaults.
    pub fn sid_to_id(&self, sid: &SID, kind: IdKind) -> Option<u32> {
        match self.oracle.resolve(&descriptor::for_sid(sid, kind)) {
            Some(IdMapping::Id(id)) => Some(id),
            Some(IdMapping::Sid(_)) | None => {
                log::debug!("no local id for {sid}, falling back to defaults");
                None
            }
        }
    }

    /// Builds the self-relative descriptor for a file's mode and owner.
    ///
    /// The DACL carries exactly three ALLOWED ACEs, for the owner, group
    /// and everyone SIDs, derived from the mode's rwx triplets.
    pub fn build(&self, mode: u32, uid: u32, gid: u32) -> Result<SecurityDescriptor> {
        let owner = self.id_to_sid(uid, IdKind::Owner)?;
        let group = self.id_to_sid(gid, IdKind::Group)?;
        let everyone = well_known_everyone();

        let dacl = ACL {
            acl_revision: AclRevision::Nt4,
            ace: vec![
                ACE::allowed(owner.clone(), mask_for_rwx((mode >> 6) & 0o7)),
                ACE::allowed(group.clone(), mask_for_rwx((mode >> 3) & 0o7)),
                ACE::allowed(everyone, mask_for_rwx(mode & 0o7)),
            ],
        };
        Ok(SecurityDescriptor::new(Some(owner), Some(group), Some(dacl)))
    }

    /// Decodes an incoming descriptor into chmod/chown material.
    ///
    /// Returns `(mode, uid, gid)`; each part is `None` when the descriptor
    /// does not carry it or the oracle cannot map it.
    pub fn apply(&self, sd: &SecurityDescriptor) -> (Option<u32>, Option<u32>, Option<u32>) {
        let uid = sd
            .owner_sid
            .as_ref()
            .and_then(|sid| self.sid_to_id(sid, IdKind::Owner));
        let gid = sd
            .group_sid
            .as_ref()
            .and_then(|sid| self.sid_to_id(sid, IdKind::Group));
        let mode = sd
            .dacl
            .as_ref()
            .map(|dacl| mode_from_dacl(dacl, sd.owner_sid.as_ref(), sd.group_sid.as_ref()));
        (mode, uid, gid)
    }
}

fn well_known_everyone() -> SID {
    SID::from_str(SID::S_EVERYONE).expect("well-known SID literal")
}

fn well_known_authenticated_users() -> SID {
    SID::from_str(SID::S_AUTHENTICATED_USERS).expect("well-known SID literal")
}

/// Decodes a DACL into permission bits.
///
/// ACEs are processed in wire order; DENY entries mask bits off the
/// matching triplet, ALLOW entries set them. An empty DACL yields no
/// permission. (An *absent* DACL means full permission, which is the
/// caller's case before it ever reaches here.)
pub fn mode_from_dacl(dacl: &ACL, owner: Option<&SID>, group: Option<&SID>) -> u32 {
    let everyone = well_known_everyone();
    let auth_users = well_known_authenticated_users();
    let mut mode = 0u32;

    for ace in &dacl.ace {
        let rwx = rwx_for_mask(&ace.access_mask);
        // Triplets this ACE's subject addresses. Everyone and
        // authenticated-users land in the "other" triplet; an owner SID
        // that doubles as the group SID addresses both.
        let mut shifts = [None; 3];
        if ace.sid == everyone || ace.sid == auth_users {
            shifts[2] = Some(0);
        } else {
            if Some(&ace.sid) == owner {
                shifts[0] = Some(6);
            }
            if Some(&ace.sid) == group {
                shifts[1] = Some(3);
            }
        }
        for shift in shifts.into_iter().flatten() {
            if ace.is_allow() {
                mode |= rwx << shift;
            } else {
                mode &= !(rwx << shift);
            }
        }
    }
    mode
}

/// The DACL access check: can `holder_sids` obtain `desired`?
///
/// DENY-before-ALLOW is honored by walking ACEs in wire order. The verdict
/// starts out denied; only an explicit grant covering the desired rights
/// upgrades it.
pub fn check_access(
    dacl: Option<&ACL>,
    holder_sids: &[SID],
    desired: &AccessMask,
) -> Result<AccessMask> {
    // No DACL at all: everything is granted.
    let Some(dacl) = dacl else {
        return Ok(*desired);
    };

    let everyone = well_known_everyone();
    let auth_users = well_known_authenticated_users();
    let desired_bits = desired.value() & !AccessMask::new().with_maximum_allowed(true).value();
    let want_maximum = desired.maximum_allowed();
    let mut granted = 0u32;

    for ace in &dacl.ace {
        let subject_matches = ace.sid == everyone
            || ace.sid == auth_users
            || holder_sids.iter().any(|sid| *sid == ace.sid);
        if !subject_matches {
            continue;
        }
        let ace_bits = ace.access_mask.value();
        if ace.is_allow() {
            granted |= ace_bits;
        } else if ace_bits & desired_bits != 0 {
            // An applicable DENY on any desired bit settles it.
            return Err(Error::AccessDenied("denied by DACL"));
        } else {
            granted &= !ace_bits;
        }
    }

    if want_maximum {
        return Ok(AccessMask::from_value(granted));
    }
    if granted & desired_bits == desired_bits {
        Ok(AccessMask::from_value(desired_bits))
    } else {
        Err(Error::AccessDenied("rights not granted by DACL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idmap::UnixSidOracle;

    fn codec() -> SecDescCodec<'static> {
        static ORACLE: UnixSidOracle = UnixSidOracle;
        SecDescCodec::new(&ORACLE)
    }

    #[test]
    fn test_dacl_mode_round_trip() {
        for mode in [0o644, 0o755, 0o700, 0o007, 0o777, 0o000] {
            let sd = codec().build(mode, 1000, 100).unwrap();
            let (decoded, uid, gid) = codec().apply(&sd);
            assert_eq!(decoded, Some(mode), "mode {mode:o}");
            assert_eq!(uid, Some(1000));
            assert_eq!(gid, Some(100));
        }
    }

    #[test]
    fn test_empty_dacl_is_no_permission() {
        let sd = SecurityDescriptor::new(None, None, Some(ACL::empty()));
        let (mode, _, _) = codec().apply(&sd);
        assert_eq!(mode, Some(0));
    }

    #[test]
    fn test_deny_masks_bits_in_wire_order() {
        let owner = SID::unix_user(1000);
        let dacl = ACL {
            acl_revision: AclRevision::Nt4,
            ace: vec![
                ACE::allowed(owner.clone(), mask_for_rwx(0o7)),
                ACE::denied(owner.clone(), mask_for_rwx(0o2)),
            ],
        };
        assert_eq!(mode_from_dacl(&dacl, Some(&owner), None), 0o500);
    }

    #[test]
    fn test_access_check_defaults_to_denied() {
        let holder = SID::unix_user(1);
        let dacl = ACL::empty();
        let desired = AccessMask::new().with_read_data(true);
        assert!(check_access(Some(&dacl), &[holder], &desired).is_err());
    }

    #[test]
    fn test_access_check_absent_dacl_grants_all() {
        let desired = AccessMask::new().with_read_data(true).with_write_data(true);
        let granted = check_access(None, &[], &desired).unwrap();
        assert_eq!(granted.value(), desired.value());
    }

    #[test]
    fn test_access_check_deny_before_allow() {
        let holder = SID::unix_user(9);
        let dacl = ACL {
            acl_revision: AclRevision::Nt4,
            ace: vec![
                ACE::denied(holder.clone(), AccessMask::new().with_write_data(true)),
                ACE::allowed(holder.clone(), mask_for_rwx(0o7)),
            ],
        };
        let write = AccessMask::new().with_write_data(true);
        assert!(check_access(Some(&dacl), &[holder.clone()], &write).is_err());
        let read = AccessMask::new().with_read_data(true);
        assert!(check_access(Some(&dacl), &[holder], &read).is_ok());
    }
}
