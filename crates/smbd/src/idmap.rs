//! The id-mapping oracle boundary (SID ↔ uid/gid).
//!
//! The oracle is an opaque blocking lookup keyed by a short printable
//! descriptor. The descriptor grammar is ours (see [`descriptor`]); caching
//! under a dedicated credential is the oracle implementation's concern, so
//! untrusted lookups cannot poison a shared cache.

use smbd_dtyp::SID;

/// Whether a mapping concerns a user (owner) or a group id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Owner,
    Group,
}

/// A resolved mapping returned by the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdMapping {
    /// Serialized SID for an id→SID query.
    Sid(SID),
    /// Local id for a SID→id query.
    Id(u32),
}

/// Descriptor strings presented to the oracle.
pub mod descriptor {
    use super::IdKind;
    use smbd_dtyp::SID;

    /// `oi:<id>` / `gi:<id>`, the id→SID query form.
    pub fn for_id(id: u32, kind: IdKind) -> String {
        match kind {
            IdKind::Owner => format!("oi:{id}"),
            IdKind::Group => format!("gi:{id}"),
        }
    }

    /// `os:S-…` / `gs:S-…`, the SID→id query form. The authority renders
    /// decimal up to 2³²−1 and hexadecimal above; [`SID`]'s display
    /// implements that rule.
    pub fn for_sid(sid: &SID, kind: IdKind) -> String {
        match kind {
            IdKind::Owner => format!("os:{sid}"),
            IdKind::Group => format!("gs:{sid}"),
        }
    }
}

/// External id-mapping oracle.
pub trait IdMapOracle: Send + Sync {
    /// Resolves one descriptor; `None` when the mapping does not exist.
    fn resolve(&self, descriptor: &str) -> Option<IdMapping>;
}

/// The built-in oracle mapping ids onto the Unix SID authority
/// (S-1-22-1-uid / S-1-22-2-gid) and back.
#[derive(Debug, Default)]
pub struct UnixSidOracle;

impl IdMapOracle for UnixSidOracle {
    fn resolve(&self, descriptor: &str) -> Option<IdMapping> {
        let (form, rest) = descriptor.split_at(descriptor.find(':')? + 1);
        match form {
            "oi:" => Some(IdMapping::Sid(SID::unix_user(rest.parse().ok()?))),
            "gi:" => Some(IdMapping::Sid(SID::unix_group(rest.parse().ok()?))),
            "os:" | "gs:" => {
                let sid: SID = rest.parse().ok()?;
                if sid.authority() != SID::UNIX_AUTHORITY || sid.sub_authority.len() != 2 {
                    return None;
                }
                let expected_rid = if form == "os:" {
                    SID::UNIX_USERS_RID
                } else {
                    SID::UNIX_GROUPS_RID
                };
                if sid.sub_authority[0] != expected_rid {
                    return None;
                }
                Some(IdMapping::Id(sid.sub_authority[1]))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_forms() {
        assert_eq!(descriptor::for_id(1000, IdKind::Owner), "oi:1000");
        assert_eq!(descriptor::for_id(4, IdKind::Group), "gi:4");
        let sid = SID::unix_user(7);
        assert_eq!(descriptor::for_sid(&sid, IdKind::Owner), "os:S-1-22-1-7");
    }

    #[test]
    fn test_unix_oracle_round_trip() {
        let oracle = UnixSidOracle;
        let Some(IdMapping::Sid(sid)) = oracle.resolve("oi:1000") else {
            panic!("expected a SID mapping");
        };
        assert_eq!(sid, SID::unix_user(1000));
        let back = oracle.resolve(&descriptor::for_sid(&sid, IdKind::Owner));
        assert_eq!(back, Some(IdMapping::Id(1000)));
    }

    #[test]
    fn test_unix_oracle_rejects_foreign_sids() {
        let oracle = UnixSidOracle;
        assert_eq!(oracle.resolve("os:S-1-5-21-1-2-3"), None);
        assert_eq!(oracle.resolve("nonsense"), None);
    }
}
