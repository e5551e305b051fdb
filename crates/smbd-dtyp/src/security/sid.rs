//! MS-DTYP 2.4.2: SID

use binrw::prelude::*;
use std::str::FromStr;

/// A security identifier.
///
/// The identifier authority is carried big-endian on the wire; sub
/// authorities are little-endian.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct SID {
    #[bw(calc = 1)]
    #[br(temp)]
    #[br(assert(_revision == 1))]
    _revision: u8,
    #[bw(try_calc = sub_authority.len().try_into())]
    #[br(temp)]
    sub_authority_count: u8,
    pub identifier_authority: [u8; 6],
    #[br(count = sub_authority_count)]
    pub sub_authority: Vec<u32>,
}

impl SID {
    /// S-1-1-0, the world/everyone SID.
    pub const S_EVERYONE: &'static str = "S-1-1-0";
    /// S-1-5-11, authenticated users.
    pub const S_AUTHENTICATED_USERS: &'static str = "S-1-5-11";
    /// S-1-3-0, creator owner.
    pub const S_CREATOR_OWNER: &'static str = "S-1-3-0";
    /// S-1-3-1, creator group.
    pub const S_CREATOR_GROUP: &'static str = "S-1-3-1";

    /// The NFS/Unix authority used for direct uid/gid mappings (S-1-22-…).
    pub const UNIX_AUTHORITY: u64 = 22;
    pub const UNIX_USERS_RID: u32 = 1;
    pub const UNIX_GROUPS_RID: u32 = 2;

    /// Wire size of this SID in bytes.
    pub fn wire_size(&self) -> usize {
        8 + 4 * self.sub_authority.len()
    }

    /// The 48-bit identifier authority value.
    pub fn authority(&self) -> u64 {
        self.identifier_authority
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }

    fn from_authority(authority: u64, sub_authority: Vec<u32>) -> Self {
        let bytes = authority.to_be_bytes();
        let mut identifier_authority = [0u8; 6];
        identifier_authority.copy_from_slice(&bytes[2..]);
        Self {
            identifier_authority,
            sub_authority,
        }
    }

    /// S-1-22-1-`uid`, the direct Unix user mapping.
    pub fn unix_user(uid: u32) -> Self {
        Self::from_authority(Self::UNIX_AUTHORITY, vec![Self::UNIX_USERS_RID, uid])
    }

    /// S-1-22-2-`gid`, the direct Unix group mapping.
    pub fn unix_group(gid: u32) -> Self {
        Self::from_authority(Self::UNIX_AUTHORITY, vec![Self::UNIX_GROUPS_RID, gid])
    }

    /// Final sub-authority (the RID), if any.
    pub fn rid(&self) -> Option<u32> {
        self.sub_authority.last().copied()
    }
}

impl FromStr for SID {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        if parts.next() != Some("S") {
            return Err(format!("not a SID string: {s}"));
        }
        if parts.next() != Some("1") {
            return Err(format!("unsupported SID revision in {s}"));
        }
        let authority_part = parts.next().ok_or_else(|| format!("missing authority in {s}"))?;
        let authority = if let Some(hex) = authority_part.strip_prefix("0x") {
            u64::from_str_radix(hex, 16).map_err(|e| e.to_string())?
        } else {
            authority_part.parse::<u64>().map_err(|e| e.to_string())?
        };
        let sub_authority = parts
            .map(|p| p.parse::<u32>().map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        if sub_authority.len() > u8::MAX as usize {
            return Err(format!("too many sub authorities in {s}"));
        }
        Ok(Self::from_authority(authority, sub_authority))
    }
}

impl std::fmt::Display for SID {
    /// Renders the standard S-1-… form. The authority prints decimal up to
    /// 2³²−1 and hexadecimal above, per MS-DTYP 2.4.2.1.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let authority = self.authority();
        if authority <= u64::from(u32::MAX) {
            write!(f, "S-1-{}", authority)?;
        } else {
            write!(f, "S-1-0x{:012X}", authority)?;
        }
        for sub in &self.sub_authority {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smbd_tests::*;

    test_binrw! {
        SID => everyone: SID::from_str(SID::S_EVERYONE).unwrap() => "010100000000000100000000"
    }

    test_binrw! {
        SID => unix_user: SID::unix_user(1000) => "010200000000001601000000e8030000"
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["S-1-1-0", "S-1-5-21-1-2-3", "S-1-22-1-1000"] {
            assert_eq!(SID::from_str(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_large_authority_renders_hex() {
        let sid = SID::from_str("S-1-0x010000000001").unwrap();
        assert_eq!(sid.authority(), 0x010000000001);
        assert_eq!(sid.to_string(), "S-1-0x010000000001");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(SID::from_str("S-2-1-0").is_err());
        assert!(SID::from_str("X-1-1-0").is_err());
    }
}
