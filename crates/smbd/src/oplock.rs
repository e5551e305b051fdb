//! The oplock collaborator boundary.
//!
//! Break coordination machinery is external; the engine reports opens and
//! asks for level-2 breaks before writes.

/// Oplock levels as carried in NT_CREATE_ANDX responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OplockLevel {
    None = 0,
    Exclusive = 1,
    Batch = 2,
    Level2 = 3,
}

/// External oplock coordination service, keyed by inode.
pub trait OplockBroker: Send + Sync {
    /// Asks for an oplock on an open; returns the granted level.
    fn grant(&self, inode_key: (u64, u64), requested: OplockLevel) -> OplockLevel;

    /// Breaks the holder down to the given level and waits for the ack.
    fn break_to_level(&self, inode_key: (u64, u64), level: OplockLevel);

    /// Breaks every level-2 oplock on the inode. Called before any write.
    fn break_all_level2(&self, inode_key: (u64, u64));
}

/// A broker that never grants and never needs to break.
#[derive(Debug, Default)]
pub struct NullOplockBroker;

impl OplockBroker for NullOplockBroker {
    fn grant(&self, _inode_key: (u64, u64), _requested: OplockLevel) -> OplockLevel {
        OplockLevel::None
    }

    fn break_to_level(&self, _inode_key: (u64, u64), _level: OplockLevel) {}

    fn break_all_level2(&self, _inode_key: (u64, u64)) {}
}
