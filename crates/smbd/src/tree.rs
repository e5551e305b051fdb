//! Tree connections: one mount of a share by a session.

use std::sync::Arc;

use crate::share::Share;
use crate::vfs::Vfs;

/// A connected tree. Disk trees carry a share-scoped [`Vfs`]; the IPC$
/// tree routes opens to the pipe service instead.
pub struct TreeConnection {
    pub tid: u16,
    pub share: Arc<Share>,
    /// Effective write capability: share policy combined with the user
    /// list evaluation at connect time.
    pub writeable: bool,
    vfs: Option<Vfs>,
}

impl TreeConnection {
    pub fn new(tid: u16, share: Arc<Share>, writeable: bool, vfs: Option<Vfs>) -> Arc<Self> {
        Arc::new(TreeConnection {
            tid,
            share,
            writeable,
            vfs,
        })
    }

    pub fn is_ipc(&self) -> bool {
        self.vfs.is_none()
    }

    /// The filesystem boundary of a disk tree.
    pub fn vfs(&self) -> crate::Result<&Vfs> {
        self.vfs
            .as_ref()
            .ok_or(crate::Error::AccessDenied("not a disk tree"))
    }
}

impl Drop for TreeConnection {
    fn drop(&mut self) {
        self.share.disconnect_ref();
    }
}
