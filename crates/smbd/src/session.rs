//! Sessions and the process-wide session registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::config::UserConfig;
use crate::fidtable::FidTable;
use crate::tree::TreeConnection;
use crate::{Error, Result};

/// Session lifecycle tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Valid = 0,
    /// Logoff in progress; new requests are refused, in-flight ones drain.
    NeedReconnect = 1,
}

/// One authenticated user on a connection.
pub struct Session {
    /// The 16-bit UID echoed in request headers.
    pub uid: u16,
    pub user: UserConfig,
    pub is_guest: bool,
    /// Signing key material; empty disables signing for this session.
    pub signing_key: Vec<u8>,

    pub fid_table: FidTable,
    trees: Mutex<HashMap<u16, Arc<TreeConnection>>>,

    /// Signing sequence number of the next request.
    sequence: AtomicU32,
    /// Requests currently executing on this session, the logoff included.
    in_flight: AtomicU32,
    drained: Notify,
    state: AtomicU8,
}

impl Session {
    pub fn new(uid: u16, user: UserConfig, is_guest: bool, signing_key: Vec<u8>) -> Arc<Self> {
        Arc::new(Session {
            uid,
            user,
            is_guest,
            signing_key,
            fid_table: FidTable::new(),
            trees: Mutex::new(HashMap::new()),
            sequence: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            drained: Notify::new(),
            state: AtomicU8::new(SessionState::Valid as u8),
        })
    }

    pub fn is_signed(&self) -> bool {
        !self.signing_key.is_empty()
    }

    pub fn state(&self) -> SessionState {
        if self.state.load(Ordering::Acquire) == 0 {
            SessionState::Valid
        } else {
            SessionState::NeedReconnect
        }
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Claims the next pair of signing sequence numbers
    /// `(request, response)`.
    pub fn next_sequence_pair(&self) -> (u32, u32) {
        let base = self.sequence.fetch_add(2, Ordering::AcqRel);
        (base, base + 1)
    }

    /// Gives back one sequence slot for a request whose response was
    /// suppressed, so later signatures stay aligned with the client.
    pub fn compensate_sequence(&self) {
        self.sequence.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn begin_request(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub fn end_request(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) <= 2 {
            self.drained.notify_waiters();
        }
    }

    /// Waits until this request is the only one in flight; the LOGOFF
    /// contract.
    pub async fn wait_single_inflight(&self) {
        loop {
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::Acquire) <= 1 {
                return;
            }
            notified.await;
        }
    }

    pub fn insert_tree(&self, tree: Arc<TreeConnection>) {
        self.trees.lock().unwrap().insert(tree.tid, tree);
    }

    pub fn tree(&self, tid: u16) -> Result<Arc<TreeConnection>> {
        self.trees
            .lock()
            .unwrap()
            .get(&tid)
            .cloned()
            .ok_or(Error::BadTid(tid))
    }

    pub fn remove_tree(&self, tid: u16) -> Result<Arc<TreeConnection>> {
        self.trees
            .lock()
            .unwrap()
            .remove(&tid)
            .ok_or(Error::BadTid(tid))
    }

    pub fn tree_ids(&self) -> Vec<u16> {
        self.trees.lock().unwrap().keys().copied().collect()
    }
}

/// The process-wide session registry, for enumeration and UID minting.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<u16, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a free UID and registers the session built from it.
    pub fn register(
        &self,
        build: impl FnOnce(u16) -> Arc<Session>,
    ) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.lock().unwrap();
        let uid = (1..u16::MAX)
            .find(|uid| !sessions.contains_key(uid))
            .ok_or(Error::NoMemory)?;
        let session = build(uid);
        sessions.insert(uid, session.clone());
        Ok(session)
    }

    pub fn lookup(&self, uid: u16) -> Result<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap()
            .get(&uid)
            .cloned()
            .ok_or(Error::BadUid(uid))
    }

    pub fn remove(&self, uid: u16) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().remove(&uid)
    }

    pub fn uids(&self) -> Vec<u16> {
        self.sessions.lock().unwrap().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserConfig {
        UserConfig {
            name: "alice".into(),
            secret: vec![],
            uid: 1000,
            gid: 1000,
            is_guest: false,
        }
    }

    #[test]
    fn test_registry_mints_dense_uids() {
        let registry = SessionRegistry::new();
        let a = registry
            .register(|uid| Session::new(uid, user(), false, vec![]))
            .unwrap();
        let b = registry
            .register(|uid| Session::new(uid, user(), false, vec![]))
            .unwrap();
        assert_eq!(a.uid, 1);
        assert_eq!(b.uid, 2);
        registry.remove(1);
        let c = registry
            .register(|uid| Session::new(uid, user(), false, vec![]))
            .unwrap();
        assert_eq!(c.uid, 1);
    }

    #[test]
    fn test_sequence_compensation() {
        let session = Session::new(1, user(), false, vec![1]);
        let (req, resp) = session.next_sequence_pair();
        assert_eq!((req, resp), (0, 1));
        session.compensate_sequence();
        let (req, _) = session.next_sequence_pair();
        assert_eq!(req, 1);
    }

    #[tokio::test]
    async fn test_logoff_waits_for_drain() {
        let session = Session::new(1, user(), false, vec![]);
        session.begin_request(); // an unrelated in-flight request
        session.begin_request(); // the LOGOFF itself

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_single_inflight().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        session.end_request();
        waiter.await.unwrap();
    }
}
