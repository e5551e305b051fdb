//! The server value: catalog, registries and collaborators, threaded into
//! every request context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::config::{GlobalConfig, ServerConfig, UserConfig};
use crate::connection::Connection;
use crate::durable::DurableTable;
use crate::idmap::IdMapOracle;
use crate::mft::MasterFileTable;
use crate::oplock::OplockBroker;
use crate::pipe::PipeService;
use crate::session::SessionRegistry;
use crate::share::Share;
use crate::{Error, Result};

/// External collaborators a [`Server`] is wired with.
pub struct Collaborators {
    pub auth: Arc<dyn Authenticator>,
    pub idmap: Arc<dyn IdMapOracle>,
    pub oplocks: Arc<dyn OplockBroker>,
    pub pipes: Arc<dyn PipeService>,
}

/// The process-wide server state.
pub struct Server {
    pub global: GlobalConfig,
    pub shares: Vec<Arc<Share>>,
    users: Vec<UserConfig>,

    pub sessions: SessionRegistry,
    pub mft: Arc<MasterFileTable>,
    pub durables: DurableTable,
    next_tid: AtomicU16,

    pub auth: Arc<dyn Authenticator>,
    pub idmap: Arc<dyn IdMapOracle>,
    pub oplocks: Arc<dyn OplockBroker>,
    pub pipes: Arc<dyn PipeService>,
}

impl Server {
    pub fn new(config: ServerConfig, collaborators: Collaborators) -> Arc<Self> {
        let ServerConfig {
            global,
            shares,
            users,
        } = config;
        Arc::new(Server {
            global,
            shares: shares.into_iter().map(Share::new).collect(),
            users,
            sessions: SessionRegistry::new(),
            mft: Arc::new(MasterFileTable::new()),
            durables: DurableTable::new(),
            next_tid: AtomicU16::new(1),
            auth: collaborators.auth,
            idmap: collaborators.idmap,
            oplocks: collaborators.oplocks,
            pipes: collaborators.pipes,
        })
    }

    /// Looks an account up by name, case-insensitively.
    pub fn find_user(&self, name: &str) -> Option<&UserConfig> {
        self.users
            .iter()
            .find(|user| user.name.eq_ignore_ascii_case(name))
    }

    /// The configured guest account, when one exists.
    pub fn guest_user(&self) -> Option<UserConfig> {
        self.find_user(&self.global.guest_account)
            .cloned()
            .or(Some(UserConfig {
                name: self.global.guest_account.clone(),
                secret: Vec::new(),
                uid: 65534,
                gid: 65534,
                is_guest: true,
            }))
    }

    /// Mints a process-wide tree id. A small wrap-around is acceptable;
    /// concurrent tree counts stay far below 16 bits.
    pub fn next_tid(&self) -> u16 {
        loop {
            let tid = self.next_tid.fetch_add(1, Ordering::AcqRel);
            if tid != 0 && tid != 0xFFFF {
                return tid;
            }
        }
    }

    /// Accept loop: one task per connection until `shutdown` fires.
    pub async fn run(
        self: &Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        log::info!(
            "{} listening on {}",
            self.global.server_string,
            listener.local_addr().map_err(Error::Io)?
        );
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.cancelled() => {
                    log::info!("shutdown requested, no longer accepting");
                    return Ok(());
                }
            };
            match accepted {
                Ok((stream, peer)) => {
                    log::debug!("connection from {peer}");
                    let server = self.clone();
                    let shutdown = shutdown.child_token();
                    tokio::spawn(async move {
                        let connection = Connection::new(server, peer.ip());
                        if let Err(e) = connection.serve(stream, shutdown).await {
                            log::warn!("connection {peer} ended with error: {e}");
                        }
                    });
                }
                Err(e) => {
                    log::warn!("accept failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AcceptAllAuthenticator;
    use crate::config::ShareConfig;
    use crate::idmap::UnixSidOracle;
    use crate::oplock::NullOplockBroker;
    use crate::pipe::NullPipeService;

    pub(crate) fn test_server(share_root: &std::path::Path) -> Arc<Server> {
        let config = ServerConfig::new(GlobalConfig::default())
            .with_share({
                let mut share = ShareConfig::new("share", share_root);
                share.guest_ok = true;
                share
            })
            .with_user(UserConfig {
                name: "alice".into(),
                secret: vec![],
                uid: 1000,
                gid: 1000,
                is_guest: false,
            });
        Server::new(
            config,
            Collaborators {
                auth: Arc::new(AcceptAllAuthenticator),
                idmap: Arc::new(UnixSidOracle),
                oplocks: Arc::new(NullOplockBroker),
                pipes: Arc::new(NullPipeService),
            },
        )
    }

    #[test]
    fn test_tid_minting_skips_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path());
        let first = server.next_tid();
        assert_ne!(first, 0);
        assert_ne!(first, 0xFFFF);
    }

    #[test]
    fn test_user_lookup_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path());
        assert!(server.find_user("ALICE").is_some());
        assert!(server.find_user("nobody-else").is_none());
    }
}
