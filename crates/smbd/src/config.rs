//! The read-mostly configuration catalog.
//!
//! Construction is the loader's business (the CLI builds one from its
//! arguments); the engine only reads. Reload is out of scope: the catalog
//! is immutable once the [`crate::Server`] is built.

use std::net::IpAddr;
use std::path::PathBuf;

/// Signing policy of the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SigningPolicy {
    /// Never sign.
    Disable,
    /// Offer signing, let the client choose.
    #[default]
    Auto,
    /// Require signing.
    Mandatory,
}

/// What to do with a user that fails lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MapToGuest {
    #[default]
    Never,
    /// Unknown accounts become the guest account.
    BadUser,
}

/// One exported share.
#[derive(Debug, Clone)]
pub struct ShareConfig {
    pub name: String,
    /// Absolute host directory; `None` for IPC$.
    pub path: Option<PathBuf>,
    pub comment: String,
    pub allow_hosts: Vec<IpAddr>,
    pub deny_hosts: Vec<IpAddr>,
    pub valid_users: Vec<String>,
    pub invalid_users: Vec<String>,
    pub read_list: Vec<String>,
    pub write_list: Vec<String>,
    pub writeable: bool,
    pub available: bool,
    pub browsable: bool,
    pub guest_ok: bool,
    pub guest_only: bool,
    pub oplocks: bool,
    /// Store DOS attributes and creation time in xattrs.
    pub store_dos_attr: bool,
    pub read_only: bool,
    pub write_ok: bool,
    /// Maximum concurrent tree connections; zero means unlimited.
    pub max_connections: u32,
}

impl ShareConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        ShareConfig {
            name: name.into(),
            path: Some(path.into()),
            comment: String::new(),
            allow_hosts: Vec::new(),
            deny_hosts: Vec::new(),
            valid_users: Vec::new(),
            invalid_users: Vec::new(),
            read_list: Vec::new(),
            write_list: Vec::new(),
            writeable: true,
            available: true,
            browsable: true,
            guest_ok: false,
            guest_only: false,
            oplocks: true,
            store_dos_attr: false,
            read_only: false,
            write_ok: true,
            max_connections: 0,
        }
    }

    /// The IPC$ pseudo-share backing the named-pipe service.
    pub fn ipc() -> Self {
        ShareConfig {
            path: None,
            comment: "IPC Service".to_string(),
            writeable: false,
            write_ok: false,
            guest_ok: true,
            ..ShareConfig::new("IPC$", "")
        }
    }

    pub fn is_ipc(&self) -> bool {
        self.path.is_none()
    }

    /// The share-level writable verdict, before per-user lists apply.
    pub fn base_writeable(&self) -> bool {
        self.writeable && self.write_ok && !self.read_only
    }
}

/// One configured account.
#[derive(Debug, Clone)]
pub struct UserConfig {
    pub name: String,
    /// Opaque verifier material handed to the authenticator (NT hash or
    /// whatever the deployed oracle expects).
    pub secret: Vec<u8>,
    pub uid: u32,
    pub gid: u32,
    pub is_guest: bool,
}

/// Global server settings.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub guest_account: String,
    pub server_string: String,
    pub workgroup: String,
    pub netbios_name: String,
    pub server_signing: SigningPolicy,
    pub map_to_guest: MapToGuest,
    pub server_min_protocol: String,
    pub server_max_protocol: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            guest_account: "nobody".to_string(),
            server_string: "smbd-rs".to_string(),
            workgroup: "WORKGROUP".to_string(),
            netbios_name: "SMBD".to_string(),
            server_signing: SigningPolicy::Auto,
            map_to_guest: MapToGuest::Never,
            server_min_protocol: "NT1".to_string(),
            server_max_protocol: "NT1".to_string(),
        }
    }
}

/// The full catalog a [`crate::Server`] is built from.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub global: GlobalConfig,
    pub shares: Vec<ShareConfig>,
    pub users: Vec<UserConfig>,
}

impl ServerConfig {
    pub fn new(global: GlobalConfig) -> Self {
        ServerConfig {
            global,
            shares: vec![ShareConfig::ipc()],
            users: Vec::new(),
        }
    }

    pub fn with_share(mut self, share: ShareConfig) -> Self {
        self.shares.push(share);
        self
    }

    pub fn with_user(mut self, user: UserConfig) -> Self {
        self.users.push(user);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipc_share_shape() {
        let ipc = ShareConfig::ipc();
        assert!(ipc.is_ipc());
        assert!(!ipc.base_writeable());
        assert_eq!(ipc.name, "IPC$");
    }

    #[test]
    fn test_base_writeable_honors_read_only() {
        let mut share = ShareConfig::new("s", "/srv/s");
        assert!(share.base_writeable());
        share.read_only = true;
        assert!(!share.base_writeable());
    }
}
