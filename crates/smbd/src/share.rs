//! Shares and the tree-name/access resolver.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::ShareConfig;
use crate::{Error, Result};

/// A live share: its rendered configuration plus the connection counter
/// enforcing `max_connections`.
pub struct Share {
    pub config: ShareConfig,
    connections: AtomicU32,
}

impl Share {
    pub fn new(config: ShareConfig) -> Arc<Self> {
        Arc::new(Share {
            config,
            connections: AtomicU32::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn connect_ref(&self) -> Result<()> {
        let max = self.config.max_connections;
        let mut current = self.connections.load(Ordering::Acquire);
        loop {
            if max != 0 && current >= max {
                return Err(Error::AccessDenied("share connection limit reached"));
            }
            match self.connections.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(seen) => current = seen,
            }
        }
    }

    pub fn disconnect_ref(&self) {
        self.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The outcome of a successful tree resolution.
pub struct ResolvedTree {
    pub share: Arc<Share>,
    pub writeable: bool,
}

/// Host allow/deny evaluation.
///
/// Both lists empty: allow. Listed in allow: allow. Listed in deny: deny.
/// Empty allow with a non-empty deny admits everyone not denied.
fn host_permitted(share: &ShareConfig, peer: IpAddr) -> bool {
    let allow = &share.allow_hosts;
    let deny = &share.deny_hosts;
    if allow.is_empty() && deny.is_empty() {
        return true;
    }
    if allow.contains(&peer) {
        return true;
    }
    if deny.contains(&peer) {
        return false;
    }
    allow.is_empty()
}

/// Per-user evaluation, returning the effective writeable flag.
///
/// Write-list membership overrides read-list membership: explicit grants
/// win.
fn user_permitted(share: &ShareConfig, user: &str) -> Result<bool> {
    if share.guest_ok {
        return Ok(share.base_writeable());
    }
    let in_list = |list: &[String]| list.iter().any(|u| u.eq_ignore_ascii_case(user));
    if in_list(&share.invalid_users) {
        return Err(Error::AccessDenied("user is in the invalid-users list"));
    }
    let mut writeable = share.base_writeable();
    if in_list(&share.read_list) {
        writeable = false;
    }
    if in_list(&share.write_list) {
        writeable = true;
    }
    if !share.valid_users.is_empty() && !in_list(&share.valid_users) {
        return Err(Error::AccessDenied("user is not in the valid-users list"));
    }
    Ok(writeable)
}

/// Resolves a requested tree name against the share catalog and its ACLs.
pub fn resolve_tree(
    shares: &[Arc<Share>],
    peer: IpAddr,
    user: &str,
    requested: &str,
) -> Result<ResolvedTree> {
    let share = shares
        .iter()
        .find(|share| share.name().eq_ignore_ascii_case(requested))
        .cloned()
        .ok_or_else(|| Error::BadShareName(requested.to_string()))?;

    if !share.config.available {
        return Err(Error::BadShareName(requested.to_string()));
    }
    if !host_permitted(&share.config, peer) {
        return Err(Error::AccessDenied("host is not permitted on this share"));
    }
    let writeable = user_permitted(&share.config, user)?;
    Ok(ResolvedTree { share, writeable })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> IpAddr {
        "192.0.2.7".parse().unwrap()
    }

    fn make_shares(config: ShareConfig) -> Vec<Arc<Share>> {
        vec![Share::new(config)]
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let shares = make_shares(ShareConfig::new("Public", "/srv/public"));
        assert!(resolve_tree(&shares, peer(), "alice", "PUBLIC").is_ok());
        assert!(matches!(
            resolve_tree(&shares, peer(), "alice", "missing"),
            Err(Error::BadShareName(_))
        ));
    }

    #[test]
    fn test_host_matrix() {
        let mut config = ShareConfig::new("s", "/srv/s");
        config.deny_hosts = vec![peer()];
        assert!(resolve_tree(&make_shares(config.clone()), peer(), "u", "s").is_err());

        // Empty allow with non-empty deny admits hosts not denied.
        let other: IpAddr = "192.0.2.8".parse().unwrap();
        assert!(resolve_tree(&make_shares(config.clone()), other, "u", "s").is_ok());

        // Allow-listed peer wins even with a deny list present.
        config.allow_hosts = vec![peer()];
        assert!(resolve_tree(&make_shares(config.clone()), peer(), "u", "s").is_ok());

        // Non-empty allow without the peer: deny.
        config.deny_hosts.clear();
        config.allow_hosts = vec![other];
        assert!(resolve_tree(&make_shares(config), peer(), "u", "s").is_err());
    }

    #[test]
    fn test_write_list_overrides_read_list() {
        let mut config = ShareConfig::new("s", "/srv/s");
        config.read_list = vec!["alice".into()];
        config.write_list = vec!["alice".into()];
        let resolved = resolve_tree(&make_shares(config), peer(), "alice", "s").unwrap();
        assert!(resolved.writeable);
    }

    #[test]
    fn test_read_list_clears_writeable() {
        let mut config = ShareConfig::new("s", "/srv/s");
        config.read_list = vec!["bob".into()];
        let resolved = resolve_tree(&make_shares(config), peer(), "bob", "s").unwrap();
        assert!(!resolved.writeable);
    }

    #[test]
    fn test_valid_and_invalid_users() {
        let mut config = ShareConfig::new("s", "/srv/s");
        config.invalid_users = vec!["mallory".into()];
        config.valid_users = vec!["alice".into()];
        let shares = make_shares(config);
        assert!(resolve_tree(&shares, peer(), "mallory", "s").is_err());
        assert!(resolve_tree(&shares, peer(), "eve", "s").is_err());
        assert!(resolve_tree(&shares, peer(), "alice", "s").is_ok());
    }

    #[test]
    fn test_guest_share_skips_user_checks() {
        let mut config = ShareConfig::new("s", "/srv/s");
        config.guest_ok = true;
        config.invalid_users = vec!["anyone".into()];
        let resolved = resolve_tree(&make_shares(config), peer(), "anyone", "s").unwrap();
        assert!(resolved.writeable);
    }

    #[test]
    fn test_unavailable_share_refuses() {
        let mut config = ShareConfig::new("s", "/srv/s");
        config.available = false;
        assert!(resolve_tree(&make_shares(config), peer(), "u", "s").is_err());
    }

    #[test]
    fn test_max_connections_enforced() {
        let mut config = ShareConfig::new("s", "/srv/s");
        config.max_connections = 1;
        let share = Share::new(config);
        share.connect_ref().unwrap();
        assert!(share.connect_ref().is_err());
        share.disconnect_ref();
        assert!(share.connect_ref().is_ok());
    }
}
