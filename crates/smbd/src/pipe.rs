//! The DCE/RPC named-pipe collaborator boundary.
//!
//! SRVSVC/WKSSVC/WINREG/LANMAN live in an external pipe service. The
//! engine opens pipe descriptors on IPC$ trees, forwards TRANSACTION
//! payloads as typed envelopes, and awaits the reply buffer, honoring
//! cancellation.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

/// The pipes the server recognizes by name on IPC$.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeKind {
    Srvsvc,
    Wkssvc,
    Winreg,
    Lanman,
}

impl PipeKind {
    /// Resolves an open name like `\srvsvc` (case-insensitive, with or
    /// without the leading separator).
    pub fn from_open_name(name: &str) -> Option<Self> {
        let name = name.trim_start_matches('\\').to_ascii_lowercase();
        Some(match name.as_str() {
            "srvsvc" => PipeKind::Srvsvc,
            "wkssvc" => PipeKind::Wkssvc,
            "winreg" => PipeKind::Winreg,
            "lanman" => PipeKind::Lanman,
            _ => return None,
        })
    }
}

/// A typed request envelope handed to the pipe service.
#[derive(Debug)]
pub struct PipeMessage {
    pub kind: PipeKind,
    /// Session the pipe belongs to, for access decisions in the service.
    pub session_uid: u16,
    pub payload: Vec<u8>,
    /// Upper bound for the reply buffer, from the transaction's
    /// MaxDataCount.
    pub max_reply: usize,
}

/// Reply future of [`PipeService::transact`]; boxed to keep the trait
/// object-safe behind `Arc<dyn PipeService>`.
pub type PipeReply<'a> = Pin<Box<dyn Future<Output = Option<Vec<u8>>> + Send + 'a>>;

/// External DCE/RPC backend.
pub trait PipeService: Send + Sync {
    /// Forwards one transaction payload and resolves to the reply buffer.
    ///
    /// Implementations should resolve to `None` when `cancel` fires; the
    /// dispatcher then suppresses the response.
    fn transact(&self, message: PipeMessage, cancel: CancellationToken) -> PipeReply<'_>;
}

/// A pipe service with no backend: every transaction is refused.
#[derive(Debug, Default)]
pub struct NullPipeService;

impl PipeService for NullPipeService {
    fn transact(&self, message: PipeMessage, _cancel: CancellationToken) -> PipeReply<'_> {
        log::debug!("no pipe backend for {:?}, refusing transaction", message.kind);
        Box::pin(async { None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_names() {
        assert_eq!(PipeKind::from_open_name("\\srvsvc"), Some(PipeKind::Srvsvc));
        assert_eq!(PipeKind::from_open_name("WKSSVC"), Some(PipeKind::Wkssvc));
        assert_eq!(PipeKind::from_open_name("\\spoolss"), None);
    }
}
