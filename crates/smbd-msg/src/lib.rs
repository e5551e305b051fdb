//! SMB1/CIFS wire messages.
//!
//! Every struct here models the word block and byte block of one command,
//! starting at the WordCount byte. The 32-byte header is [`Header`]; framing
//! and AndX chain traversal are the dispatcher's business, which is why the
//! AndX offset fields are plain values rather than self-resolving markers.
//!
//! Strings are dual-coded (OEM or UTF-16LE); commands that carry them take a
//! `unicode` import that the dispatcher feeds from Flags2 of the request.

pub mod create;
pub mod echo;
pub mod file;
pub mod header;
pub mod lock;
pub mod negotiate;
pub mod nt_trans;
pub mod path;
pub mod session_setup;
pub mod trans;
pub mod trans2;
pub mod tree_connect;

pub use create::*;
pub use echo::*;
pub use file::*;
pub use header::*;
pub use lock::*;
pub use negotiate::*;
pub use nt_trans::*;
pub use path::*;
pub use session_setup::*;
pub use trans::*;
pub use trans2::*;
pub use tree_connect::*;

/// Errors raised while interpreting SMB1 messages, beyond binrw parse
/// failures.
#[derive(thiserror::Error, Debug)]
pub enum SmbMsgError {
    #[error("Unknown command code {0:#04x}")]
    UnknownCommand(u8),
    #[error("Missing definition for error code {0:#010x}")]
    MissingErrorCodeDefinition(u32),
}

pub type Result<T> = std::result::Result<T, SmbMsgError>;
