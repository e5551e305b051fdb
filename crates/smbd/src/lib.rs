//! smbd: an SMB1/CIFS file server engine.
//!
//! The [`Server`] value owns the share catalog, the session registry and the
//! external collaborators (authentication, id mapping, oplocks, the DCE/RPC
//! pipe service). Each accepted TCP connection becomes a [`Connection`]
//! driving the per-request dispatcher in [`smb1`].

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod connection;
pub mod dirent;
pub mod durable;
pub mod error;
pub mod fidtable;
pub mod file;
pub mod idmap;
pub mod mft;
pub mod name;
pub mod netbios;
pub mod oplock;
pub mod pipe;
pub mod secdesc;
pub mod server;
pub mod session;
pub mod share;
pub mod smb1;
pub mod tree;
pub mod vfs;

pub use auth::Authenticator;
pub use config::{GlobalConfig, ServerConfig, ShareConfig, SigningPolicy, UserConfig};
pub use connection::Connection;
pub use error::Error;
pub use idmap::IdMapOracle;
pub use oplock::OplockBroker;
pub use pipe::PipeService;
pub use server::Server;

/// smbd Result type
pub type Result<T> = std::result::Result<T, crate::Error>;
