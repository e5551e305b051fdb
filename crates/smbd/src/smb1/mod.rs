//! The SMB1 command handlers and their dispatch table.
//!
//! Each handler parses its word/byte block from the request cursor, does
//! the work through the engine services, writes its response block at the
//! output cursor, and reports whether the request chains another AndX
//! command.

use std::io::Cursor;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use smbd_msg::{Command, Header};

use crate::connection::Connection;
use crate::server::Server;
use crate::session::Session;
use crate::tree::TreeConnection;
use crate::{Error, Result};

mod create;
mod io;
mod misc;
mod negotiate;
mod nt_trans;
mod path;
mod session_setup;
mod trans;
mod trans2;
mod tree;

pub use create::close_file;

/// What a handler reports back to the chain walk.
pub enum AndXNext {
    /// No further chained command.
    Done,
    /// The request chains on at `offset` with `command`.
    Chain { command: u8, offset: u16 },
}

impl AndXNext {
    /// Chain continuation from a request's AndX block.
    pub fn from_andx(andx: &smbd_msg::AndX) -> Self {
        if andx.is_chained() {
            AndXNext::Chain {
                command: andx.command,
                offset: andx.offset,
            }
        } else {
            AndXNext::Done
        }
    }
}

/// Everything a handler needs about the request being served.
pub struct RequestContext<'a> {
    pub server: &'a Arc<Server>,
    pub conn: &'a Arc<Connection>,
    pub header: &'a Header,
    pub unicode: bool,
    pub caseless: bool,
    pub session: Option<Arc<Session>>,
    pub cancel: CancellationToken,
    /// Set by handlers whose command never gets a reply (NT_CANCEL, oplock
    /// break acknowledgements).
    pub no_response: bool,
}

impl RequestContext<'_> {
    pub fn require_session(&self) -> Result<Arc<Session>> {
        self.session.clone().ok_or(Error::BadUid(self.header.uid))
    }

    pub fn require_tree(&self) -> Result<Arc<TreeConnection>> {
        self.require_session()?.tree(self.header.tid)
    }
}

/// Routes one command to its handler.
pub async fn dispatch_one(
    ctx: &mut RequestContext<'_>,
    command: Command,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    log::trace!("dispatch {command} mid {}", ctx.header.mid);
    match command {
        Command::Negotiate => negotiate::handle_negotiate(ctx, req, out),
        Command::SessionSetupAndx => session_setup::handle_session_setup(ctx, req, out),
        Command::LogoffAndx => session_setup::handle_logoff(ctx, req, out).await,
        Command::TreeConnectAndx => tree::handle_tree_connect(ctx, req, out).await,
        Command::TreeDisconnect => tree::handle_tree_disconnect(ctx, req, out).await,
        Command::NtCreateAndx => create::handle_nt_create(ctx, req, out),
        Command::OpenAndx => create::handle_open(ctx, req, out),
        Command::Close => create::handle_close(ctx, req, out).await,
        Command::Flush => create::handle_flush(ctx, req, out),
        Command::ReadAndx => io::handle_read_andx(ctx, req, out),
        Command::Read => io::handle_read_core(ctx, req, out),
        Command::WriteAndx => io::handle_write_andx(ctx, req, out),
        Command::Write => io::handle_write_core(ctx, req, out),
        Command::Seek => io::handle_seek(ctx, req, out),
        Command::LockingAndx => io::handle_locking(ctx, req, out).await,
        Command::Rename => path::handle_rename(ctx, req, out),
        Command::NtRename => path::handle_nt_rename(ctx, req, out),
        Command::Delete => path::handle_delete(ctx, req, out),
        Command::CreateDirectory => path::handle_mkdir(ctx, req, out),
        Command::DeleteDirectory => path::handle_rmdir(ctx, req, out),
        Command::CheckDirectory => path::handle_checkdir(ctx, req, out),
        Command::QueryInformation => path::handle_query_information(ctx, req, out),
        Command::SetInformation => path::handle_set_information(ctx, req, out),
        Command::Echo => misc::handle_echo(ctx, req, out),
        Command::FindClose2 => misc::handle_find_close2(ctx, req, out).await,
        Command::ProcessExit => misc::handle_process_exit(ctx, req, out),
        Command::NtCancel => misc::handle_nt_cancel(ctx, req, out),
        Command::Transaction => trans::handle_transaction(ctx, req, out).await,
        Command::Transaction2 => trans2::handle_transaction2(ctx, req, out).await,
        Command::NtTransact => nt_trans::handle_nt_transact(ctx, req, out),
    }
}

/// Patches the UID field of the already-written response header.
pub(crate) fn patch_header_uid(out: &mut Cursor<Vec<u8>>, uid: u16) {
    // magic(4) command(1) status(4) flags(1) flags2(2) pid_high(2)
    // signature(8) reserved(2) tid(2) pid_low(2) -> uid at 28.
    out.get_mut()[28..30].copy_from_slice(&uid.to_le_bytes());
}

/// Patches the TID field of the already-written response header.
pub(crate) fn patch_header_tid(out: &mut Cursor<Vec<u8>>, tid: u16) {
    out.get_mut()[24..26].copy_from_slice(&tid.to_le_bytes());
}

/// Full session teardown: refresh durable snapshots, close every open
/// handle, drop every tree.
pub async fn teardown_session(server: &Arc<Server>, session: &Arc<Session>) {
    for fid in session.fid_table.all_ids() {
        if let Some(file) = session.fid_table.lookup(fid) {
            if let (Some(pfid), Ok(meta)) =
                (file.persistent_id, file.host_path.symlink_metadata())
            {
                server.durables.update_snapshot(pfid, (&meta).into());
            }
        }
        if let Err(e) = close_file(server, session, fid, false).await {
            log::debug!("teardown close of fid {fid} failed: {e}");
        }
    }
    for tid in session.tree_ids() {
        let _ = session.remove_tree(tid);
    }
}
