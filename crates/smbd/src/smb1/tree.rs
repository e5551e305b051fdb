//! SMB_COM_TREE_CONNECT_ANDX and SMB_COM_TREE_DISCONNECT.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use smbd_msg::tree_connect::{
    EmptyBody, OptionalSupport, SERVICE_DISK, SERVICE_IPC, TreeConnectRequest,
    TreeConnectResponse,
};

use crate::share::resolve_tree;
use crate::smb1::{AndXNext, RequestContext, close_file, patch_header_tid};
use crate::tree::TreeConnection;
use crate::vfs::Vfs;
use crate::{Error, Result};

pub async fn handle_tree_connect(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = TreeConnectRequest::read_args(req, (ctx.unicode,))?;
    let session = ctx.require_session()?;

    if request.flags.disconnect_tid() {
        if let Ok(tree) = session.remove_tree(ctx.header.tid) {
            disconnect_tree_files(ctx, tree.tid).await;
        }
    }

    let share_name = request.share_name().to_string();
    let resolved = resolve_tree(
        &ctx.server.shares,
        ctx.conn.peer,
        &session.user.name,
        &share_name,
    )?;

    if resolved.share.config.guest_only && !session.is_guest {
        return Err(Error::AccessDenied("share admits guest sessions only"));
    }

    resolved.share.connect_ref()?;
    let vfs = match &resolved.share.config.path {
        Some(path) => {
            if !path.is_dir() {
                resolved.share.disconnect_ref();
                return Err(Error::BadShareName(share_name));
            }
            Some(Vfs::new(
                path.clone(),
                resolved.share.config.store_dos_attr,
                ctx.server.oplocks.clone(),
                ctx.server.mft.clone(),
            ))
        }
        None => None,
    };

    let tid = ctx.server.next_tid();
    let service = if vfs.is_none() {
        SERVICE_IPC
    } else {
        SERVICE_DISK
    };
    let tree = TreeConnection::new(tid, resolved.share, resolved.writeable, vfs);
    session.insert_tree(tree);
    log::debug!(
        "tree {tid} connected to {share_name} (writeable: {})",
        resolved.writeable
    );

    patch_header_tid(out, tid);
    TreeConnectResponse::new(
        smbd_msg::AndX::none(),
        OptionalSupport::new().with_search_bits(true),
        service.into(),
        "NTFS".into(),
    )
    .write_args(out, (ctx.unicode,))?;
    Ok(AndXNext::from_andx(&request.andx))
}

pub async fn handle_tree_disconnect(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let _request = EmptyBody::read(req)?;
    let session = ctx.require_session()?;
    let tree = session.remove_tree(ctx.header.tid)?;
    disconnect_tree_files(ctx, tree.tid).await;
    log::debug!("tree {} disconnected", tree.tid);

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

/// Closes every open handle belonging to a tree being torn down.
async fn disconnect_tree_files(ctx: &RequestContext<'_>, tid: u16) {
    let Ok(session) = ctx.require_session() else {
        return;
    };
    for fid in session.fid_table.all_ids() {
        let belongs = session
            .fid_table
            .lookup(fid)
            .is_some_and(|file| file.tid == tid);
        if belongs {
            if let Err(e) = close_file(ctx.server, &session, fid, true).await {
                log::debug!("tree teardown close of fid {fid} failed: {e}");
            }
        }
    }
}
