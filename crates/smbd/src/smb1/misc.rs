//! Small handlers: ECHO, FIND_CLOSE2, PROCESS_EXIT and NT_CANCEL.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use smbd_msg::echo::{EchoRequest, EchoResponse};
use smbd_msg::path::FindClose2Request;
use smbd_msg::tree_connect::EmptyBody;

use crate::smb1::{AndXNext, RequestContext, close_file};
use crate::{Error, Result};

pub fn handle_echo(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = EchoRequest::read(req)?;

    // An echo count of zero asks for no reply at all.
    if request.echo_count == 0 {
        ctx.no_response = true;
        return Ok(AndXNext::Done);
    }

    EchoResponse {
        sequence_number: 1,
        data: request.data,
    }
    .write(out)?;
    Ok(AndXNext::Done)
}

pub async fn handle_find_close2(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = FindClose2Request::read(req)?;
    let session = ctx.require_session()?;

    // Search handles are directory FIDs; closing one ends the search.
    let is_search = session
        .fid_table
        .lookup(request.sid)
        .is_some_and(|file| file.inner.lock().unwrap().dir_buffer.is_some());
    if !is_search {
        return Err(Error::InvalidHandle(request.sid));
    }
    close_file(ctx.server, &session, request.sid, true).await?;

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_process_exit(
    _ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let _request = EmptyBody::read(req)?;
    // Legacy clients announce process teardown; per-process opens are not
    // tracked separately, so this is an acknowledged no-op.
    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_nt_cancel(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    _out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let _request = EmptyBody::read(req)?;
    ctx.conn.cancel_by_mid(ctx.header.mid);
    // NT_CANCEL itself never gets a response.
    ctx.no_response = true;
    Ok(AndXNext::Done)
}
