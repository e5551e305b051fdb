//! SMB_COM_TRANSACTION: the named-pipe RPC path.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use smbd_msg::trans::{TRANS_TRANSACT_NMPIPE, TransResponse, TransactionRequest};

use crate::pipe::PipeMessage;
use crate::smb1::{AndXNext, RequestContext};
use crate::{Error, Result};

pub async fn handle_transaction(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = TransactionRequest::read_args(req, (ctx.unicode,))?;
    let session = ctx.require_session()?;

    let &[opcode, fid] = request.setup.as_slice() else {
        return Err(Error::InvalidParameter("unexpected TRANSACTION setup"));
    };
    if opcode != TRANS_TRANSACT_NMPIPE {
        return Err(Error::NotSupported("TRANSACTION sub-opcode"));
    }

    let file = session
        .fid_table
        .lookup(fid)
        .ok_or(Error::InvalidHandle(fid))?;
    let kind = file
        .pipe
        .ok_or(Error::InvalidParameter("TRANSACTION on a non-pipe handle"))?;

    let message = PipeMessage {
        kind,
        session_uid: session.uid,
        payload: request.data,
        max_reply: request.max_data_count.into(),
    };

    // The pipe service owns the wait; cancellation (NT_CANCEL or
    // connection teardown) suppresses the response.
    let reply = tokio::select! {
        reply = ctx.server.pipes.transact(message, ctx.cancel.clone()) => reply,
        _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
    };
    let Some(reply) = reply else {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        return Err(Error::NotSupported("pipe backend refused the transaction"));
    };

    TransResponse::new(Vec::new(), reply).write(out)?;
    Ok(AndXNext::Done)
}
