//! SMB_COM_NT_TRANSACT: the security-descriptor subfunctions.

use std::io::Cursor;
use std::os::unix::fs::MetadataExt;

use binrw::{BinRead, BinWrite};

use smbd_dtyp::security::SecurityDescriptor;
use smbd_msg::nt_trans::{
    NT_TRANSACT_QUERY_SECURITY_DESC, NT_TRANSACT_SET_SECURITY_DESC, NtTransResponse,
    NtTransactRequest, SecurityDescParams,
};

use crate::secdesc::SecDescCodec;
use crate::smb1::{AndXNext, RequestContext};
use crate::vfs::SetAttrs;
use crate::{Error, Result};

pub fn handle_nt_transact(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = NtTransactRequest::read(req)?;

    let response = match request.function {
        NT_TRANSACT_QUERY_SECURITY_DESC => query_security_desc(ctx, &request)?,
        NT_TRANSACT_SET_SECURITY_DESC => set_security_desc(ctx, &request)?,
        _ => return Err(Error::NotSupported("NT_TRANSACT subfunction")),
    };
    response.write(out)?;
    Ok(AndXNext::Done)
}

fn query_security_desc(
    ctx: &RequestContext<'_>,
    request: &NtTransactRequest,
) -> Result<NtTransResponse> {
    let params = SecurityDescParams::read(&mut Cursor::new(&request.params))?;
    let session = ctx.require_session()?;

    let file = session
        .fid_table
        .lookup(params.fid)
        .ok_or(Error::InvalidHandle(params.fid))?;
    let meta = file.host_path.symlink_metadata()?;

    let codec = SecDescCodec::new(ctx.server.idmap.as_ref());
    let full = codec.build(meta.mode() & 0o7777, meta.uid(), meta.gid())?;

    // Only the requested parts go out.
    let descriptor = SecurityDescriptor::new(
        params.security_info.owner().then_some(full.owner_sid).flatten(),
        params.security_info.group().then_some(full.group_sid).flatten(),
        params.security_info.dacl().then_some(full.dacl).flatten(),
    );

    let mut cursor = Cursor::new(Vec::new());
    descriptor.write(&mut cursor)?;
    let data = cursor.into_inner();

    let length = (data.len() as u32).to_le_bytes().to_vec();
    if data.len() > request.max_data_count as usize {
        // The client probes with a small buffer first; answer with the
        // needed length only.
        return Ok(NtTransResponse::new(length, Vec::new()));
    }
    Ok(NtTransResponse::new(length, data))
}

fn set_security_desc(
    ctx: &RequestContext<'_>,
    request: &NtTransactRequest,
) -> Result<NtTransResponse> {
    let params = SecurityDescParams::read(&mut Cursor::new(&request.params))?;
    let session = ctx.require_session()?;
    let tree = ctx.require_tree()?;
    if !tree.writeable {
        return Err(Error::AccessDenied("share is not writeable"));
    }

    let file = session
        .fid_table
        .lookup(params.fid)
        .ok_or(Error::InvalidHandle(params.fid))?;
    if !file.access.write_dac() && !file.access.write_owner() && !file.access.generic_all() {
        return Err(Error::AccessDenied("handle lacks WRITE_DAC access"));
    }

    let descriptor = SecurityDescriptor::read(&mut Cursor::new(&request.data))?;
    let codec = SecDescCodec::new(ctx.server.idmap.as_ref());
    let (mode, uid, gid) = codec.apply(&descriptor);

    let mut attrs = SetAttrs::default();
    if params.security_info.dacl() {
        attrs.mode = mode;
    }
    if params.security_info.owner() {
        attrs.uid = uid;
    }
    if params.security_info.group() {
        attrs.gid = gid;
    }
    tree.vfs()?
        .setattr(&file.host_path, Some(&file), &attrs)?;

    Ok(NtTransResponse::new(Vec::new(), Vec::new()))
}
