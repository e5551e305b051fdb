//! Open/close handlers: SMB_COM_NT_CREATE_ANDX, SMB_COM_OPEN_ANDX,
//! SMB_COM_CLOSE and SMB_COM_FLUSH.

use std::io::Cursor;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;

use binrw::{BinRead, BinWrite};

use smbd_dtyp::binrw_util::prelude::FileTime;
use smbd_dtyp::security::AccessMask;
use smbd_fscc::FileAttributes;
use smbd_msg::create::{
    CloseRequest, CreateAction, CreateDisposition, FLUSH_ALL_FID, FileType, FlushRequest,
    NtCreateRequest, NtCreateResponse, OpenRequest, OpenResponse,
};
use smbd_msg::tree_connect::EmptyBody;

use crate::file::{FileState, SmbFile, SmbFileBuilder};
use crate::oplock::OplockLevel;
use crate::pipe::PipeKind;
use crate::server::Server;
use crate::session::Session;
use crate::smb1::{AndXNext, RequestContext};
use crate::tree::TreeConnection;
use crate::vfs::{STREAM_PREFIX, SetAttrs, Vfs};
use crate::{Error, Result};

/// How an open request wants the target treated.
pub(crate) struct OpenPlan {
    pub wire_name: String,
    pub desired_access: AccessMask,
    pub disposition: CreateDisposition,
    pub directory_required: bool,
    pub non_directory_required: bool,
    pub delete_on_close: bool,
    pub request_oplock: bool,
    pub attributes: FileAttributes,
    pub is_nt_open: bool,
}

/// A completed open.
pub(crate) struct OpenOutcome {
    pub fid: u16,
    pub file: Arc<SmbFile>,
    pub action: CreateAction,
    pub meta: std::fs::Metadata,
}

fn wants_write(access: &AccessMask) -> bool {
    access.write_data()
        || access.append_data()
        || access.write_ea()
        || access.write_attributes()
        || access.delete()
        || access.delete_child()
        || access.generic_write()
        || access.generic_all()
}

fn truncates(disposition: CreateDisposition) -> bool {
    matches!(
        disposition,
        CreateDisposition::Overwrite
            | CreateDisposition::OverwriteIf
            | CreateDisposition::Supersede
    )
}

/// Splits an alternate-data-stream suffix off a wire name, normalizing a
/// trailing `:$DATA` type tag away.
fn split_stream(wire_name: &str) -> (&str, Option<&str>) {
    let Some((base, stream)) = wire_name.split_once(':') else {
        return (wire_name, None);
    };
    let stream = stream
        .strip_suffix(":$DATA")
        .or_else(|| stream.strip_suffix(":$data"))
        .unwrap_or(stream);
    (base, Some(stream))
}

/// The disposition matrix: what to do given the target's presence.
fn plan_action(disposition: CreateDisposition, exists: bool, name: &str) -> Result<CreateAction> {
    Ok(match (disposition, exists) {
        (CreateDisposition::Open, true) => CreateAction::Opened,
        (CreateDisposition::Open, false) => return Err(Error::NotFound(name.to_string())),
        (CreateDisposition::Create, true) => {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        (CreateDisposition::Create, false) => CreateAction::Created,
        (CreateDisposition::OpenIf, true) => CreateAction::Opened,
        (CreateDisposition::OpenIf, false) => CreateAction::Created,
        (CreateDisposition::Overwrite, true) => CreateAction::Overwritten,
        (CreateDisposition::Overwrite, false) => {
            return Err(Error::NotFound(name.to_string()));
        }
        (CreateDisposition::OverwriteIf, true) => CreateAction::Overwritten,
        (CreateDisposition::OverwriteIf, false) => CreateAction::Created,
        (CreateDisposition::Supersede, true) => CreateAction::Superseded,
        (CreateDisposition::Supersede, false) => CreateAction::Created,
    })
}

/// Resolves the granted rights: generic bits expand to their file-rights
/// sets.
fn grant_access(desired: &AccessMask) -> AccessMask {
    let mut granted = desired.value();
    if desired.generic_all() {
        granted |= 0x001F_01FF;
    }
    if desired.generic_read() {
        granted |= 0x0012_0089;
    }
    if desired.generic_write() {
        granted |= 0x0012_0116;
    }
    if desired.generic_execute() {
        granted |= 0x0012_00A0;
    }
    AccessMask::from_value(granted & 0x01FF_FFFF)
}

/// The common disk open path shared by NT_CREATE_ANDX, OPEN_ANDX and
/// SMB_POSIX_OPEN.
pub(crate) fn open_disk_file(
    ctx: &RequestContext<'_>,
    session: &Arc<Session>,
    tree: &Arc<TreeConnection>,
    plan: OpenPlan,
) -> Result<OpenOutcome> {
    let vfs = tree.vfs()?;
    let (base_name, stream) = split_stream(&plan.wire_name);

    // Share-level writeability gates every mutating open, the legacy open
    // command included.
    if !tree.writeable && wants_write(&plan.desired_access) {
        return Err(Error::AccessDenied("share is not writeable"));
    }

    let path = match vfs.resolve_existing(base_name, ctx.caseless) {
        Ok(path) => path,
        Err(Error::NotFound(_)) => vfs.resolve(base_name)?,
        Err(e) => return Err(e),
    };

    if let Some(stream_name) = stream {
        return open_stream(ctx, session, tree, vfs, &plan, &path, stream_name);
    }

    let existing = path.symlink_metadata().ok();
    let action = plan_action(plan.disposition, existing.is_some(), &plan.wire_name)?;
    if !tree.writeable && action != CreateAction::Opened {
        return Err(Error::AccessDenied("share is not writeable"));
    }

    if let Some(meta) = &existing {
        if meta.is_dir() && plan.non_directory_required {
            return Err(Error::IsDirectory);
        }
        if !meta.is_dir() && plan.directory_required {
            return Err(Error::NotADirectory);
        }
        if meta.is_dir() && truncates(plan.disposition) {
            return Err(Error::IsDirectory);
        }
    }

    let is_directory = existing.as_ref().map(|m| m.is_dir()).unwrap_or(plan.directory_required);
    let granted = grant_access(&plan.desired_access);

    // Create or open on the host.
    let host = if is_directory {
        if existing.is_none() {
            vfs.mkdir(&path)?;
        }
        None
    } else {
        let mut options = std::fs::OpenOptions::new();
        options.read(true);
        if wants_write(&plan.desired_access) || truncates(plan.disposition) {
            options.write(true);
        }
        match action {
            CreateAction::Created => {
                options.create_new(true);
                options.write(true);
            }
            CreateAction::Overwritten | CreateAction::Superseded => {
                options.truncate(true);
                options.write(true);
            }
            _ => {}
        }
        Some(
            options
                .open(&path)
                .map_err(|e| Error::from_io_for(&plan.wire_name, e))?,
        )
    };

    let meta = vfs.metadata(&path)?;
    if action == CreateAction::Created {
        if plan.attributes.value() != 0 && !is_directory {
            vfs.set_dos_attributes(&path, plan.attributes.into())?;
        }
        vfs.set_creation_time(&path, FileTime::now())?;
    }

    let master = ctx
        .server
        .mft
        .lookup_or_insert((meta.dev(), meta.ino()), path.clone());
    if plan.delete_on_close {
        master.set_delete_on_close(true, false);
    }

    let oplock = if plan.request_oplock && tree.share.config.oplocks && !is_directory {
        ctx.server
            .oplocks
            .grant((meta.dev(), meta.ino()), OplockLevel::Exclusive)
    } else {
        OplockLevel::None
    };

    let fid = match session.fid_table.allocate() {
        Ok(fid) => fid,
        Err(e) => {
            ctx.server.mft.release(&master)?;
            return Err(e);
        }
    };

    let persistent_id = if plan.is_nt_open && !is_directory {
        Some(
            ctx.server
                .durables
                .register(session.uid, fid, plan.wire_name.clone(), (&meta).into()),
        )
    } else {
        None
    };

    let file = SmbFileBuilder {
        fid,
        persistent_id,
        session_uid: session.uid,
        tid: tree.tid,
        host_path: path,
        wire_name: plan.wire_name,
        host,
        access: granted,
        is_directory,
        stream_xattr: None,
        is_durable: persistent_id.is_some(),
        is_nt_open: plan.is_nt_open,
        oplock,
        pipe: None,
        master,
    }
    .build();
    file.set_state(FileState::Ready);
    session.fid_table.bind(fid, file.clone())?;

    Ok(OpenOutcome {
        fid,
        file,
        action,
        meta,
    })
}

/// Alternate-data-stream open: the data lives in a stream xattr of the
/// base file.
#[allow(clippy::too_many_arguments)]
fn open_stream(
    ctx: &RequestContext<'_>,
    session: &Arc<Session>,
    tree: &Arc<TreeConnection>,
    vfs: &Vfs,
    plan: &OpenPlan,
    path: &PathBuf,
    stream_name: &str,
) -> Result<OpenOutcome> {
    let meta = vfs.metadata(path)?;
    let xattr_name = format!("{STREAM_PREFIX}{stream_name}");
    let exists = vfs.get_xattr(path, &xattr_name)?.is_some();
    let action = plan_action(plan.disposition, exists, &plan.wire_name)?;

    match action {
        CreateAction::Created => vfs.set_xattr(path, &xattr_name, &[])?,
        CreateAction::Overwritten | CreateAction::Superseded => {
            vfs.set_xattr(path, &xattr_name, &[])?
        }
        _ => {}
    }

    let master = ctx
        .server
        .mft
        .lookup_or_insert((meta.dev(), meta.ino()), path.clone());
    if plan.delete_on_close {
        master.set_delete_on_close(true, true);
    }

    let fid = session.fid_table.allocate()?;
    let granted = grant_access(&plan.desired_access);
    let file = SmbFileBuilder {
        fid,
        persistent_id: None,
        session_uid: session.uid,
        tid: tree.tid,
        host_path: path.clone(),
        wire_name: plan.wire_name.clone(),
        host: None,
        access: granted,
        is_directory: false,
        stream_xattr: Some(xattr_name),
        is_durable: false,
        is_nt_open: plan.is_nt_open,
        oplock: OplockLevel::None,
        pipe: None,
        master,
    }
    .build();
    file.set_state(FileState::Ready);
    session.fid_table.bind(fid, file.clone())?;

    Ok(OpenOutcome {
        fid,
        file,
        action,
        meta,
    })
}

pub fn handle_nt_create(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = NtCreateRequest::read_args(req, (ctx.unicode,))?;
    let session = ctx.require_session()?;
    let tree = ctx.require_tree()?;

    if tree.is_ipc() {
        return nt_create_pipe(ctx, &session, &tree, &request, out);
    }

    // A RootDirectoryFid scopes the name under an open directory handle.
    let wire_name = if request.root_directory_fid != 0 {
        let root = session
            .fid_table
            .lookup(request.root_directory_fid as u16)
            .ok_or(Error::InvalidHandle(request.root_directory_fid as u16))?;
        format!(
            "{}\\{}",
            root.wire_name.trim_end_matches('\\'),
            request.file_name.as_str().trim_start_matches('\\')
        )
    } else {
        request.file_name.to_string()
    };

    let plan = OpenPlan {
        wire_name,
        desired_access: request.desired_access,
        disposition: request.create_disposition,
        directory_required: request.create_options.directory_file(),
        non_directory_required: request.create_options.non_directory_file(),
        delete_on_close: request.create_options.delete_on_close(),
        request_oplock: request.flags.request_oplock() || request.flags.request_batch_oplock(),
        attributes: request.ext_file_attributes,
        is_nt_open: true,
    };
    let outcome = open_disk_file(ctx, &session, &tree, plan)?;

    let vfs = tree.vfs()?;
    let created = vfs
        .creation_time(&outcome.file.host_path)?
        .unwrap_or_else(|| FileTime::from_unix(outcome.meta.ctime(), 0));
    let mut attributes = FileAttributes::new();
    if outcome.meta.is_dir() {
        attributes.set_directory(true);
    } else {
        attributes.set_archive(true);
    }

    NtCreateResponse {
        andx: smbd_msg::AndX::none(),
        oplock_level: outcome.file.oplock as u8,
        fid: outcome.fid,
        create_action: outcome.action,
        creation_time: created,
        last_access_time: FileTime::from_unix(outcome.meta.atime(), 0),
        last_write_time: FileTime::from_unix(outcome.meta.mtime(), 0),
        change_time: FileTime::from_unix(outcome.meta.ctime(), 0),
        ext_file_attributes: attributes,
        allocation_size: outcome.meta.blocks() * 512,
        end_of_file: outcome.meta.size(),
        file_type: FileType::Disk,
        device_state: 0,
        directory: outcome.meta.is_dir().into(),
    }
    .write(out)?;
    Ok(AndXNext::from_andx(&request.andx))
}

/// Pipe state advertised for message-mode IPC$ opens.
const PIPE_DEVICE_STATE: u16 = 0x05FF;

fn nt_create_pipe(
    ctx: &RequestContext<'_>,
    session: &Arc<Session>,
    tree: &Arc<TreeConnection>,
    request: &NtCreateRequest,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let name = request.file_name.to_string();
    let kind = PipeKind::from_open_name(&name)
        .ok_or_else(|| Error::NotFound(name.clone()))?;

    let master = ctx
        .server
        .mft
        .lookup_or_insert((u64::MAX, kind as u64), PathBuf::from("/"));
    let fid = session.fid_table.allocate()?;
    let file = SmbFileBuilder {
        fid,
        persistent_id: None,
        session_uid: session.uid,
        tid: tree.tid,
        host_path: PathBuf::new(),
        wire_name: name,
        host: None,
        access: grant_access(&request.desired_access),
        is_directory: false,
        stream_xattr: None,
        is_durable: false,
        is_nt_open: true,
        oplock: OplockLevel::None,
        pipe: Some(kind),
        master,
    }
    .build();
    file.set_state(FileState::Ready);
    session.fid_table.bind(fid, file)?;

    NtCreateResponse {
        andx: smbd_msg::AndX::none(),
        oplock_level: 0,
        fid,
        create_action: CreateAction::Opened,
        creation_time: FileTime::ZERO,
        last_access_time: FileTime::ZERO,
        last_write_time: FileTime::ZERO,
        change_time: FileTime::ZERO,
        ext_file_attributes: FileAttributes::new().with_normal(true),
        allocation_size: 0,
        end_of_file: 0,
        file_type: FileType::MessageModePipe,
        device_state: PIPE_DEVICE_STATE,
        directory: false.into(),
    }
    .write(out)?;
    Ok(AndXNext::from_andx(&request.andx))
}

pub fn handle_open(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = OpenRequest::read_args(req, (ctx.unicode,))?;
    let session = ctx.require_session()?;
    let tree = ctx.require_tree()?;

    let access_bits = request.open_mode.access();
    let mut desired = AccessMask::new().with_read_data(true).with_read_attributes(true);
    if access_bits == 1 || access_bits == 2 {
        desired = desired.with_write_data(true).with_append_data(true);
    }

    let exists_action = request.open_function.open_action();
    let disposition = match (request.open_function.create(), exists_action) {
        (true, 0) => CreateDisposition::Create,
        (true, 1) => CreateDisposition::OpenIf,
        (true, _) => CreateDisposition::OverwriteIf,
        (false, 1) => CreateDisposition::Open,
        (false, 2) => CreateDisposition::Overwrite,
        (false, _) => CreateDisposition::Open,
    };

    let plan = OpenPlan {
        wire_name: request.file_name.to_string(),
        desired_access: desired,
        disposition,
        directory_required: false,
        non_directory_required: true,
        delete_on_close: false,
        request_oplock: ctx.header.flags.oplock() || ctx.header.flags.batch_oplock(),
        attributes: request.file_attributes.into(),
        is_nt_open: false,
    };
    let outcome = open_disk_file(ctx, &session, &tree, plan)?;

    let action = match outcome.action {
        CreateAction::Opened => 1,
        CreateAction::Created => 2,
        CreateAction::Overwritten | CreateAction::Superseded => 3,
    };
    OpenResponse {
        andx: smbd_msg::AndX::none(),
        fid: outcome.fid,
        file_attributes: smbd_fscc::DosAttributes::new().with_archive(true),
        last_write_time: outcome.meta.mtime().max(0) as u32,
        data_size: outcome.meta.size().min(u32::MAX.into()) as u32,
        granted_access: request.open_mode.access().into(),
        file_type: FileType::Disk,
        device_state: 0,
        action,
        server_fid: outcome.fid.into(),
    }
    .write(out)?;
    Ok(AndXNext::from_andx(&request.andx))
}

/// Unbinds a FID and completes inode-level close effects. `drop_durable`
/// distinguishes a real close from a disconnect that keeps the durable
/// record alive.
pub async fn close_file(
    server: &Arc<Server>,
    session: &Arc<Session>,
    fid: u16,
    drop_durable: bool,
) -> Result<()> {
    let file = session.fid_table.unbind(fid).await?;

    // A pending stream delete is applied here, at the closing handle; the
    // base file stays.
    if let Some(xattr_name) = &file.stream_xattr {
        if file.master.flags().delete_on_close_stream {
            let _ = xattr::remove(&file.master.path(), xattr_name);
        }
    }

    file.master.detach(&file);
    server.mft.release(&file.master)?;

    if drop_durable {
        if let Some(persistent_id) = file.persistent_id {
            server.durables.close_persistent(persistent_id);
        }
    }
    Ok(())
}

pub async fn handle_close(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = CloseRequest::read(req)?;
    let session = ctx.require_session()?;

    // Apply the client's last-write stamp before the handle goes away.
    if request.last_write_time != 0 && request.last_write_time != u32::MAX {
        if let Some(file) = session.fid_table.lookup(request.fid) {
            if let Ok(tree) = session.tree(file.tid) {
                if let Ok(vfs) = tree.vfs() {
                    let stamp = std::time::UNIX_EPOCH
                        + std::time::Duration::from_secs(request.last_write_time.into());
                    let attrs = SetAttrs {
                        mtime: Some(stamp),
                        ..Default::default()
                    };
                    if let Err(e) = vfs.setattr(&file.host_path, Some(&file), &attrs) {
                        log::debug!("close-time mtime update failed: {e}");
                    }
                }
            }
        }
    }

    close_file(ctx.server, &session, request.fid, true).await?;
    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_flush(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = FlushRequest::read(req)?;
    let session = ctx.require_session()?;

    if request.fid == FLUSH_ALL_FID {
        for fid in session.fid_table.all_ids() {
            if let Some(file) = session.fid_table.lookup(fid) {
                if let Some(host) = &file.host {
                    let _ = host.sync_all();
                }
            }
        }
    } else {
        let file = session
            .fid_table
            .lookup(request.fid)
            .ok_or(Error::InvalidHandle(request.fid))?;
        if let Some(host) = &file.host {
            host.sync_all()?;
        }
    }

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}
