//! Path-addressed handlers: RENAME, NT_RENAME, DELETE, the directory
//! commands, QUERY_INFORMATION and SET_INFORMATION.

use std::io::Cursor;
use std::os::unix::fs::MetadataExt;

use binrw::{BinRead, BinWrite};

use smbd_fscc::DosAttributes;
use smbd_msg::path::{
    DeleteRequest, DirectoryRequest, NT_RENAME_RENAME_FILE, NT_RENAME_SET_LINK_INFO,
    NtRenameRequest, QueryInformationRequest, QueryInformationResponse, RenameRequest,
    SetInformationRequest,
};
use smbd_msg::tree_connect::EmptyBody;

use crate::name::{has_wildcard, split_last_component, wildcard_match};
use crate::smb1::{AndXNext, RequestContext};
use crate::tree::TreeConnection;
use crate::vfs::SetAttrs;
use crate::{Error, Result};

fn require_writeable(tree: &TreeConnection) -> Result<()> {
    if !tree.writeable {
        return Err(Error::AccessDenied("share is not writeable"));
    }
    Ok(())
}

pub fn handle_rename(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = RenameRequest::read_args(req, (ctx.unicode,))?;
    let tree = ctx.require_tree()?;
    require_writeable(&tree)?;
    let vfs = tree.vfs()?;

    let old = vfs.resolve_existing(request.old_file_name.as_str(), ctx.caseless)?;
    let new = vfs.resolve(request.new_file_name.as_str())?;
    if new.symlink_metadata().is_ok() {
        return Err(Error::AlreadyExists(request.new_file_name.to_string()));
    }
    vfs.rename(&old, &new)?;

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_nt_rename(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = NtRenameRequest::read_args(req, (ctx.unicode,))?;
    let tree = ctx.require_tree()?;
    require_writeable(&tree)?;
    let vfs = tree.vfs()?;

    let old = vfs.resolve_existing(request.old_file_name.as_str(), ctx.caseless)?;
    let new = vfs.resolve(request.new_file_name.as_str())?;

    match request.information_level {
        NT_RENAME_SET_LINK_INFO => {
            if new.symlink_metadata().is_ok() {
                return Err(Error::AlreadyExists(request.new_file_name.to_string()));
            }
            vfs.hardlink(&old, &new)?;
        }
        NT_RENAME_RENAME_FILE => {
            if new.symlink_metadata().is_ok() {
                return Err(Error::AlreadyExists(request.new_file_name.to_string()));
            }
            vfs.rename(&old, &new)?;
        }
        other => {
            return Err(Error::UnsupportedLevel(other));
        }
    }

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_delete(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = DeleteRequest::read_args(req, (ctx.unicode,))?;
    let tree = ctx.require_tree()?;
    require_writeable(&tree)?;
    let vfs = tree.vfs()?;

    let name = request.file_name.as_str();
    let (dir_part, last) = split_last_component(name);

    if has_wildcard(last) {
        // Wildcard deletes unlink every match; no match at all is an
        // error, as for a literal miss.
        let dir = vfs.resolve_existing(dir_part, ctx.caseless)?;
        let mut any = false;
        for entry in std::fs::read_dir(&dir).map_err(|e| Error::from_io_for(name, e))? {
            let entry = entry.map_err(Error::Io)?;
            let entry_name = entry.file_name().to_string_lossy().into_owned();
            if !wildcard_match(last, &entry_name) {
                continue;
            }
            let meta = entry.metadata().map_err(Error::Io)?;
            if meta.is_dir() {
                continue;
            }
            vfs.unlink(&entry.path())?;
            any = true;
        }
        if !any {
            return Err(Error::NotFound(name.to_string()));
        }
    } else {
        let path = vfs.resolve_existing(name, ctx.caseless)?;
        vfs.unlink(&path)?;
    }

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_mkdir(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = DirectoryRequest::read_args(req, (ctx.unicode,))?;
    let tree = ctx.require_tree()?;
    require_writeable(&tree)?;
    let vfs = tree.vfs()?;

    let path = vfs.resolve(request.directory_name.as_str())?;
    if path.symlink_metadata().is_ok() {
        return Err(Error::AlreadyExists(request.directory_name.to_string()));
    }
    vfs.mkdir(&path)?;

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_rmdir(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = DirectoryRequest::read_args(req, (ctx.unicode,))?;
    let tree = ctx.require_tree()?;
    require_writeable(&tree)?;
    let vfs = tree.vfs()?;

    let path = vfs.resolve_existing(request.directory_name.as_str(), ctx.caseless)?;
    vfs.rmdir(&path)?;

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_checkdir(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = DirectoryRequest::read_args(req, (ctx.unicode,))?;
    let tree = ctx.require_tree()?;
    let vfs = tree.vfs()?;

    let path = vfs.resolve_existing(request.directory_name.as_str(), ctx.caseless)?;
    let meta = vfs.metadata(&path)?;
    if !meta.is_dir() {
        return Err(Error::NotADirectory);
    }

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_query_information(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = QueryInformationRequest::read_args(req, (ctx.unicode,))?;
    let tree = ctx.require_tree()?;
    let vfs = tree.vfs()?;

    let path = vfs.resolve_existing(request.file_name.as_str(), ctx.caseless)?;
    let meta = vfs.metadata(&path)?;

    let mut attributes = DosAttributes::new();
    if meta.is_dir() {
        attributes.set_directory(true);
    } else {
        attributes.set_archive(true);
    }
    if meta.mode() & 0o200 == 0 {
        attributes.set_readonly(true);
    }
    if let Some(stored) = vfs.dos_attributes(&path)? {
        attributes = DosAttributes::from_value(attributes.value() | stored.value());
    }

    QueryInformationResponse {
        file_attributes: attributes,
        last_write_time: meta.mtime().max(0) as u32,
        file_size: meta.size().min(u32::MAX.into()) as u32,
    }
    .write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_set_information(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = SetInformationRequest::read_args(req, (ctx.unicode,))?;
    let tree = ctx.require_tree()?;
    require_writeable(&tree)?;
    let vfs = tree.vfs()?;

    let path = vfs.resolve_existing(request.file_name.as_str(), ctx.caseless)?;
    vfs.set_dos_attributes(&path, request.file_attributes)?;

    if request.last_write_time != 0 {
        let stamp = std::time::UNIX_EPOCH
            + std::time::Duration::from_secs(request.last_write_time.into());
        let attrs = SetAttrs {
            mtime: Some(stamp),
            ..Default::default()
        };
        vfs.setattr(&path, None, &attrs)?;
    }

    EmptyBody::default().write(out)?;
    Ok(AndXNext::Done)
}
