//! SMB_COM_TRANSACTION2 sub-command handlers: directory searches, the
//! query/set information families, filesystem information and the DFS
//! stub.

use std::io::Cursor;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;

use binrw::{BinRead, BinWrite};

use smbd_dtyp::binrw_util::prelude::FileTime;
use smbd_fscc::{
    CifsUnixCaps, FILE_DEVICE_DISK, FeaEntry, FeaList, FileAllInfo,
    FileAllocationInfo, FileAttributes, FileBasicInfo, FileDispositionInfo, FileEaInfo,
    FileEndOfFileInfo, FileInfoStandard, FileInternalInfo, FileLinkTarget, FileNameInfo,
    FileRenameInfo, FileStandardInfo, FileUnixBasicInfo, FileUnixLinkInfo, FindInformationLevel,
    FsAllocationInfo, FsAttributeInfo, FsAttributes, FsDeviceInfo, FsInformationLevel,
    FsPosixInfo, FsSizeInfo, FsUnixInfo, FsVolumeInfo, PosixAclWire, PosixOpenRequest,
    PosixOpenResponse, PosixUnlinkType, QueryInformationLevel, SetInformationLevel,
    dos_date_time, unix_from_dos,
};
use smbd_msg::create::{CreateAction, CreateDisposition};
use smbd_msg::trans::TransResponse;
use smbd_msg::trans2::{
    FindFirst2Params, FindFirst2ResponseParams, FindNext2Params, FindNext2ResponseParams,
    QueryFileInfoParams, QueryFsInfoParams, QueryPathInfoParams, SetFileInfoParams,
    SetInfoResponseParams, SetPathInfoParams, Trans2CreateDirectoryParams, Trans2Request,
    Trans2SubCommand,
};

use crate::dirent::{DirEntryBuffer, emit_next_batch, unix_basic_from_meta};
use crate::file::{FileState, SmbFileBuilder};
use crate::name::{mangle_83, split_last_component};
use crate::oplock::OplockLevel;
use crate::session::Session;
use crate::smb1::create::{OpenPlan, open_disk_file};
use crate::smb1::{AndXNext, RequestContext, close_file};
use crate::tree::TreeConnection;
use crate::vfs::{SetAttrs, Vfs};
use crate::{Error, Result};

pub async fn handle_transaction2(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = Trans2Request::read(req)?;
    if !request.is_single_part() {
        return Err(Error::NotSupported("multi-part TRANSACTION2"));
    }
    let sub = Trans2SubCommand::try_from(request.sub_command)
        .map_err(|_| Error::NotSupported("TRANSACTION2 sub-command"))?;

    let response = match sub {
        Trans2SubCommand::FindFirst2 => find_first2(ctx, &request).await?,
        Trans2SubCommand::FindNext2 => find_next2(ctx, &request).await?,
        Trans2SubCommand::QueryFsInformation => query_fs_information(ctx, &request)?,
        Trans2SubCommand::SetFsInformation => set_fs_information(ctx, &request)?,
        Trans2SubCommand::QueryPathInformation => query_path_information(ctx, &request)?,
        Trans2SubCommand::QueryFileInformation => query_file_information(ctx, &request)?,
        Trans2SubCommand::SetPathInformation => set_path_information(ctx, &request)?,
        Trans2SubCommand::SetFileInformation => set_file_information(ctx, &request)?,
        Trans2SubCommand::CreateDirectory => create_directory(ctx, &request)?,
        Trans2SubCommand::GetDfsReferral => {
            return Err(Error::NotSupported("DFS referrals"));
        }
    };
    response.write(out)?;
    Ok(AndXNext::Done)
}

fn params_of<T>(request: &Trans2Request, ctx: &RequestContext<'_>) -> Result<T>
where
    T: for<'a> BinRead<Args<'a> = (bool,)>,
{
    Ok(T::read_le_args(
        &mut Cursor::new(&request.params),
        (ctx.unicode,),
    )?)
}

fn serialize<T>(value: &T) -> Result<Vec<u8>>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    value.write_le(&mut cursor)?;
    Ok(cursor.into_inner())
}

fn serialize_args<T>(value: &T, unicode: bool) -> Result<Vec<u8>>
where
    T: for<'a> BinWrite<Args<'a> = (bool,)>,
{
    let mut cursor = Cursor::new(Vec::new());
    value.write_le_args(&mut cursor, (unicode,))?;
    Ok(cursor.into_inner())
}

// --- FIND_FIRST2 / FIND_NEXT2 -------------------------------------------

async fn find_first2(
    ctx: &mut RequestContext<'_>,
    request: &Trans2Request,
) -> Result<TransResponse> {
    let params: FindFirst2Params = params_of(request, ctx)?;
    let session = ctx.require_session()?;
    let tree = ctx.require_tree()?;
    let vfs = tree.vfs()?;

    let level = FindInformationLevel::try_from(params.information_level)
        .map_err(Error::UnsupportedLevel)?;

    let (dir_wire, last) = split_last_component(params.file_name.as_str());
    let pattern = if last.is_empty() {
        "*".to_string()
    } else {
        last.to_string()
    };

    let dir_path = vfs.resolve_existing(dir_wire, ctx.caseless)?;
    let meta = vfs.metadata(&dir_path)?;
    if !meta.is_dir() {
        return Err(Error::NotADirectory);
    }

    // The search handle is a directory FID carrying the cursor.
    let master = ctx
        .server
        .mft
        .lookup_or_insert((meta.dev(), meta.ino()), dir_path.clone());
    let sid = session.fid_table.allocate()?;
    let file = SmbFileBuilder {
        fid: sid,
        persistent_id: None,
        session_uid: session.uid,
        tid: tree.tid,
        host_path: dir_path.clone(),
        wire_name: dir_wire.to_string(),
        host: None,
        access: smbd_dtyp::security::AccessMask::new().with_read_data(true),
        is_directory: true,
        stream_xattr: None,
        is_durable: false,
        is_nt_open: true,
        oplock: OplockLevel::None,
        pipe: None,
        master,
    }
    .build();
    {
        let mut inner = file.inner.lock().unwrap();
        inner.dir_buffer = Some(DirEntryBuffer::new());
        inner.search_pattern = Some(pattern.clone());
    }
    file.set_state(FileState::Ready);
    session.fid_table.bind(sid, file.clone())?;

    let batch = {
        let mut inner = file.inner.lock().unwrap();
        let buffer = inner
            .dir_buffer
            .as_mut()
            .ok_or_else(|| Error::fault("search handle without a cursor"))?;
        emit_next_batch(
            vfs,
            buffer,
            &dir_path,
            level,
            Some(&pattern),
            params.search_count,
            request.max_data_count.into(),
            ctx.unicode,
        )?
    };

    if batch.entries_written == 0 && batch.ended {
        close_file(ctx.server, &session, sid, true).await?;
        return Err(Error::NoSuchFile(params.file_name.to_string()));
    }

    let close_now = params.flags.close_after_request()
        || (batch.ended && params.flags.close_at_eos());
    if close_now {
        close_file(ctx.server, &session, sid, true).await?;
    }

    let response_params = FindFirst2ResponseParams {
        sid,
        search_count: batch.entries_written,
        end_of_search: batch.ended.into(),
        ea_error_offset: 0,
        last_name_offset: batch.last_name_offset,
    };
    Ok(TransResponse::new(serialize(&response_params)?, batch.data))
}

async fn find_next2(
    ctx: &mut RequestContext<'_>,
    request: &Trans2Request,
) -> Result<TransResponse> {
    let params: FindNext2Params = params_of(request, ctx)?;
    let session = ctx.require_session()?;
    let tree = ctx.require_tree()?;
    let vfs = tree.vfs()?;

    let level = FindInformationLevel::try_from(params.information_level)
        .map_err(Error::UnsupportedLevel)?;

    let file = session
        .fid_table
        .lookup(params.sid)
        .ok_or(Error::InvalidHandle(params.sid))?;

    let batch = {
        let mut inner = file.inner.lock().unwrap();
        let pattern = inner.search_pattern.clone().unwrap_or_else(|| "*".into());
        let dir_path = file.host_path.clone();
        let buffer = inner
            .dir_buffer
            .as_mut()
            .ok_or(Error::InvalidHandle(params.sid))?;
        emit_next_batch(
            vfs,
            buffer,
            &dir_path,
            level,
            Some(&pattern),
            params.search_count,
            request.max_data_count.into(),
            ctx.unicode,
        )?
    };
    drop(file);

    if batch.entries_written == 0 && batch.ended {
        close_file(ctx.server, &session, params.sid, true).await?;
        return Err(Error::NoMoreFiles);
    }

    let close_now = params.flags.close_after_request()
        || (batch.ended && params.flags.close_at_eos());
    if close_now {
        close_file(ctx.server, &session, params.sid, true).await?;
    }

    let response_params = FindNext2ResponseParams {
        search_count: batch.entries_written,
        end_of_search: batch.ended.into(),
        ea_error_offset: 0,
        last_name_offset: batch.last_name_offset,
    };
    Ok(TransResponse::new(serialize(&response_params)?, batch.data))
}

// --- QUERY_FS_INFORMATION ------------------------------------------------

fn query_fs_information(
    ctx: &mut RequestContext<'_>,
    request: &Trans2Request,
) -> Result<TransResponse> {
    let params = QueryFsInfoParams::read(&mut Cursor::new(&request.params))?;
    let tree = ctx.require_tree()?;
    let vfs = tree.vfs()?;
    let level =
        FsInformationLevel::try_from(params.information_level).map_err(Error::UnsupportedLevel)?;

    let stat = vfs.statfs()?;
    let block_size = stat.block_size().max(512) as u64;
    let fragment_size = stat.fragment_size().max(512) as u64;

    let data = match level {
        FsInformationLevel::Allocation => serialize(&FsAllocationInfo {
            fs_id: 0,
            sectors_per_allocation_unit: (fragment_size / 512) as u32,
            total_allocation_units: stat.blocks().min(u32::MAX.into()) as u32,
            free_allocation_units: stat.blocks_available().min(u32::MAX.into()) as u32,
            bytes_per_sector: 512,
        })?,
        FsInformationLevel::Volume => serialize_args(
            &FsVolumeInfo {
                volume_creation_time: FileTime::ZERO,
                serial_number: stat.filesystem_id() as u32,
                volume_label: tree.share.name().into(),
            },
            ctx.unicode,
        )?,
        FsInformationLevel::Size => serialize(&FsSizeInfo {
            total_allocation_units: stat.blocks(),
            free_allocation_units: stat.blocks_available(),
            sectors_per_allocation_unit: (fragment_size / 512) as u32,
            bytes_per_sector: 512,
        })?,
        FsInformationLevel::Device => serialize(&FsDeviceInfo {
            device_type: FILE_DEVICE_DISK,
            device_characteristics: 0,
        })?,
        FsInformationLevel::Attribute => serialize_args(
            &FsAttributeInfo {
                attributes: FsAttributes::new()
                    .with_case_sensitive_search(true)
                    .with_case_preserved_names(true)
                    .with_unicode_on_disk(true),
                max_path_name_component_length: 255,
                file_system_name: "NTFS".into(),
            },
            ctx.unicode,
        )?,
        FsInformationLevel::CifsUnix => serialize(&FsUnixInfo {
            major_version: 1,
            minor_version: 0,
            capability: CifsUnixCaps::new()
                .with_fcntl_locks(true)
                .with_posix_acls(true)
                .with_xattr(true)
                .with_large_read(true)
                .with_large_write(true),
        })?,
        FsInformationLevel::PosixFs => serialize(&FsPosixInfo {
            optimal_transfer_size: block_size as u32,
            block_size: fragment_size as u32,
            total_blocks: stat.blocks(),
            blocks_avail: stat.blocks_free(),
            user_blocks_avail: stat.blocks_available(),
            total_file_nodes: stat.files(),
            free_file_nodes: stat.files_free(),
            fs_identifier: stat.filesystem_id(),
        })?,
    };
    Ok(TransResponse::new(Vec::new(), data))
}

fn set_fs_information(
    ctx: &mut RequestContext<'_>,
    request: &Trans2Request,
) -> Result<TransResponse> {
    let params = smbd_msg::trans2::SetFsInfoParams::read(&mut Cursor::new(&request.params))?;
    ctx.require_tree()?;

    // SMB_SET_CIFS_UNIX_INFO announces the client's capability choices.
    // Their effect is undefined here; record and accept.
    if params.information_level == 0x0200 {
        let info = FsUnixInfo::read(&mut Cursor::new(&request.data))?;
        log::debug!(
            "client announces CIFS unix caps {:#x}",
            u64::from_le_bytes(info.capability.into_bytes())
        );
        return Ok(TransResponse::new(Vec::new(), Vec::new()));
    }
    Err(Error::UnsupportedLevel(params.information_level))
}

// --- QUERY_PATH / QUERY_FILE ---------------------------------------------

fn query_path_information(
    ctx: &mut RequestContext<'_>,
    request: &Trans2Request,
) -> Result<TransResponse> {
    let params: QueryPathInfoParams = params_of(request, ctx)?;
    let tree = ctx.require_tree()?;
    let vfs = tree.vfs()?;
    let level = QueryInformationLevel::try_from(params.information_level)
        .map_err(Error::UnsupportedLevel)?;

    let path = vfs.resolve_existing(params.file_name.as_str(), ctx.caseless)?;
    let data = build_query_info(ctx, vfs, &path, params.file_name.as_str(), level)?;
    Ok(TransResponse::new(
        serialize(&SetInfoResponseParams::default())?,
        data,
    ))
}

fn query_file_information(
    ctx: &mut RequestContext<'_>,
    request: &Trans2Request,
) -> Result<TransResponse> {
    let params = QueryFileInfoParams::read(&mut Cursor::new(&request.params))?;
    let session = ctx.require_session()?;
    let tree = ctx.require_tree()?;
    let vfs = tree.vfs()?;
    let level = QueryInformationLevel::try_from(params.information_level)
        .map_err(Error::UnsupportedLevel)?;

    let file = session
        .fid_table
        .lookup(params.fid)
        .ok_or(Error::InvalidHandle(params.fid))?;
    let path = file.host_path.clone();
    let wire_name = file.wire_name.clone();
    drop(file);

    let data = build_query_info(ctx, vfs, &path, &wire_name, level)?;
    Ok(TransResponse::new(
        serialize(&SetInfoResponseParams::default())?,
        data,
    ))
}

/// Loads the EA list of a path from its plain user xattrs.
fn ea_list(vfs: &Vfs, path: &Path) -> Result<FeaList> {
    let mut entries = Vec::new();
    for name in vfs.list_plain_xattrs(path)? {
        let value = vfs.get_xattr(path, &name)?.unwrap_or_default();
        let short = name.strip_prefix("user.").unwrap_or(&name);
        entries.push(FeaEntry::new(short, &value));
    }
    Ok(entries.into())
}

fn query_attributes(vfs: &Vfs, path: &Path, meta: &std::fs::Metadata) -> Result<FileAttributes> {
    let mut attributes = FileAttributes::new();
    if meta.is_dir() {
        attributes.set_directory(true);
    } else {
        attributes.set_archive(true);
    }
    if meta.mode() & 0o200 == 0 {
        attributes.set_readonly(true);
    }
    if let Some(stored) = vfs.dos_attributes(path)? {
        let stored: FileAttributes = stored.into();
        attributes = FileAttributes::from_value(attributes.value() | stored.value());
    }
    Ok(attributes)
}

fn build_query_info(
    ctx: &RequestContext<'_>,
    vfs: &Vfs,
    path: &Path,
    wire_name: &str,
    level: QueryInformationLevel,
) -> Result<Vec<u8>> {
    let meta = vfs.metadata(path)?;
    let attributes = query_attributes(vfs, path, &meta)?;
    let change_time = FileTime::from_unix(meta.ctime(), meta.ctime_nsec() as u32);
    let creation_time = vfs.creation_time(path)?.unwrap_or(change_time);
    let access_time = FileTime::from_unix(meta.atime(), meta.atime_nsec() as u32);
    let write_time = FileTime::from_unix(meta.mtime(), meta.mtime_nsec() as u32);
    let delete_pending = ctx
        .server
        .mft
        .peek((meta.dev(), meta.ino()))
        .map(|master| master.flags().delete_on_close)
        .unwrap_or(false);

    let ea_size = || -> Result<u32> {
        let list = ea_list(vfs, path)?;
        if list.entries.is_empty() {
            return Ok(0);
        }
        Ok((4 + list.entries.iter().map(FeaEntry::wire_size).sum::<usize>()) as u32)
    };

    Ok(match level {
        QueryInformationLevel::Standard | QueryInformationLevel::EaSize => {
            let (creation_date, creation_dos) = dos_date_time(creation_time.to_unix_secs());
            let (access_date, access_dos) = dos_date_time(meta.atime());
            let (write_date, write_dos) = dos_date_time(meta.mtime());
            let with_ea = level == QueryInformationLevel::EaSize;
            let info = FileInfoStandard {
                creation_date,
                creation_time: creation_dos,
                last_access_date: access_date,
                last_access_time: access_dos,
                last_write_date: write_date,
                last_write_time: write_dos,
                data_size: meta.size().min(u32::MAX.into()) as u32,
                allocation_size: (meta.blocks() * 512).min(u32::MAX.into()) as u32,
                attributes: attributes.into(),
                ea_size: with_ea.then(|| ea_size()).transpose()?,
            };
            let mut cursor = Cursor::new(Vec::new());
            info.write_args(&mut cursor, (with_ea,))?;
            cursor.into_inner()
        }
        QueryInformationLevel::AllEas => {
            let list = ea_list(vfs, path)?;
            if list.entries.is_empty() {
                return Err(Error::NoEasOnFile);
            }
            serialize(&list)?
        }
        QueryInformationLevel::Basic => serialize(&FileBasicInfo {
            creation_time,
            last_access_time: access_time,
            last_write_time: write_time,
            change_time,
            attributes,
        })?,
        QueryInformationLevel::StandardInfo => serialize(&FileStandardInfo {
            allocation_size: meta.blocks() * 512,
            end_of_file: meta.size(),
            number_of_links: meta.nlink() as u32,
            delete_pending: delete_pending.into(),
            directory: meta.is_dir().into(),
        })?,
        QueryInformationLevel::EaInfo => serialize(&FileEaInfo { ea_size: ea_size()? })?,
        QueryInformationLevel::NameInfo => serialize_args(
            &FileNameInfo {
                file_name: wire_name.into(),
            },
            ctx.unicode,
        )?,
        QueryInformationLevel::AllInfo => serialize_args(
            &FileAllInfo {
                creation_time,
                last_access_time: access_time,
                last_write_time: write_time,
                change_time,
                attributes,
                allocation_size: meta.blocks() * 512,
                end_of_file: meta.size(),
                number_of_links: meta.nlink() as u32,
                delete_pending: delete_pending.into(),
                directory: meta.is_dir().into(),
                ea_size: ea_size()?,
                file_name: wire_name.into(),
            },
            ctx.unicode,
        )?,
        QueryInformationLevel::AltNameInfo => {
            let (_, last) = split_last_component(wire_name);
            serialize_args(
                &FileNameInfo {
                    file_name: mangle_83(last).as_str().into(),
                },
                ctx.unicode,
            )?
        }
        QueryInformationLevel::UnixBasic => serialize(&unix_basic_from_meta(&meta))?,
        QueryInformationLevel::UnixLink => serialize_args(
            &FileUnixLinkInfo {
                target: vfs.readlink(path)?.into(),
            },
            ctx.unicode,
        )?,
        QueryInformationLevel::PosixAcl => {
            serialize(&PosixAclWire::from_mode(meta.mode() & 0o7777))?
        }
        QueryInformationLevel::InternalInfo => serialize(&FileInternalInfo {
            index_number: meta.ino(),
        })?,
    })
}

// --- SET_PATH / SET_FILE -------------------------------------------------

fn set_path_information(
    ctx: &mut RequestContext<'_>,
    request: &Trans2Request,
) -> Result<TransResponse> {
    let params: SetPathInfoParams = params_of(request, ctx)?;
    let session = ctx.require_session()?;
    let tree = ctx.require_tree()?;
    let level = SetInformationLevel::try_from(params.information_level)
        .map_err(Error::UnsupportedLevel)?;

    apply_set_info(
        ctx,
        &session,
        &tree,
        SetTarget::Path(params.file_name.to_string()),
        level,
        &request.data,
    )
}

fn set_file_information(
    ctx: &mut RequestContext<'_>,
    request: &Trans2Request,
) -> Result<TransResponse> {
    let params = SetFileInfoParams::read(&mut Cursor::new(&request.params))?;
    let session = ctx.require_session()?;
    let tree = ctx.require_tree()?;
    let level = SetInformationLevel::try_from(params.information_level)
        .map_err(Error::UnsupportedLevel)?;

    apply_set_info(
        ctx,
        &session,
        &tree,
        SetTarget::Fid(params.fid),
        level,
        &request.data,
    )
}

enum SetTarget {
    Path(String),
    Fid(u16),
}

fn apply_set_info(
    ctx: &RequestContext<'_>,
    session: &Arc<Session>,
    tree: &Arc<TreeConnection>,
    target: SetTarget,
    level: SetInformationLevel,
    data: &[u8],
) -> Result<TransResponse> {
    let vfs = tree.vfs()?;
    if !tree.writeable {
        return Err(Error::AccessDenied("share is not writeable"));
    }

    // POSIX_OPEN is carried as a set operation but opens a handle.
    if level == SetInformationLevel::PosixOpen {
        let SetTarget::Path(wire_name) = target else {
            return Err(Error::InvalidParameter("POSIX_OPEN on a FID"));
        };
        return posix_open(ctx, session, tree, wire_name, data);
    }

    let (path, file) = match &target {
        SetTarget::Path(wire_name) => {
            let resolve_missing_ok = matches!(
                level,
                SetInformationLevel::UnixLink | SetInformationLevel::UnixHlink
            );
            let path = if resolve_missing_ok {
                vfs.resolve(wire_name)?
            } else {
                vfs.resolve_existing(wire_name, ctx.caseless)?
            };
            (path, None)
        }
        SetTarget::Fid(fid) => {
            let file = session
                .fid_table
                .lookup(*fid)
                .ok_or(Error::InvalidHandle(*fid))?;
            (file.host_path.clone(), Some(file))
        }
    };
    let file_ref = file.as_deref();
    let mut cursor = Cursor::new(data);

    match level {
        SetInformationLevel::Standard => {
            let info = FileInfoStandard::read_args(&mut cursor, (false,))?;
            let mtime = unix_from_dos(info.last_write_date, info.last_write_time);
            if mtime > 0 {
                let attrs = SetAttrs {
                    mtime: Some(
                        std::time::UNIX_EPOCH + std::time::Duration::from_secs(mtime as u64),
                    ),
                    ..Default::default()
                };
                vfs.setattr(&path, file_ref, &attrs)?;
            }
        }
        SetInformationLevel::Basic => {
            let info = FileBasicInfo::read(&mut cursor)?;
            let mut attrs = SetAttrs::default();
            if !info.last_access_time.is_zero() {
                attrs.atime = Some(
                    std::time::UNIX_EPOCH
                        + std::time::Duration::from_secs(
                            info.last_access_time.to_unix_secs().max(0) as u64,
                        ),
                );
            }
            if !info.last_write_time.is_zero() {
                attrs.mtime = Some(
                    std::time::UNIX_EPOCH
                        + std::time::Duration::from_secs(
                            info.last_write_time.to_unix_secs().max(0) as u64,
                        ),
                );
            }
            vfs.setattr(&path, file_ref, &attrs)?;
            if info.attributes.value() != 0 {
                vfs.set_dos_attributes(&path, info.attributes.into())?;
            }
            if !info.creation_time.is_zero() {
                vfs.set_creation_time(&path, info.creation_time)?;
            }
        }
        SetInformationLevel::Disposition => {
            let info = FileDispositionInfo::read(&mut cursor)?;
            let file = file_ref.ok_or(Error::InvalidParameter(
                "DISPOSITION_INFO requires an open handle",
            ))?;
            if !file.access.delete() && !file.access.generic_all() {
                return Err(Error::AccessDenied("handle lacks DELETE access"));
            }
            let pending: bool = info.delete_pending.into();
            if pending && file.is_directory {
                let mut entries = std::fs::read_dir(&path).map_err(Error::Io)?;
                if entries.next().is_some() {
                    return Err(Error::DirectoryNotEmpty);
                }
            }
            file.master
                .set_delete_on_close(pending, file.stream_xattr.is_some());
        }
        SetInformationLevel::Allocation => {
            let info = FileAllocationInfo::read(&mut cursor)?;
            let attrs = SetAttrs {
                size: Some(info.allocation_size),
                ..Default::default()
            };
            vfs.setattr(&path, file_ref, &attrs)?;
        }
        SetInformationLevel::EndOfFile => {
            let info = FileEndOfFileInfo::read(&mut cursor)?;
            let attrs = SetAttrs {
                size: Some(info.end_of_file),
                ..Default::default()
            };
            vfs.setattr(&path, file_ref, &attrs)?;
        }
        SetInformationLevel::UnixBasic => {
            let info = FileUnixBasicInfo::read(&mut cursor)?;
            let mut attrs = SetAttrs::default();
            if info.permissions != FileUnixBasicInfo::UNCHANGED {
                attrs.mode = Some((info.permissions & 0o7777) as u32);
            }
            if info.uid != FileUnixBasicInfo::UNCHANGED {
                attrs.uid = Some(info.uid as u32);
            }
            if info.gid != FileUnixBasicInfo::UNCHANGED {
                attrs.gid = Some(info.gid as u32);
            }
            if info.end_of_file != 0 && info.end_of_file != FileUnixBasicInfo::UNCHANGED {
                attrs.size = Some(info.end_of_file);
            }
            if !info.last_access_time.is_zero() {
                attrs.atime = Some(
                    std::time::UNIX_EPOCH
                        + std::time::Duration::from_secs(
                            info.last_access_time.to_unix_secs().max(0) as u64,
                        ),
                );
            }
            if !info.last_modification_time.is_zero() {
                attrs.mtime = Some(
                    std::time::UNIX_EPOCH
                        + std::time::Duration::from_secs(
                            info.last_modification_time.to_unix_secs().max(0) as u64,
                        ),
                );
            }
            vfs.setattr(&path, file_ref, &attrs)?;
        }
        SetInformationLevel::UnixLink => {
            let info = FileLinkTarget::read_args(&mut cursor, (ctx.unicode,))?;
            if path.symlink_metadata().is_ok() {
                return Err(Error::AlreadyExists(path.to_string_lossy().into_owned()));
            }
            vfs.symlink(info.target.as_str(), &path)?;
        }
        SetInformationLevel::UnixHlink => {
            let info = FileLinkTarget::read_args(&mut cursor, (ctx.unicode,))?;
            let original = vfs.resolve_existing(info.target.as_str(), ctx.caseless)?;
            vfs.hardlink(&original, &path)?;
        }
        SetInformationLevel::PosixAcl => {
            let acl = PosixAclWire::read(&mut cursor)?;
            let attrs = SetAttrs {
                mode: Some(acl.to_mode()),
                ..Default::default()
            };
            vfs.setattr(&path, file_ref, &attrs)?;
        }
        SetInformationLevel::PosixUnlink => {
            let unlink_type = PosixUnlinkType::read(&mut cursor)?;
            match unlink_type {
                PosixUnlinkType::Directory => vfs.rmdir(&path)?,
                PosixUnlinkType::File => vfs.unlink(&path)?,
            }
        }
        SetInformationLevel::Rename => {
            let info = FileRenameInfo::read_args(&mut cursor, (ctx.unicode,))?;
            let new = if info.root_fid != 0 {
                let root = session
                    .fid_table
                    .lookup(info.root_fid as u16)
                    .ok_or(Error::InvalidHandle(info.root_fid as u16))?;
                root.host_path
                    .join(crate::name::sanitize_wire_path(info.target_name.as_str())?)
            } else {
                vfs.resolve(info.target_name.as_str())?
            };
            let overwrite: bool = info.overwrite.into();
            if new.symlink_metadata().is_ok() && !overwrite {
                return Err(Error::AlreadyExists(info.target_name.to_string()));
            }
            vfs.rename(&path, &new)?;
        }
        SetInformationLevel::PosixOpen => {
            // handled above
        }
    }

    Ok(TransResponse::new(
        serialize(&SetInfoResponseParams::default())?,
        Vec::new(),
    ))
}

fn posix_open(
    ctx: &RequestContext<'_>,
    session: &Arc<Session>,
    tree: &Arc<TreeConnection>,
    wire_name: String,
    data: &[u8],
) -> Result<TransResponse> {
    let info = PosixOpenRequest::read(&mut Cursor::new(data))?;
    let flags = info.open_flags;

    let disposition = match (flags.creat(), flags.excl(), flags.trunc()) {
        (true, true, _) => CreateDisposition::Create,
        (true, false, true) => CreateDisposition::OverwriteIf,
        (true, false, false) => CreateDisposition::OpenIf,
        (false, _, true) => CreateDisposition::Overwrite,
        (false, _, false) => CreateDisposition::Open,
    };

    let mut desired = smbd_dtyp::security::AccessMask::new()
        .with_read_data(true)
        .with_read_attributes(true);
    if flags.write() {
        desired = desired.with_write_data(true).with_append_data(true);
    }

    let plan = OpenPlan {
        wire_name,
        desired_access: desired,
        disposition,
        directory_required: flags.directory(),
        non_directory_required: false,
        delete_on_close: false,
        request_oplock: false,
        attributes: FileAttributes::new(),
        is_nt_open: false,
    };
    let outcome = open_disk_file(ctx, session, tree, plan)?;

    if outcome.action == CreateAction::Created && info.permissions != 0 {
        let attrs = SetAttrs {
            mode: Some((info.permissions & 0o7777) as u32),
            ..Default::default()
        };
        tree.vfs()?
            .setattr(&outcome.file.host_path, None, &attrs)?;
    }

    let response = PosixOpenResponse {
        oplock_flags: 0,
        fid: outcome.fid,
        create_action: match outcome.action {
            CreateAction::Opened => 1,
            CreateAction::Created => 2,
            CreateAction::Overwritten | CreateAction::Superseded => 3,
        },
        returned_level: 0,
    };
    Ok(TransResponse::new(
        serialize(&SetInfoResponseParams::default())?,
        serialize(&response)?,
    ))
}

// --- CREATE_DIRECTORY ----------------------------------------------------

fn create_directory(
    ctx: &mut RequestContext<'_>,
    request: &Trans2Request,
) -> Result<TransResponse> {
    let params: Trans2CreateDirectoryParams = params_of(request, ctx)?;
    let tree = ctx.require_tree()?;
    if !tree.writeable {
        return Err(Error::AccessDenied("share is not writeable"));
    }
    let vfs = tree.vfs()?;

    let path = vfs.resolve(params.directory_name.as_str())?;
    if path.symlink_metadata().is_ok() {
        return Err(Error::AlreadyExists(params.directory_name.to_string()));
    }
    vfs.mkdir(&path)?;

    // Any EAs shipped with the create are applied to the fresh directory.
    if !request.data.is_empty() {
        let list = FeaList::read(&mut Cursor::new(&request.data))?;
        for entry in &list.entries {
            let name = format!("user.{}", String::from_utf8_lossy(&entry.name));
            vfs.set_xattr(&path, &name, &entry.value)?;
        }
    }

    Ok(TransResponse::new(
        serialize(&SetInfoResponseParams::default())?,
        Vec::new(),
    ))
}
