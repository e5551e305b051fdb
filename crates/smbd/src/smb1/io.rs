//! Data-path handlers: READ/WRITE (AndX and core), SEEK and LOCKING_ANDX.

use std::io::Cursor;
use std::time::Duration;

use binrw::{BinRead, BinWrite};

use smbd_msg::file::{
    ReadCoreRequest, ReadCoreResponse, ReadRequest, ReadResponse, SeekMode, SeekRequest,
    SeekResponse, WriteCoreRequest, WriteCoreResponse, WriteRequest, WriteResponse,
};
use smbd_msg::lock::{LockingRequest, LockingResponse};

use crate::file::{FileLock, FileRef};
use crate::smb1::{AndXNext, RequestContext};
use crate::{Error, Result};

/// Upper bound of one READ_ANDX data block, fitting the large response
/// buffer with headroom for the word block.
const MAX_READ_SIZE: u32 = 61_440;

/// Poll interval while waiting out a lock conflict.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

fn lookup_fid(ctx: &RequestContext<'_>, fid: u16) -> Result<FileRef> {
    ctx.require_session()?
        .fid_table
        .lookup(fid)
        .ok_or(Error::InvalidHandle(fid))
}

pub fn handle_read_andx(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = ReadRequest::read(req)?;
    let file = lookup_fid(ctx, request.fid)?;
    if file.pipe.is_some() {
        return Err(Error::NotSupported("READ_ANDX on a pipe"));
    }
    if file.is_directory {
        return Err(Error::IsDirectory);
    }

    let tree = ctx.require_session()?.tree(file.tid)?;
    let count = request.full_count().min(MAX_READ_SIZE);
    let data = tree.vfs()?.read(&file, request.full_offset(), count)?;

    ReadResponse {
        andx: smbd_msg::AndX::none(),
        available: 0xFFFF,
        data,
    }
    .write(out)?;
    Ok(AndXNext::from_andx(&request.andx))
}

pub fn handle_write_andx(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = WriteRequest::read(req)?;
    let file = lookup_fid(ctx, request.fid)?;
    if file.pipe.is_some() {
        return Err(Error::NotSupported("WRITE_ANDX on a pipe"));
    }
    if !file.access.write_data() && !file.access.append_data() {
        return Err(Error::AccessDenied("handle lacks write access"));
    }

    let tree = ctx.require_session()?.tree(file.tid)?;
    let written = tree
        .vfs()?
        .write(&file, request.full_offset(), &request.data)?;

    WriteResponse {
        andx: smbd_msg::AndX::none(),
        count: (written & 0xFFFF) as u16,
        remaining: 0xFFFF,
        count_high: (written >> 16) as u16,
    }
    .write(out)?;
    Ok(AndXNext::from_andx(&request.andx))
}

pub fn handle_read_core(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = ReadCoreRequest::read(req)?;
    let file = lookup_fid(ctx, request.fid)?;
    let tree = ctx.require_session()?.tree(file.tid)?;
    let data = tree
        .vfs()?
        .read(&file, request.offset.into(), request.count.into())?;
    ReadCoreResponse { data }.write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_write_core(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = WriteCoreRequest::read(req)?;
    let file = lookup_fid(ctx, request.fid)?;
    if !file.access.write_data() && !file.access.append_data() {
        return Err(Error::AccessDenied("handle lacks write access"));
    }
    let tree = ctx.require_session()?.tree(file.tid)?;
    let vfs = tree.vfs()?;

    // A zero-length legacy write truncates at the offset.
    let written = if request.data.is_empty() {
        let attrs = crate::vfs::SetAttrs {
            size: Some(request.offset.into()),
            ..Default::default()
        };
        vfs.setattr(&file.host_path, Some(&file), &attrs)?;
        0
    } else {
        vfs.write(&file, request.offset.into(), &request.data)?
    };

    WriteCoreResponse {
        count: written as u16,
    }
    .write(out)?;
    Ok(AndXNext::Done)
}

pub fn handle_seek(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = SeekRequest::read(req)?;
    let file = lookup_fid(ctx, request.fid)?;

    let base: i64 = match request.mode {
        SeekMode::Start => 0,
        SeekMode::Current => file.inner.lock().unwrap().position as i64,
        SeekMode::End => {
            let meta = file.host_path.symlink_metadata()?;
            meta.len() as i64
        }
    };
    let target = base.saturating_add(request.offset.into()).max(0) as u64;
    file.inner.lock().unwrap().position = target;

    SeekResponse {
        offset: target.min(u32::MAX.into()) as u32,
    }
    .write(out)?;
    Ok(AndXNext::Done)
}

pub async fn handle_locking(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = LockingRequest::read(req)?;

    // An oplock break acknowledgement is one-way; no response goes out.
    if request.lock_type.oplock_release() {
        if let Ok(file) = lookup_fid(ctx, request.fid) {
            ctx.server.oplocks.break_to_level(
                file.inode_key(),
                match request.oplock_level {
                    0 => crate::oplock::OplockLevel::None,
                    _ => crate::oplock::OplockLevel::Level2,
                },
            );
        }
        ctx.no_response = true;
        return Ok(AndXNext::Done);
    }
    if request.lock_type.cancel_lock() {
        return Err(Error::NotSupported("LOCKING_ANDX cancel"));
    }

    let file = lookup_fid(ctx, request.fid)?;
    let (unlocks, locks) = request.ranges.to_large();
    let shared = request.lock_type.shared_lock();

    // Unlocks first, as the request orders them.
    for range in &unlocks {
        let removed = {
            let mut inner = file.inner.lock().unwrap();
            let before = inner.locks.len();
            inner.locks.retain(|lock| {
                !(lock.pid == range.pid
                    && lock.start == range.offset()
                    && lock.end == range.offset().saturating_add(range.length().saturating_sub(1)))
            });
            before != inner.locks.len()
        };
        if !removed {
            return Err(Error::RangeNotLocked);
        }
    }

    for range in &locks {
        if range.length() == 0 {
            continue;
        }
        let start = range.offset();
        let end = start.saturating_add(range.length() - 1);
        acquire_lock(ctx, &file, start, end, shared, range.pid, request.timeout).await?;
    }

    LockingResponse {
        andx: smbd_msg::AndX::none(),
    }
    .write(out)?;
    Ok(AndXNext::from_andx(&request.andx))
}

/// Tries to take one byte range, waiting out conflicts within the
/// client's timeout. Zero fails immediately; all-ones waits until
/// cancellation.
async fn acquire_lock(
    ctx: &RequestContext<'_>,
    file: &FileRef,
    start: u64,
    end: u64,
    shared: bool,
    pid: u16,
    timeout_ms: u32,
) -> Result<()> {
    let deadline = match timeout_ms {
        0 => None,
        u32::MAX => None,
        ms => Some(tokio::time::Instant::now() + Duration::from_millis(ms.into())),
    };

    loop {
        if try_lock(file, start, end, shared, pid)? {
            return Ok(());
        }
        if timeout_ms == 0 {
            return Err(Error::LockConflict(start, end));
        }
        if let Some(deadline) = deadline {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::LockConflict(start, end));
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(LOCK_RETRY_INTERVAL) => {}
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
        }
    }
}

/// One attempt: conflict scan over every handle of the inode, then
/// insertion into this handle's lock list.
fn try_lock(file: &FileRef, start: u64, end: u64, shared: bool, pid: u16) -> Result<bool> {
    for holder in file.master.open_files() {
        let inner = holder.inner.lock().unwrap();
        for lock in &inner.locks {
            if lock.overlaps(start, end) && !(lock.shared && shared) {
                return Ok(false);
            }
        }
    }
    file.inner.lock().unwrap().locks.push(FileLock {
        start,
        end,
        shared,
        pid,
    });
    Ok(true)
}
