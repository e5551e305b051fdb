//! One TCP peer: the frame pump, the per-request dispatcher harness,
//! signing hooks, cancellation bookkeeping and teardown.

use std::io::Cursor;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use binrw::{BinRead, BinWrite};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use smbd_msg::{Command, Header, Status, tree_connect::EmptyBody};

use crate::netbios;
use crate::server::Server;
use crate::session::{Session, SessionState};
use crate::smb1::{self, AndXNext, RequestContext};
use crate::{Error, Result};

/// Offset of the status field inside the SMB1 header.
const STATUS_OFFSET: usize = 5;
/// Offset of the signature field inside the SMB1 header.
const SIGNATURE_OFFSET: usize = 14;

/// Default response buffer; large commands get [`LARGE_RESPONSE_CAPACITY`].
const SMALL_RESPONSE_CAPACITY: usize = 4096;
const LARGE_RESPONSE_CAPACITY: usize = 0x1_0000;

/// An in-flight request, findable by MID for NT_CANCEL.
pub struct PendingRequest {
    pub mid: u16,
    pub cancel: CancellationToken,
    pub suppress_response: Arc<AtomicBool>,
}

/// Per-connection state.
pub struct Connection {
    pub server: Arc<Server>,
    pub peer: IpAddr,
    /// Challenge minted by NEGOTIATE, consumed by SESSION_SETUP.
    pub challenge: Mutex<Option<[u8; 8]>>,
    /// Dialect index agreed in NEGOTIATE; SMB1 keeps exactly one session
    /// active (multiplex count 1), more may linger through logoff races.
    pub session_uids: Mutex<Vec<u16>>,
    pending: Mutex<Vec<Arc<PendingRequest>>>,
}

impl Connection {
    pub fn new(server: Arc<Server>, peer: IpAddr) -> Arc<Self> {
        Arc::new(Connection {
            server,
            peer,
            challenge: Mutex::new(None),
            session_uids: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Drives the connection until the peer closes or shutdown fires.
    pub async fn serve(
        self: Arc<Self>,
        stream: TcpStream,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let (reader, writer) = stream.into_split();
        let result = self
            .clone()
            .pump(reader, writer, shutdown.child_token())
            .await;
        shutdown.cancel();
        self.teardown().await;
        result
    }

    async fn pump<R, W>(
        self: Arc<Self>,
        mut reader: R,
        mut writer: W,
        shutdown: CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<u8>>(16);
        let write_task = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                if let Err(e) = netbios::write_frame(&mut writer, &response).await {
                    log::warn!("send failed: {e}");
                    break;
                }
            }
        });

        loop {
            let frame = tokio::select! {
                frame = netbios::read_frame(&mut reader) => frame?,
                _ = shutdown.cancelled() => None,
            };
            let Some(frame) = frame else {
                break;
            };

            let connection = self.clone();
            let tx = tx.clone();
            let cancel = shutdown.child_token();
            tokio::spawn(async move {
                if let Some(response) = connection.handle_message(frame, cancel).await {
                    if !response.is_empty() {
                        let _ = tx.send(response).await;
                    }
                }
            });
        }

        drop(tx);
        let _ = write_task.await;
        Ok(())
    }

    /// Handles one framed SMB message; `None` means no response is sent
    /// (unparseable header, signing mismatch, or a cancelled request).
    pub async fn handle_message(
        self: &Arc<Self>,
        raw: Vec<u8>,
        cancel: CancellationToken,
    ) -> Option<Vec<u8>> {
        let header = match Header::read(&mut Cursor::new(&raw)) {
            Ok(header) => header,
            Err(e) => {
                log::debug!("dropping message with bad header: {e}");
                return None;
            }
        };
        if header.flags.response() {
            return None;
        }

        let session = self.server.sessions.lookup(header.uid).ok();
        if let Some(session) = &session {
            if session.state() == SessionState::NeedReconnect
                && header.command().ok() != Some(Command::LogoffAndx)
            {
                return Some(error_response(&header, Status::UserSessionDeleted));
            }
            session.begin_request();
        }

        let pending = Arc::new(PendingRequest {
            mid: header.mid,
            cancel: cancel.clone(),
            suppress_response: Arc::new(AtomicBool::new(false)),
        });
        self.pending.lock().unwrap().push(pending.clone());

        let response = self
            .dispatch_request(&header, &raw, session.clone(), cancel)
            .await;

        self.pending
            .lock()
            .unwrap()
            .retain(|entry| !Arc::ptr_eq(entry, &pending));
        if let Some(session) = &session {
            session.end_request();
        }

        if pending.suppress_response.load(Ordering::Acquire) {
            // The reply slot is never sent; keep signing aligned. A
            // handler that already reported no-response compensated
            // itself.
            if response.is_some() {
                if let Some(session) = &session {
                    if session.is_signed() {
                        session.compensate_sequence();
                    }
                }
            }
            return None;
        }
        response
    }

    async fn dispatch_request(
        self: &Arc<Self>,
        header: &Header,
        raw: &[u8],
        session: Option<Arc<Session>>,
        cancel: CancellationToken,
    ) -> Option<Vec<u8>> {
        let command = match header.command() {
            Ok(command) => command,
            Err(_) => {
                log::debug!("unknown command {:#04x}", header.command);
                return Some(error_response(header, Status::SmbBadCommand));
            }
        };

        // Signing verification. SESSION_SETUP carries the first signed
        // exchange and is verified by the authenticator itself.
        let mut sequence_pair = None;
        if let Some(session) = &session {
            if session.is_signed() && command != Command::SessionSetupAndx {
                let pair = session.next_sequence_pair();
                sequence_pair = Some(pair);
                if header.flags2.security_signature() {
                    let mut unsigned = raw.to_vec();
                    unsigned[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 8].fill(0);
                    let expected =
                        self.server
                            .auth
                            .sign(&session.signing_key, pair.0, &[&unsigned]);
                    if expected != header.signature {
                        log::warn!("signature mismatch on mid {}, dropping", header.mid);
                        return None;
                    }
                }
            }
        }

        let mut ctx = RequestContext {
            server: &self.server,
            conn: self,
            header,
            unicode: header.flags2.unicode(),
            caseless: header.flags.caseless(),
            session,
            cancel,
            no_response: false,
        };

        let mut out = Cursor::new(Vec::with_capacity(response_capacity(command, raw)));
        let response_header = Header::response_to(header, Status::Success);
        if response_header.write(&mut out).is_err() {
            return None;
        }

        // The AndX chain walk: blocks are framed contiguously into one
        // reply; each handler reports whether the request chains on.
        let mut req_cursor = Cursor::new(raw);
        req_cursor.set_position(Header::STRUCT_SIZE as u64);
        let mut current = command;
        let mut previous_block: Option<u64> = None;
        let mut status = Status::Success;

        loop {
            let block_start = out.position();
            if let Some(prev) = previous_block {
                patch_andx(out.get_mut(), prev, current as u8, block_start as u16);
            }

            match smb1::dispatch_one(&mut ctx, current, &mut req_cursor, &mut out).await {
                Ok(AndXNext::Done) => break,
                Ok(AndXNext::Chain {
                    command: next_command,
                    offset,
                }) => {
                    let Ok(next) = Command::try_from(next_command) else {
                        status = Status::SmbBadCommand;
                        break;
                    };
                    if offset as usize >= raw.len() {
                        status = Status::InvalidParameter;
                        break;
                    }
                    previous_block = Some(block_start);
                    current = next;
                    req_cursor.set_position(offset.into());
                }
                Err(Error::Cancelled) => {
                    // Cancellation suppresses the response entirely.
                    return None;
                }
                Err(e) => {
                    status = e.status();
                    log::debug!("{current} failed: {e}");
                    out.get_mut().truncate(block_start as usize);
                    out.set_position(block_start);
                    let _ = EmptyBody::default().write(&mut out);
                    break;
                }
            }
        }

        if ctx.no_response {
            if let Some(session) = &ctx.session {
                if session.is_signed() {
                    session.compensate_sequence();
                }
            }
            return None;
        }

        let mut response = out.into_inner();
        response[STATUS_OFFSET..STATUS_OFFSET + 4]
            .copy_from_slice(&(status as u32).to_le_bytes());

        // Stamp the outgoing MAC over the full framed response.
        if let (Some(session), Some((_, response_seq))) = (&ctx.session, sequence_pair) {
            if session.is_signed() {
                let mac = self
                    .server
                    .auth
                    .sign(&session.signing_key, response_seq, &[&response]);
                response[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 8].copy_from_slice(&mac);
            }
        }
        Some(response)
    }

    /// NT_CANCEL: marks the matching in-flight request so its response is
    /// suppressed, and pokes its cancellation token. A miss is a no-op.
    pub fn cancel_by_mid(&self, mid: u16) {
        let pending = self.pending.lock().unwrap();
        for request in pending.iter() {
            if request.mid == mid {
                request.suppress_response.store(true, Ordering::Release);
                request.cancel.cancel();
                log::debug!("cancelled in-flight mid {mid}");
                return;
            }
        }
        log::debug!("NT_CANCEL for unknown mid {mid}, ignoring");
    }

    /// Attaches a freshly authenticated session to this connection.
    pub fn attach_session(&self, session: &Arc<Session>) {
        self.session_uids.lock().unwrap().push(session.uid);
    }

    pub fn detach_session(&self, uid: u16) {
        self.session_uids.lock().unwrap().retain(|s| *s != uid);
    }

    /// Connection teardown: every session still attached is logged off the
    /// hard way, with durable snapshots refreshed first.
    pub async fn teardown(&self) {
        let uids: Vec<u16> = self.session_uids.lock().unwrap().drain(..).collect();
        for uid in uids {
            if let Some(session) = self.server.sessions.remove(uid) {
                session.set_state(SessionState::NeedReconnect);
                smb1::teardown_session(&self.server, &session).await;
            }
        }
    }
}

/// Picks the response buffer size class for a command; the known-large
/// producers get the big pool up front.
fn response_capacity(command: Command, raw: &[u8]) -> usize {
    match command {
        Command::Transaction2 | Command::Transaction | Command::NtTransact => {
            LARGE_RESPONSE_CAPACITY
        }
        Command::ReadAndx | Command::Read => LARGE_RESPONSE_CAPACITY,
        Command::Echo if raw.len() > SMALL_RESPONSE_CAPACITY / 2 => LARGE_RESPONSE_CAPACITY,
        _ => SMALL_RESPONSE_CAPACITY,
    }
}

/// Frames an empty-body response with an error status.
pub fn error_response(request: &Header, status: Status) -> Vec<u8> {
    let mut out = Cursor::new(Vec::with_capacity(Header::STRUCT_SIZE + 3));
    let header = Header::response_to(request, status);
    if let Err(e) = header
        .write(&mut out)
        .and_then(|_| EmptyBody::default().write(&mut out))
    {
        // Writing fixed structs into memory cannot run out of space; a
        // failure here is a codec bug worth surfacing loudly.
        log::error!("error-response framing failed: {e}");
        return Vec::new();
    }
    out.into_inner()
}

/// Patches the AndX linkage of an already-written response block.
fn patch_andx(buffer: &mut [u8], block_start: u64, command: u8, offset: u16) {
    let base = block_start as usize;
    // Word block: [word_count][andx_command][andx_reserved][andx_offset].
    buffer[base + 1] = command;
    buffer[base + 3..base + 5].copy_from_slice(&offset.to_le_bytes());
}
