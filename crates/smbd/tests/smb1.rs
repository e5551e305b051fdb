//! End-to-end dispatcher tests: framed SMB1 requests in, framed responses
//! out, over a real share in a temporary directory.

use std::io::Cursor;
use std::sync::Arc;

use binrw::{BinRead, BinWrite};
use tokio_util::sync::CancellationToken;

use smbd::auth::AcceptAllAuthenticator;
use smbd::config::{GlobalConfig, ServerConfig, ShareConfig, UserConfig};
use smbd::connection::Connection;
use smbd::idmap::UnixSidOracle;
use smbd::oplock::NullOplockBroker;
use smbd::pipe::NullPipeService;
use smbd::server::Collaborators;
use smbd::{Server, SigningPolicy};

use smbd_msg::create::{
    CloseRequest, CreateDisposition, CreateOptions, NtCreateFlags, NtCreateRequest,
    NtCreateResponse, ShareAccess,
};
use smbd_msg::file::{ReadRequest, ReadResponse, WriteRequest, WriteResponse};
use smbd_msg::lock::{LockRangeLarge, LockRanges, LockType, LockingRequest};
use smbd_msg::negotiate::{DIALECT_NT_LM_012, Dialect, NegotiateRequest, NegotiateResponse};
use smbd_msg::session_setup::{SessionSetupRequest, SessionSetupResponse};
use smbd_msg::trans::TransResponse;
use smbd_msg::trans2::{
    FindFirst2Params, FindFirst2ResponseParams, FindFlags, FindNext2Params,
    FindNext2ResponseParams, Trans2Request,
};
use smbd_msg::tree_connect::{SERVICE_ANY, TreeConnectFlags, TreeConnectRequest};
use smbd_msg::{AndX, Capabilities, Command, Header, HeaderFlags, HeaderFlags2, Status};
use smbd_fscc::{FileDispositionInfo, FindFileBothDirectoryInfo};

struct Harness {
    _root: tempfile::TempDir,
    server: Arc<Server>,
    conn: Arc<Connection>,
    mid: u16,
    uid: u16,
    tid: u16,
}

impl Harness {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut share = ShareConfig::new("share", root.path());
        share.guest_ok = true;
        let config = ServerConfig::new(GlobalConfig {
            server_signing: SigningPolicy::Disable,
            ..GlobalConfig::default()
        })
        .with_share(share)
        .with_user(UserConfig {
            name: "alice".into(),
            secret: vec![],
            uid: 1000,
            gid: 1000,
            is_guest: false,
        });
        let server = Server::new(
            config,
            Collaborators {
                auth: Arc::new(AcceptAllAuthenticator),
                idmap: Arc::new(UnixSidOracle),
                oplocks: Arc::new(NullOplockBroker),
                pipes: Arc::new(NullPipeService),
            },
        );
        let conn = Connection::new(server.clone(), "127.0.0.1".parse().unwrap());
        Harness {
            _root: root,
            server,
            conn,
            mid: 0,
            uid: 0,
            tid: 0,
        }
    }

    fn root(&self) -> &std::path::Path {
        self._root.path()
    }

    fn header(&mut self, command: Command) -> Header {
        self.mid += 1;
        Header {
            command: command as u8,
            status: 0,
            flags: HeaderFlags::new().with_caseless(true),
            flags2: HeaderFlags2::new().with_err_status(true).with_unicode(true),
            pid_high: 0,
            signature: [0; 8],
            tid: self.tid,
            pid_low: 1,
            uid: self.uid,
            mid: self.mid,
        }
    }

    /// Frames a request, runs it through the dispatcher, parses the
    /// response header and returns (status, body bytes after the header).
    async fn roundtrip<T>(&mut self, command: Command, content: &T) -> (Status, Vec<u8>)
    where
        T: for<'a> BinWrite<Args<'a> = (bool,)>,
    {
        let mut cursor = Cursor::new(Vec::new());
        self.header(command).write(&mut cursor).unwrap();
        content.write_le_args(&mut cursor, (true,)).unwrap();
        let raw = cursor.into_inner();

        let response = self
            .conn
            .handle_message(raw, CancellationToken::new())
            .await
            .expect("expected a response");
        let mut cursor = Cursor::new(response.as_slice());
        let header = Header::read(&mut cursor).unwrap();
        let status = Status::try_from(header.status).unwrap();
        if header.uid != 0 {
            self.uid = header.uid;
        }
        if header.tid != 0 {
            self.tid = header.tid;
        }
        (status, response[Header::STRUCT_SIZE..].to_vec())
    }

    async fn roundtrip_plain<T>(&mut self, command: Command, content: &T) -> (Status, Vec<u8>)
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        let mut cursor = Cursor::new(Vec::new());
        self.header(command).write(&mut cursor).unwrap();
        content.write_le(&mut cursor).unwrap();
        let raw = cursor.into_inner();

        let response = self
            .conn
            .handle_message(raw, CancellationToken::new())
            .await
            .expect("expected a response");
        let mut cursor = Cursor::new(response.as_slice());
        let header = Header::read(&mut cursor).unwrap();
        let status = Status::try_from(header.status).unwrap();
        (status, response[Header::STRUCT_SIZE..].to_vec())
    }

    /// Negotiate, authenticate and connect the test share.
    async fn establish(&mut self) {
        let (status, body) = self
            .roundtrip_plain(
                Command::Negotiate,
                &NegotiateRequest {
                    dialects: vec![Dialect::from(DIALECT_NT_LM_012)],
                },
            )
            .await;
        assert_eq!(status, Status::Success);
        let negotiate =
            NegotiateResponse::read_args(&mut Cursor::new(&body), (true,)).unwrap();
        assert_eq!(negotiate.dialect_index, 0);
        assert_eq!(negotiate.max_mpx_count, 1);
        assert_eq!(negotiate.encryption_key.len(), 8);

        let (status, body) = self
            .roundtrip(
                Command::SessionSetupAndx,
                &SessionSetupRequest {
                    andx: AndX::none(),
                    max_buffer_size: 0xFFFF,
                    max_mpx_count: 1,
                    vc_number: 0,
                    session_key: 0,
                    capabilities: Capabilities::new().with_unicode(true).with_nt_status(true),
                    case_insensitive_password: vec![],
                    case_sensitive_password: vec![0xab; 24],
                    account_name: "alice".into(),
                    primary_domain: "WORKGROUP".into(),
                    native_os: "Linux".into(),
                    native_lan_man: "test".into(),
                },
            )
            .await;
        assert_eq!(status, Status::Success);
        assert_eq!(self.uid, 1);
        let setup = SessionSetupResponse::read_args(&mut Cursor::new(&body), (true,)).unwrap();
        assert_eq!(setup.andx.command, smbd_msg::NO_MORE_ANDX_COMMAND);

        let (status, _) = self
            .roundtrip(
                Command::TreeConnectAndx,
                &TreeConnectRequest {
                    andx: AndX::none(),
                    flags: TreeConnectFlags::new(),
                    password: vec![0],
                    path: "\\\\srv\\share".into(),
                    service: SERVICE_ANY.into(),
                },
            )
            .await;
        assert_eq!(status, Status::Success);
        assert_ne!(self.tid, 0);
    }

    async fn nt_create(&mut self, name: &str, disposition: CreateDisposition) -> (Status, u16) {
        let (status, body) = self
            .roundtrip(
                Command::NtCreateAndx,
                &NtCreateRequest {
                    andx: AndX::none(),
                    flags: NtCreateFlags::new(),
                    root_directory_fid: 0,
                    desired_access: smbd_dtyp::security::AccessMask::new()
                        .with_generic_all(true),
                    allocation_size: 0,
                    ext_file_attributes: smbd_fscc::FileAttributes::new(),
                    share_access: ShareAccess::new().with_read(true).with_write(true),
                    create_disposition: disposition,
                    create_options: CreateOptions::new(),
                    impersonation_level: 2,
                    security_flags: 0,
                    file_name: name.into(),
                },
            )
            .await;
        if status != Status::Success {
            return (status, 0);
        }
        let response = NtCreateResponse::read(&mut Cursor::new(&body)).unwrap();
        (status, response.fid)
    }

    async fn write(&mut self, fid: u16, offset: u64, data: &[u8]) -> (Status, u16) {
        let (status, body) = self
            .roundtrip_plain(
                Command::WriteAndx,
                &WriteRequest {
                    andx: AndX::none(),
                    fid,
                    offset: offset as u32,
                    timeout: 0,
                    write_mode: smbd_msg::file::WriteMode::new(),
                    remaining: 0,
                    offset_high: None,
                    data: data.to_vec(),
                },
            )
            .await;
        if status != Status::Success {
            return (status, 0);
        }
        let response = WriteResponse::read(&mut Cursor::new(&body)).unwrap();
        (status, response.count)
    }

    async fn read(&mut self, fid: u16, offset: u64, count: u16) -> (Status, Vec<u8>) {
        let (status, body) = self
            .roundtrip_plain(
                Command::ReadAndx,
                &ReadRequest {
                    andx: AndX::none(),
                    fid,
                    offset: offset as u32,
                    max_count: count,
                    min_count: 0,
                    max_count_high: 0,
                    remaining: 0,
                    offset_high: None,
                },
            )
            .await;
        if status != Status::Success {
            return (status, Vec::new());
        }
        // The response data offset is header-relative; re-frame the body.
        let mut full = vec![0u8; Header::STRUCT_SIZE];
        full.extend_from_slice(&body);
        let mut cursor = Cursor::new(full.as_slice());
        cursor.set_position(Header::STRUCT_SIZE as u64);
        let response = ReadResponse::read(&mut cursor).unwrap();
        (status, response.data)
    }

    async fn close(&mut self, fid: u16) -> Status {
        let (status, _) = self
            .roundtrip_plain(
                Command::Close,
                &CloseRequest {
                    fid,
                    last_write_time: 0,
                },
            )
            .await;
        status
    }

    async fn trans2(&mut self, sub_command: u16, params: Vec<u8>) -> (Status, Vec<u8>) {
        let request = Trans2Request {
            total_parameter_count: params.len() as u16,
            total_data_count: 0,
            max_parameter_count: 64,
            max_data_count: 16384,
            max_setup_count: 0,
            flags: 0,
            timeout: 0,
            sub_command,
            params,
            data: vec![],
        };
        let mut cursor = Cursor::new(Vec::new());
        self.header(Command::Transaction2).write(&mut cursor).unwrap();
        request.write(&mut cursor).unwrap();
        let raw = cursor.into_inner();

        let response = self
            .conn
            .handle_message(raw, CancellationToken::new())
            .await
            .expect("expected a response");
        let header = Header::read(&mut Cursor::new(response.as_slice())).unwrap();
        let status = Status::try_from(header.status).unwrap();
        if status != Status::Success {
            return (status, Vec::new());
        }
        (status, response)
    }
}

fn serialize_unicode<T>(value: &T) -> Vec<u8>
where
    T: for<'a> BinWrite<Args<'a> = (bool,)>,
{
    let mut cursor = Cursor::new(Vec::new());
    value.write_le_args(&mut cursor, (true,)).unwrap();
    cursor.into_inner()
}

/// Parses a TransResponse out of a full response message buffer.
fn parse_trans(full: &[u8]) -> TransResponse {
    let mut cursor = Cursor::new(full);
    cursor.set_position(Header::STRUCT_SIZE as u64);
    TransResponse::read(&mut cursor).unwrap()
}

#[tokio::test]
async fn test_negotiate_setup_tree_connect() {
    let mut harness = Harness::new();
    harness.establish().await;
}

#[tokio::test]
async fn test_create_write_read_close_round_trip() {
    let mut harness = Harness::new();
    harness.establish().await;

    let (status, fid) = harness
        .nt_create("\\file.txt", CreateDisposition::OpenIf)
        .await;
    assert_eq!(status, Status::Success);
    assert_eq!(fid, 1);

    let (status, count) = harness.write(fid, 0, b"HELLO").await;
    assert_eq!(status, Status::Success);
    assert_eq!(count, 5);

    let (status, data) = harness.read(fid, 0, 16).await;
    assert_eq!(status, Status::Success);
    assert_eq!(data, b"HELLO");

    assert_eq!(harness.close(fid).await, Status::Success);

    // The closed FID answers INVALID_HANDLE, never stale data.
    let (status, _) = harness.read(fid, 0, 16).await;
    assert_eq!(status, Status::InvalidHandle);
}

#[tokio::test]
async fn test_zero_byte_read() {
    let mut harness = Harness::new();
    harness.establish().await;
    let (_, fid) = harness
        .nt_create("\\empty.txt", CreateDisposition::OpenIf)
        .await;
    let (status, data) = harness.read(fid, 0, 0).await;
    assert_eq!(status, Status::Success);
    assert!(data.is_empty());
}

#[tokio::test]
async fn test_create_collision_and_missing() {
    let mut harness = Harness::new();
    harness.establish().await;

    let (status, fid) = harness.nt_create("\\a.txt", CreateDisposition::Create).await;
    assert_eq!(status, Status::Success);
    harness.close(fid).await;

    let (status, _) = harness.nt_create("\\a.txt", CreateDisposition::Create).await;
    assert_eq!(status, Status::ObjectNameCollision);

    let (status, _) = harness.nt_create("\\nope.txt", CreateDisposition::Open).await;
    assert_eq!(status, Status::ObjectNameNotFound);
}

#[tokio::test]
async fn test_delete_on_close_across_two_handles() {
    let mut harness = Harness::new();
    harness.establish().await;

    let (_, fid1) = harness
        .nt_create("\\doomed.txt", CreateDisposition::OpenIf)
        .await;
    let (_, fid2) = harness
        .nt_create("\\doomed.txt", CreateDisposition::Open)
        .await;

    // DISPOSITION_INFO with DeletePending through SET_FILE_INFORMATION.
    let mut params = Vec::new();
    params.extend_from_slice(&fid1.to_le_bytes());
    params.extend_from_slice(&0x0102u16.to_le_bytes());
    params.extend_from_slice(&0u16.to_le_bytes());
    let request = Trans2Request {
        total_parameter_count: params.len() as u16,
        total_data_count: 1,
        max_parameter_count: 16,
        max_data_count: 0,
        max_setup_count: 0,
        flags: 0,
        timeout: 0,
        sub_command: 0x0008,
        params,
        data: {
            let mut cursor = Cursor::new(Vec::new());
            FileDispositionInfo {
                delete_pending: true.into(),
            }
            .write(&mut cursor)
            .unwrap();
            cursor.into_inner()
        },
    };
    let mut cursor = Cursor::new(Vec::new());
    harness
        .header(Command::Transaction2)
        .write(&mut cursor)
        .unwrap();
    request.write(&mut cursor).unwrap();
    let response = harness
        .conn
        .handle_message(cursor.into_inner(), CancellationToken::new())
        .await
        .unwrap();
    let header = Header::read(&mut Cursor::new(response.as_slice())).unwrap();
    assert_eq!(Status::try_from(header.status).unwrap(), Status::Success);

    let target = harness.root().join("doomed.txt");
    harness.close(fid1).await;
    assert!(target.exists(), "file must survive while fid2 is open");
    harness.close(fid2).await;
    assert!(!target.exists(), "file unlinks when the last open drops");
}

#[tokio::test]
async fn test_find_first_pattern_and_resume() {
    let mut harness = Harness::new();
    harness.establish().await;
    for name in ["A.TXT", "B.TXT", "C.TXT"] {
        std::fs::write(harness.root().join(name), b"x").unwrap();
    }
    std::fs::write(harness.root().join("skip.dat"), b"x").unwrap();

    let params = serialize_unicode(&FindFirst2Params {
        search_attributes: 0x16,
        search_count: 2,
        flags: FindFlags::new(),
        information_level: 0x0104,
        search_storage_type: 0,
        file_name: "\\*.TXT".into(),
    });
    let (status, full) = harness.trans2(0x0001, params).await;
    assert_eq!(status, Status::Success);
    let trans = parse_trans(&full);
    let first = FindFirst2ResponseParams::read(&mut Cursor::new(&trans.params)).unwrap();
    assert_eq!(first.search_count, 2);
    assert_eq!(first.end_of_search, 0);
    assert_ne!(first.last_name_offset, 0);

    // Entries parse at the declared layout.
    let entry = FindFileBothDirectoryInfo::read_args(
        &mut Cursor::new(&trans.data[4..]),
        (true,),
    )
    .unwrap();
    assert!(entry.file_name.as_str().ends_with(".TXT"));

    let params = serialize_unicode(&FindNext2Params {
        sid: first.sid,
        search_count: 10,
        information_level: 0x0104,
        resume_key: 0,
        flags: FindFlags::new().with_continue_from_last(true),
        file_name: "\\*.TXT".into(),
    });
    let (status, full) = harness.trans2(0x0002, params).await;
    assert_eq!(status, Status::Success);
    let trans = parse_trans(&full);
    let next = FindNext2ResponseParams::read(&mut Cursor::new(&trans.params)).unwrap();
    assert_eq!(next.search_count, 1);
    assert_eq!(next.end_of_search, 1);

    // The exhausted search reports NO_MORE_FILES.
    let params = serialize_unicode(&FindNext2Params {
        sid: first.sid,
        search_count: 10,
        information_level: 0x0104,
        resume_key: 0,
        flags: FindFlags::new().with_continue_from_last(true),
        file_name: "\\*.TXT".into(),
    });
    let (status, _) = harness.trans2(0x0002, params).await;
    assert_eq!(status, Status::NoMoreFiles);
}

#[tokio::test]
async fn test_lock_conflict_between_handles() {
    let mut harness = Harness::new();
    harness.establish().await;

    let (_, fid1) = harness
        .nt_create("\\locked.txt", CreateDisposition::OpenIf)
        .await;
    harness.write(fid1, 0, b"0123456789").await;
    let (_, fid2) = harness
        .nt_create("\\locked.txt", CreateDisposition::Open)
        .await;

    // FID 1 takes an exclusive lock over [0,9].
    let (status, _) = harness
        .roundtrip_plain(
            Command::LockingAndx,
            &LockingRequest {
                andx: AndX::none(),
                lock_type: LockType::new().with_large_files(true),
                oplock_level: 0,
                timeout: 0,
                ranges: LockRanges::Large {
                    unlocks: vec![],
                    locks: vec![LockRangeLarge {
                        pid: 1,
                        offset_high: 0,
                        offset_low: 0,
                        length_high: 0,
                        length_low: 10,
                    }],
                },
            },
        )
        .await;
    assert_eq!(status, Status::Success);

    // A read through FID 2 inside the locked range conflicts.
    let (status, _) = harness.read(fid2, 5, 2).await;
    assert_eq!(status, Status::FileLockConflict);

    // Outside the range it succeeds.
    let (status, _) = harness.read(fid2, 10, 0).await;
    assert_eq!(status, Status::Success);
}

#[tokio::test]
async fn test_logoff_invalidates_fids() {
    let mut harness = Harness::new();
    harness.establish().await;
    let (_, fid) = harness
        .nt_create("\\f.txt", CreateDisposition::OpenIf)
        .await;

    let (status, _) = harness
        .roundtrip_plain(
            Command::LogoffAndx,
            &smbd_msg::session_setup::LogoffRequest { andx: AndX::none() },
        )
        .await;
    assert_eq!(status, Status::Success);

    // The session is gone; quoting the old FID fails at session lookup.
    let (status, _) = harness.read(fid, 0, 4).await;
    assert_eq!(status, Status::SmbBadUid);
    assert!(harness.server.sessions.lookup(1).is_err());
}

#[tokio::test]
async fn test_nt_cancel_unknown_mid_is_noop() {
    let mut harness = Harness::new();
    harness.establish().await;
    harness.conn.cancel_by_mid(0x7777);
    // The connection still serves requests afterwards.
    let (status, _) = harness
        .nt_create("\\still-alive.txt", CreateDisposition::OpenIf)
        .await;
    assert_eq!(status, Status::Success);
}

#[tokio::test]
async fn test_andx_chain_setup_then_tree_connect() {
    let mut harness = Harness::new();
    // Negotiate first, alone.
    let (status, _) = harness
        .roundtrip_plain(
            Command::Negotiate,
            &NegotiateRequest {
                dialects: vec![Dialect::from(DIALECT_NT_LM_012)],
            },
        )
        .await;
    assert_eq!(status, Status::Success);

    let make_setup = |andx: AndX| SessionSetupRequest {
        andx,
        max_buffer_size: 0xFFFF,
        max_mpx_count: 1,
        vc_number: 0,
        session_key: 0,
        capabilities: Capabilities::new().with_unicode(true).with_nt_status(true),
        case_insensitive_password: vec![],
        case_sensitive_password: vec![0xab; 24],
        account_name: "alice".into(),
        primary_domain: "WORKGROUP".into(),
        native_os: "Linux".into(),
        native_lan_man: "test".into(),
    };

    // Measure the setup block to compute the chained block's offset.
    let setup_len = serialize_unicode(&make_setup(AndX::none())).len();
    let chained_offset = (Header::STRUCT_SIZE + setup_len) as u16;

    let mut cursor = Cursor::new(Vec::new());
    harness
        .header(Command::SessionSetupAndx)
        .write(&mut cursor)
        .unwrap();
    make_setup(AndX {
        command: Command::TreeConnectAndx as u8,
        offset: chained_offset,
    })
    .write_le_args(&mut cursor, (true,))
    .unwrap();
    TreeConnectRequest {
        andx: AndX::none(),
        flags: TreeConnectFlags::new(),
        password: vec![0],
        path: "\\\\srv\\share".into(),
        service: SERVICE_ANY.into(),
    }
    .write_le_args(&mut cursor, (true,))
    .unwrap();

    let response = harness
        .conn
        .handle_message(cursor.into_inner(), CancellationToken::new())
        .await
        .unwrap();

    let mut parse = Cursor::new(response.as_slice());
    let header = Header::read(&mut parse).unwrap();
    assert_eq!(Status::try_from(header.status).unwrap(), Status::Success);
    assert_ne!(header.uid, 0, "chained setup must mint a UID");
    assert_ne!(header.tid, 0, "chained tree connect must mint a TID");

    // The response chain links setup -> tree connect and terminates.
    let setup = SessionSetupResponse::read_args(&mut parse, (true,)).unwrap();
    assert_eq!(setup.andx.command, Command::TreeConnectAndx as u8);
    parse.set_position(setup.andx.offset.into());
    let tree =
        smbd_msg::tree_connect::TreeConnectResponse::read_args(&mut parse, (true,)).unwrap();
    assert_eq!(tree.andx.command, smbd_msg::NO_MORE_ANDX_COMMAND);
    assert_eq!(tree.service.as_str(), "A:");
}

#[tokio::test]
async fn test_unknown_command_answers_bad_command() {
    let mut harness = Harness::new();
    harness.establish().await;

    let mut cursor = Cursor::new(Vec::new());
    let mut header = harness.header(Command::Echo);
    header.command = 0xEE;
    header.write(&mut cursor).unwrap();
    cursor.get_mut().extend_from_slice(&[0, 0, 0]);
    let response = harness
        .conn
        .handle_message(cursor.into_inner(), CancellationToken::new())
        .await
        .unwrap();
    let parsed = Header::read(&mut Cursor::new(response.as_slice())).unwrap();
    assert_eq!(parsed.status, Status::SmbBadCommand as u32);
}
