//! SMB1 Message Header and related types.

use std::io::Cursor;

use binrw::prelude::*;
use modular_bitfield::prelude::*;
use smbd_msg_derive::smb_message_binrw;

/// SMB1 protocol command codes.
///
/// Reference: MS-CIFS 2.2.2.1
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Command {
    CreateDirectory = 0x00,
    DeleteDirectory = 0x01,
    Close = 0x04,
    Flush = 0x05,
    Delete = 0x06,
    Rename = 0x07,
    QueryInformation = 0x08,
    SetInformation = 0x09,
    Read = 0x0A,
    Write = 0x0B,
    CheckDirectory = 0x10,
    ProcessExit = 0x11,
    Seek = 0x12,
    LockingAndx = 0x24,
    Transaction = 0x25,
    Echo = 0x2B,
    OpenAndx = 0x2D,
    ReadAndx = 0x2E,
    WriteAndx = 0x2F,
    Transaction2 = 0x32,
    FindClose2 = 0x34,
    TreeDisconnect = 0x71,
    Negotiate = 0x72,
    SessionSetupAndx = 0x73,
    LogoffAndx = 0x74,
    TreeConnectAndx = 0x75,
    NtTransact = 0xA0,
    NtCreateAndx = 0xA2,
    NtCancel = 0xA4,
    NtRename = 0xA5,
}

impl TryFrom<u8> for Command {
    type Error = crate::SmbMsgError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Command::*;
        Ok(match value {
            0x00 => CreateDirectory,
            0x01 => DeleteDirectory,
            0x04 => Close,
            0x05 => Flush,
            0x06 => Delete,
            0x07 => Rename,
            0x08 => QueryInformation,
            0x09 => SetInformation,
            0x0A => Read,
            0x0B => Write,
            0x10 => CheckDirectory,
            0x11 => ProcessExit,
            0x12 => Seek,
            0x24 => LockingAndx,
            0x25 => Transaction,
            0x2B => Echo,
            0x2D => OpenAndx,
            0x2E => ReadAndx,
            0x2F => WriteAndx,
            0x32 => Transaction2,
            0x34 => FindClose2,
            0x71 => TreeDisconnect,
            0x72 => Negotiate,
            0x73 => SessionSetupAndx,
            0x74 => LogoffAndx,
            0x75 => TreeConnectAndx,
            0xA0 => NtTransact,
            0xA2 => NtCreateAndx,
            0xA4 => NtCancel,
            0xA5 => NtRename,
            other => return Err(crate::SmbMsgError::UnknownCommand(other)),
        })
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message_as_string = match self {
            Command::CreateDirectory => "Create Directory",
            Command::DeleteDirectory => "Delete Directory",
            Command::Close => "Close",
            Command::Flush => "Flush",
            Command::Delete => "Delete",
            Command::Rename => "Rename",
            Command::QueryInformation => "Query Information",
            Command::SetInformation => "Set Information",
            Command::Read => "Read",
            Command::Write => "Write",
            Command::CheckDirectory => "Check Directory",
            Command::ProcessExit => "Process Exit",
            Command::Seek => "Seek",
            Command::LockingAndx => "Locking AndX",
            Command::Transaction => "Transaction",
            Command::Echo => "Echo",
            Command::OpenAndx => "Open AndX",
            Command::ReadAndx => "Read AndX",
            Command::WriteAndx => "Write AndX",
            Command::Transaction2 => "Transaction2",
            Command::FindClose2 => "Find Close2",
            Command::TreeDisconnect => "Tree Disconnect",
            Command::Negotiate => "Negotiate",
            Command::SessionSetupAndx => "Session Setup AndX",
            Command::LogoffAndx => "Logoff AndX",
            Command::TreeConnectAndx => "Tree Connect AndX",
            Command::NtTransact => "NT Transact",
            Command::NtCreateAndx => "NT Create AndX",
            Command::NtCancel => "NT Cancel",
            Command::NtRename => "NT Rename",
        };
        write!(f, "{} ({:#04x})", message_as_string, *self as u8)
    }
}

macro_rules! make_status {
    (
        $($name:ident = $value:literal: $description:literal, )+
    ) => {

/// NT Status codes for SMB.
///
/// For each status code, a U32 constant is also provided for easier access.
/// for example, [`Status::U32_ACCESS_DENIED`] is `0xC0000022`, matching [`Status::AccessDenied`].
#[smb_message_binrw]
#[derive(Clone, Copy)]
#[repr(u32)]
#[brw(repr(u32))]
pub enum Status {
    $(
        #[doc = concat!($description, " (", stringify!($value), ")")]
        $name = $value,
    )+
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message_as_string = match self {
            $(
                Status::$name => $description,
            )+
        };
        write!(f, "{} ({:#x})", message_as_string, *self as u32)
    }
}

impl Status {
    // Consts for easier status code as u32 access.
    pastey::paste! {
        $(
            #[doc = concat!("[`", stringify!($name), "`][Self::", stringify!($name), "] as u32")]
            pub const [<U32_ $name:snake:upper>]: u32 = $value;
        )+
    }

    /// Whether this status reports success (including warnings).
    pub fn is_success(&self) -> bool {
        (*self as u32) >> 30 < 2
    }
}

impl TryFrom<u32> for Status {
    type Error = crate::SmbMsgError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Status::read_le(&mut Cursor::new(value.to_le_bytes()))
            .map_err(|_| Self::Error::MissingErrorCodeDefinition(value))
    }
}
    };
}

make_status! {
    Success = 0x00000000: "Success",
    SmbBadTid = 0x00050002: "SMB Bad TID",
    SmbBadCommand = 0x00160002: "SMB Bad Command",
    SmbBadUid = 0x005B0002: "SMB Bad UID",
    SmbUseStandard = 0x00FB0002: "SMB Use Standard",
    BufferOverflow = 0x80000005: "Buffer Overflow",
    NoMoreFiles = 0x80000006: "No More Files",
    NotImplemented = 0xC0000002: "Not Implemented",
    InvalidInfoClass = 0xC0000003: "Invalid Info Class",
    InvalidHandle = 0xC0000008: "Invalid Handle",
    InvalidParameter = 0xC000000D: "Invalid Parameter",
    NoSuchFile = 0xC000000F: "No Such File",
    InvalidDeviceRequest = 0xC0000010: "Invalid Device Request",
    EndOfFile = 0xC0000011: "End of File",
    MoreProcessingRequired = 0xC0000016: "More Processing Required",
    NoMemory = 0xC0000017: "No Memory",
    AccessDenied = 0xC0000022: "Access Denied",
    BufferTooSmall = 0xC0000023: "Buffer Too Small",
    ObjectNameInvalid = 0xC0000033: "Object Name Invalid",
    ObjectNameNotFound = 0xC0000034: "Object Name Not Found",
    ObjectNameCollision = 0xC0000035: "Object Name Collision",
    ObjectPathNotFound = 0xC000003A: "Object Path Not Found",
    SharingViolation = 0xC0000043: "Sharing Violation",
    NoEasOnFile = 0xC0000044: "No EAs on File",
    FileLockConflict = 0xC0000054: "File Lock Conflict",
    LockNotGranted = 0xC0000055: "Lock Not Granted",
    DeletePending = 0xC0000056: "Delete Pending",
    LogonFailure = 0xC000006D: "Logon Failure",
    RangeNotLocked = 0xC000007E: "Range Not Locked",
    DiskFull = 0xC000007F: "Disk Full",
    InsufficientResources = 0xC000009A: "Insufficient Resources",
    IoTimeout = 0xC00000B5: "I/O Timeout",
    FileIsADirectory = 0xC00000BA: "File is a Directory",
    NotSupported = 0xC00000BB: "Not Supported",
    NetworkAccessDenied = 0xC00000CA: "Network Access Denied",
    BadNetworkName = 0xC00000CC: "Bad Network Name",
    RequestNotAccepted = 0xC00000D0: "Request Not Accepted",
    NotSameDevice = 0xC00000D4: "Not Same Device",
    OplockNotGranted = 0xC00000E2: "Oplock Not Granted",
    DirectoryNotEmpty = 0xC0000101: "Directory Not Empty",
    NotADirectory = 0xC0000103: "Not a Directory",
    TooManyOpenedFiles = 0xC000011F: "Too Many Opened Files",
    Cancelled = 0xC0000120: "Cancelled",
    CannotDelete = 0xC0000121: "Cannot Delete",
    FileClosed = 0xC0000128: "File Closed",
    UserSessionDeleted = 0xC0000203: "User Session Deleted",
}

/// SMB1 header flags.
///
/// Reference: MS-CIFS 2.2.3.1
#[smbd_dtyp::mbitfield]
#[repr(u8)]
pub struct HeaderFlags {
    /// The server supports LOCK_AND_READ/WRITE_AND_UNLOCK.
    pub lock_and_read_ok: bool,
    /// Obsolete send-no-ack hint.
    pub buf_avail: bool,
    #[skip]
    __: bool,
    /// Pathnames are to be treated as case-insensitive.
    pub caseless: bool,

    /// Pathnames arrive in canonicalized form.
    pub canonicalized_paths: bool,
    /// Obsolete oplock request bit of the deprecated open commands.
    pub oplock: bool,
    /// Obsolete batch-oplock request bit of the deprecated open commands.
    pub batch_oplock: bool,
    /// Message is a server response.
    pub response: bool,
}

/// SMB1 header flags2.
///
/// Reference: MS-CIFS 2.2.3.1
#[smbd_dtyp::mbitfield]
pub struct HeaderFlags2 {
    /// The client understands long file names.
    pub long_names_allowed: bool,
    /// The client understands extended attributes.
    pub knows_eas: bool,
    /// The message carries a security signature.
    pub security_signature: bool,
    #[skip]
    __: bool,

    /// The client requires security signatures.
    pub security_signature_required: bool,
    #[skip]
    __: bool,
    /// Any pathname in this message is a long name.
    pub is_long_name: bool,
    #[skip]
    __: B4,

    /// Extended security negotiation is supported.
    pub extended_security: bool,
    /// Pathnames should be resolved through DFS.
    pub dfs: bool,
    /// Paging I/O: read permission implied by execute.
    pub paging_io: bool,
    /// The Status field carries 32-bit NT status codes.
    pub err_status: bool,
    /// Strings in this message are UTF-16LE.
    pub unicode: bool,
}

/// SMB1 Packet Header, 32 bytes including the protocol marker.
///
/// The command is kept as a raw octet so a request with an unknown code can
/// still be answered with a well-formed error header; see
/// [`Command::try_from`].
///
/// Reference: MS-CIFS 2.2.3.1
#[smb_message_binrw]
#[derive(Clone)]
#[brw(little, magic(b"\xffSMB"))]
pub struct Header {
    /// Command code; see [`Command`].
    pub command: u8,
    /// 32-bit NT status, or a DOS class/code pair when
    /// [`HeaderFlags2::err_status`] is clear.
    pub status: u32,
    pub flags: HeaderFlags,
    pub flags2: HeaderFlags2,
    /// High-order bytes of the process id, for large PID values.
    pub pid_high: u16,
    /// Message signature, when signing is active.
    pub signature: [u8; 8],
    reserved: u16,
    /// Tree identifier of the connected share.
    pub tid: u16,
    pub pid_low: u16,
    /// Session (user) identifier.
    pub uid: u16,
    /// Multiplex identifier correlating responses to requests.
    pub mid: u16,
}

impl Header {
    pub const STRUCT_SIZE: usize = 32;

    /// Builds the response header for a request: same addressing fields,
    /// with the RESPONSE flag and NT status reporting set.
    pub fn response_to(request: &Header, status: Status) -> Self {
        Header {
            command: request.command,
            status: status as u32,
            flags: request.flags.with_response(true),
            flags2: request.flags2.with_err_status(true),
            pid_high: request.pid_high,
            signature: [0; 8],
            tid: request.tid,
            pid_low: request.pid_low,
            uid: request.uid,
            mid: request.mid,
        }
    }

    /// Typed command code of this message.
    pub fn command(&self) -> crate::Result<Command> {
        self.command.try_into()
    }
}

/// The AndX linkage block opening every chained command's word block.
#[smb_message_binrw]
#[derive(Clone, Copy)]
#[brw(little)]
pub struct AndX {
    /// Next chained command code, or [`NO_MORE_ANDX_COMMAND`].
    pub command: u8,
    reserved: u8,
    /// Offset of the next command's word block, from the start of the header.
    pub offset: u16,
}

/// The AndX chain terminator value.
pub const NO_MORE_ANDX_COMMAND: u8 = 0xFF;

impl AndX {
    /// A terminating AndX block.
    pub fn none() -> Self {
        AndX {
            command: NO_MORE_ANDX_COMMAND,
            offset: 0,
        }
    }

    pub fn is_chained(&self) -> bool {
        self.command != NO_MORE_ANDX_COMMAND
    }
}

impl Default for AndX {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use smbd_tests::*;

    use super::*;

    test_binrw! {
        Header => negotiate: Header {
            command: Command::Negotiate as u8,
            status: 0,
            flags: HeaderFlags::new().with_caseless(true).with_canonicalized_paths(true),
            flags2: HeaderFlags2::new()
                .with_long_names_allowed(true)
                .with_knows_eas(true)
                .with_security_signature_required(true)
                .with_is_long_name(true)
                .with_extended_security(true)
                .with_err_status(true)
                .with_unicode(true),
            pid_high: 0,
            signature: [0; 8],
            tid: 0xffff,
            pid_low: 1,
            uid: 0,
            mid: 0,
        } => "ff534d4272000000001853c8000000000000000000000000ffff010000000000"
    }

    test_binrw! {
        AndX => none: AndX::none() => "ff000000"
    }

    #[test]
    fn test_unknown_command_is_reported() {
        assert!(matches!(
            Command::try_from(0xEE),
            Err(crate::SmbMsgError::UnknownCommand(0xEE))
        ));
    }

    #[test]
    fn test_status_success_classes() {
        assert!(Status::Success.is_success());
        assert!(Status::BufferOverflow.is_success());
        assert!(!Status::AccessDenied.is_success());
    }
}
