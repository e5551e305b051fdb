//! Error taxonomy of the server engine.
//!
//! Handlers surface [`Error`]; the dispatcher maps it onto a stable
//! NTSTATUS through [`Error::status`] and always frames a well-formed
//! response header. Invariant violations become [`Error::ServerFault`] and
//! abort only the request, never the process.

use smbd_msg::Status;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("No file matches: {0}")]
    NoSuchFile(String),
    #[error("Path component not found: {0}")]
    PathNotFound(String),
    #[error("Invalid handle {0}")]
    InvalidHandle(u16),
    #[error("Object already exists: {0}")]
    AlreadyExists(String),
    #[error("Access denied: {0}")]
    AccessDenied(&'static str),
    #[error("Share not found: {0}")]
    BadShareName(String),
    #[error("Authentication failed for {0}")]
    LogonFailure(String),
    #[error("No such session {0}")]
    BadUid(u16),
    #[error("No such tree connection {0}")]
    BadTid(u16),
    #[error("Handle table is full")]
    TooManyOpenFiles,
    #[error("Out of memory")]
    NoMemory,
    #[error("Malformed request: {0}")]
    InvalidParameter(&'static str),
    #[error("Unsupported operation: {0}")]
    NotSupported(&'static str),
    #[error("Unsupported information level {0:#06x}")]
    UnsupportedLevel(u16),
    #[error("Lock conflict in range {0}..={1}")]
    LockConflict(u64, u64),
    #[error("Range not locked")]
    RangeNotLocked,
    #[error("Sharing violation")]
    SharingViolation,
    #[error("Delete is pending on this file")]
    DeletePending,
    #[error("Directory is not empty")]
    DirectoryNotEmpty,
    #[error("Target is a directory")]
    IsDirectory,
    #[error("Target is not a directory")]
    NotADirectory,
    #[error("Rename crosses mount points")]
    CrossDevice,
    #[error("No space left on the share")]
    DiskFull,
    #[error("No more files")]
    NoMoreFiles,
    #[error("No EAs on file")]
    NoEasOnFile,
    #[error("Request was cancelled")]
    Cancelled,
    #[error("Parse failure: {0}")]
    Parse(#[from] binrw::Error),
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal server error: {0}")]
    ServerFault(String),
}

impl Error {
    /// An internal-invariant failure; logged with context at the request
    /// boundary.
    pub fn fault(context: impl Into<String>) -> Self {
        let context = context.into();
        log::error!("internal fault: {context}");
        Error::ServerFault(context)
    }

    /// The NTSTATUS this error surfaces as.
    pub fn status(&self) -> Status {
        match self {
            Error::NotFound(_) => Status::ObjectNameNotFound,
            Error::NoSuchFile(_) => Status::NoSuchFile,
            Error::PathNotFound(_) => Status::ObjectPathNotFound,
            Error::InvalidHandle(_) => Status::InvalidHandle,
            Error::AlreadyExists(_) => Status::ObjectNameCollision,
            Error::AccessDenied(_) => Status::AccessDenied,
            Error::BadShareName(_) => Status::BadNetworkName,
            Error::LogonFailure(_) => Status::LogonFailure,
            Error::BadUid(_) => Status::SmbBadUid,
            Error::BadTid(_) => Status::SmbBadTid,
            Error::TooManyOpenFiles => Status::TooManyOpenedFiles,
            Error::NoMemory => Status::NoMemory,
            Error::InvalidParameter(_) => Status::InvalidParameter,
            Error::NotSupported(_) => Status::NotSupported,
            Error::UnsupportedLevel(_) => Status::InvalidInfoClass,
            Error::LockConflict(..) => Status::FileLockConflict,
            Error::RangeNotLocked => Status::RangeNotLocked,
            Error::SharingViolation => Status::SharingViolation,
            Error::DeletePending => Status::DeletePending,
            Error::DirectoryNotEmpty => Status::DirectoryNotEmpty,
            Error::IsDirectory => Status::FileIsADirectory,
            Error::NotADirectory => Status::NotADirectory,
            Error::CrossDevice => Status::NotSameDevice,
            Error::DiskFull => Status::DiskFull,
            Error::NoMoreFiles => Status::NoMoreFiles,
            Error::NoEasOnFile => Status::NoEasOnFile,
            Error::Cancelled => Status::Cancelled,
            Error::Parse(_) => Status::InvalidParameter,
            Error::Io(e) => io_status(e),
            Error::ServerFault(_) => Status::InvalidDeviceRequest,
        }
    }

    /// Maps an I/O error for a named path, refining the not-found case.
    pub fn from_io_for(path: &str, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path.to_string())
        } else {
            Error::Io(e)
        }
    }
}

fn io_status(e: &std::io::Error) -> Status {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::NotFound => Status::ObjectNameNotFound,
        ErrorKind::PermissionDenied => Status::AccessDenied,
        ErrorKind::AlreadyExists => Status::ObjectNameCollision,
        ErrorKind::DirectoryNotEmpty => Status::DirectoryNotEmpty,
        ErrorKind::NotADirectory => Status::NotADirectory,
        ErrorKind::IsADirectory => Status::FileIsADirectory,
        ErrorKind::StorageFull => Status::DiskFull,
        ErrorKind::InvalidInput => Status::InvalidParameter,
        ErrorKind::CrossesDevices => Status::NotSameDevice,
        ErrorKind::TimedOut => Status::IoTimeout,
        _ => Status::InvalidDeviceRequest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_map_to_stable_status() {
        assert_eq!(
            Error::NotFound("x".into()).status(),
            Status::ObjectNameNotFound
        );
        assert_eq!(Error::InvalidHandle(3).status(), Status::InvalidHandle);
        assert_eq!(Error::TooManyOpenFiles.status(), Status::TooManyOpenedFiles);
        assert_eq!(Error::LockConflict(0, 9).status(), Status::FileLockConflict);
        assert_eq!(Error::CrossDevice.status(), Status::NotSameDevice);
    }

    #[test]
    fn test_io_not_found_refinement() {
        let e = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(matches!(Error::from_io_for("\\a", e), Error::NotFound(_)));
    }
}
