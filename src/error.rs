//! Error types shared by every disk and filesystem operation.

use std::{fmt, io};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The error conditions an operation can surface to the command boundary.
///
/// Every variant carries a human-readable context string built at the call
/// site; errors bubble up verbatim with no retries.
#[derive(Debug)]
pub enum Error {
    /// Malformed flag, out-of-range value or unknown command.
    InvalidArgument(String),
    /// A path, partition, user or group does not exist.
    NotFound(String),
    /// The target already exists (duplicate mount, name, extended partition).
    AlreadyExists(String),
    /// The operation requires privileges the active session does not have.
    Forbidden(String),
    /// No fit or free slot can satisfy the request.
    InsufficientSpace(String),
    /// An on-disk structure is inconsistent or decoded at an impossible offset.
    InvalidState(String),
    /// An underlying file read/write failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            Self::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            Self::InsufficientSpace(msg) => write!(f, "insufficient space: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
