//! Error taxonomy for the data access layer.
//!
//! Every failure that can cross the service channel is expressed as one of
//! these variants, so the original cause stays distinguishable all the way
//! to the boundary. Variants carry owned strings instead of source errors
//! because they travel through oneshot channels and may be cloned into the
//! last-error slot at the FFI edge.

use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by backends, adapters and the lifecycle manager.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The object does not exist in the backend namespace.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend refused access to the object.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The backend (or the service itself) is not reachable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The path is malformed: empty, embedded NUL, or not valid UTF-8.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Transient transport failure during read or write.
    #[error("i/o failure: {0}")]
    Io(String),

    /// The written bytes could not be made durable at close time.
    #[error("finalize failed: {0}")]
    Finalize(String),

    /// Unknown, freed, or already-closed handle identity.
    #[error("invalid handle")]
    InvalidHandle,
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(e.to_string()),
            io::ErrorKind::InvalidInput => Self::InvalidPath(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::NotFound(_) => io::ErrorKind::NotFound,
            Error::PermissionDenied(_) => io::ErrorKind::PermissionDenied,
            Error::InvalidPath(_) => io::ErrorKind::InvalidInput,
            Error::InvalidHandle => io::ErrorKind::NotConnected,
            Error::Unavailable(_) | Error::Io(_) | Error::Finalize(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_io_error_kinds() {
        let e: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, Error::NotFound(_)));

        let e: Error = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(e, Error::PermissionDenied(_)));

        let e: Error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn round_trips_to_io_error_kind() {
        let io_err: io::Error = Error::NotFound("x".into()).into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
    }
}
