//! Stable error codes for the C boundary.
//!
//! Codes are negative so they can travel in the same signed word as byte
//! counts: a non-negative return is a count, a negative return is one of
//! these. Values follow the matching POSIX errno where one exists.

use std::os::raw::c_int;

use dal_core::Error;

/// Object does not exist (ENOENT).
pub const DAL_ENOENT: c_int = -2;
/// Backend I/O failed mid-transfer (EIO).
pub const DAL_EIO: c_int = -5;
/// Stale, freed, or foreign handle (EBADF).
pub const DAL_EBADF: c_int = -9;
/// Malformed path or argument (EINVAL).
pub const DAL_EINVAL: c_int = -22;
/// Permission denied by the backend (EACCES).
pub const DAL_EACCES: c_int = -13;
/// Backend or service unreachable (ECONNREFUSED).
pub const DAL_EUNAVAIL: c_int = -111;
/// Finalize failed; the object was not stored (EHOSTDOWN).
pub const DAL_EFINAL: c_int = -117;

/// Map a layer error to its boundary code.
#[must_use]
pub fn error_code(e: &Error) -> c_int {
    match e {
        Error::NotFound(_) => DAL_ENOENT,
        Error::PermissionDenied(_) => DAL_EACCES,
        Error::Unavailable(_) => DAL_EUNAVAIL,
        Error::InvalidPath(_) => DAL_EINVAL,
        Error::Io(_) => DAL_EIO,
        Error::Finalize(_) => DAL_EFINAL,
        Error::InvalidHandle => DAL_EBADF,
    }
}

/// Short stable name for a code, for diagnostics.
#[must_use]
pub fn code_name(code: c_int) -> &'static str {
    match code {
        DAL_ENOENT => "not_found",
        DAL_EACCES => "permission_denied",
        DAL_EUNAVAIL => "unavailable",
        DAL_EINVAL => "invalid_path",
        DAL_EIO => "io_failure",
        DAL_EFINAL => "finalize_failure",
        DAL_EBADF => "invalid_handle",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_distinct_code() {
        let codes = [
            error_code(&Error::NotFound("x".into())),
            error_code(&Error::PermissionDenied("x".into())),
            error_code(&Error::Unavailable("x".into())),
            error_code(&Error::InvalidPath("x".into())),
            error_code(&Error::Io("x".into())),
            error_code(&Error::Finalize("x".into())),
            error_code(&Error::InvalidHandle),
        ];
        for code in codes {
            assert!(code < 0, "codes must be negative");
            assert_eq!(codes.iter().filter(|&&c| c == code).count(), 1);
            assert_ne!(code_name(code), "unknown");
        }
    }
}
