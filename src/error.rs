//! Core error taxonomy (spec.md §7) and its projection onto `errno` for the
//! `fuser` boundary.

use thiserror::Error;

/// Result alias used throughout the catalog/handle core.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised by the folder tree, open-handle manager and persistence
/// layer. Mirrors the taxonomy in spec.md §7: `NOT_FOUND`, `ACCESS_DENIED`,
/// `TRANSIENT`, `CORRUPT_IO`, `INVALID_ARG`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Path or key does not resolve in the catalog.
    #[error("not found")]
    NotFound,

    /// Open-handle exclusion rule, remote ACL, or upload refusal.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Transport/remote failure; not retried inside the core.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// An internal invariant was violated (should be rare; see spec.md §7
    /// on fatal invariant violations, which are not represented here since
    /// those terminate the process rather than propagate).
    #[error("internal corruption: {0}")]
    CorruptIo(String),

    /// Malformed path, name, or key.
    #[error("invalid argument: {0}")]
    InvalidArg(String),
}

impl CoreError {
    /// Project onto the nearest POSIX errno, for the `VfsAdapter` boundary
    /// only; the core itself never deals in errno (spec.md §7).
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            CoreError::NotFound => libc::ENOENT,
            CoreError::AccessDenied(_) => libc::EACCES,
            CoreError::Transient(_) => libc::EAGAIN,
            CoreError::CorruptIo(_) => libc::EIO,
            CoreError::InvalidArg(_) => libc::EINVAL,
        }
    }
}

/// Fatal internal invariant violations terminate the process rather than
/// propagate as a `CoreError` (spec.md §7: "multiset entry missing on
/// release, duplicate writable entry"). Centralising the panic message here
/// keeps the call sites short and greppable.
pub fn fatal_invariant(what: &str) -> ! {
    panic!("cloudmount: fatal internal invariant violated: {what}");
}
