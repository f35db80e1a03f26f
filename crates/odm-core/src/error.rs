//! Download job error kinds.
//!
//! Validation and enumeration errors are fatal to a job; fetch errors are
//! recorded per object and the job continues. `Aborted` is the expected
//! signal on user abort, timeout expiry, and throttler shutdown.

use std::fmt;

/// Error raised by job creation, enumeration, or a per-object fetch.
#[derive(Debug)]
pub enum DlError {
    /// Malformed payload, wrong bucket kind, or unparseable template.
    /// Surfaced synchronously at job creation; no job record is persisted.
    Validation(String),
    /// Template iteration or remote-listing failure mid-run. Fatal to the job.
    Enumeration(String),
    /// Single-object fetch failure. Recorded per object; the job continues.
    Fetch { obj_name: String, msg: String },
    /// Explicit abort, job timeout, or throttler stop. Not a real failure.
    Aborted,
    /// Counter mismatch detected after finalization. Logged, never propagated.
    Integrity(String),
}

impl DlError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, DlError::Aborted)
    }

    pub(crate) fn enumeration(e: impl fmt::Display) -> Self {
        DlError::Enumeration(e.to_string())
    }

    pub(crate) fn fetch(obj_name: &str, e: impl fmt::Display) -> Self {
        DlError::Fetch {
            obj_name: obj_name.to_string(),
            msg: e.to_string(),
        }
    }
}

impl fmt::Display for DlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DlError::Validation(msg) => write!(f, "invalid download request: {}", msg),
            DlError::Enumeration(msg) => write!(f, "enumeration failed: {}", msg),
            DlError::Fetch { obj_name, msg } => write!(f, "fetch {}: {}", obj_name, msg),
            DlError::Aborted => write!(f, "job aborted"),
            DlError::Integrity(msg) => write!(f, "counter integrity: {}", msg),
        }
    }
}

impl std::error::Error for DlError {}

/// Sentinel returned by the partitioner for objects this target does not own.
/// Enumerators translate it into a silent skip; it must never be conflated
/// with a real error.
#[derive(Debug, PartialEq, Eq)]
pub struct NotLocal;

impl fmt::Display for NotLocal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object is not local to this target")
    }
}

impl std::error::Error for NotLocal {}
