//! Errors for the dataflow runtime, spec §7.
//!
//! Control-plane operations return `Result<T, Error>`; `Error` always
//! carries a classifying [`ErrorKind`] plus a human message, matching the
//! "`(code, message, optional-details)`" shape of spec §7. Data-plane
//! failures (a `prepend` that can't grow a buffer, a packet routed to a
//! disconnected gate) are not represented here: per spec §7 they are
//! handled inline by the module and never abort the batch.

use std::fmt;

/// High-level classification for control-plane failures (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration or out-of-range gate index.
    InvalidArg,
    /// A lookup miss on delete, or an unknown module/gate reference.
    NotFound,
    /// A duplicate insert, or a module name collision.
    AlreadyExists,
    /// Allocation failure, or a cuckoo/LPM table that is full.
    OutOfMemory,
    /// Reference to an unknown port/device.
    NoDevice,
    /// A burst or packet size outside the allowed range.
    OutOfRange,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::InvalidArg => "invalid_arg",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::OutOfMemory => "out_of_memory",
            ErrorKind::NoDevice => "no_device",
            ErrorKind::OutOfRange => "out_of_range",
        };
        write!(f, "{label}")
    }
}

/// A control-plane error: a classifying kind, a human message, and
/// optional structured details for programmatic consumers.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct Error {
    /// The error classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Optional machine-readable details (e.g. the offending gate index).
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Builds an error with no structured details.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Builds an error carrying structured details.
    #[must_use]
    pub fn with_details(kind: ErrorKind, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Some(details),
        }
    }
}
