// src/error.rs

use std::fmt;

/// Errors surfaced by Linda operations.
///
/// Capacity exhaustion and timeouts are *not* errors; they are reported
/// through the operation outcome enums (`SendOutcome::TimedOut` and
/// friends). Everything here either indicates a misuse of the API or an
/// unrecoverable condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A key, count, limit or other argument failed validation.
    InvalidArgument(String),

    /// A value's type cannot cross the interpreter boundary
    /// (e.g. a function handle belonging to the caller's interpreter).
    UnsupportedType,

    /// The operation was interrupted by a hard cancel. Callers are expected
    /// to let this propagate.
    Cancelled,

    /// A full collection on the keeper interpreter failed to bring its heap
    /// below the configured threshold. `needed` is the smallest threshold
    /// that would have accommodated the current live set.
    GcThresholdTooLow {
        /// Minimum acceptable threshold, in bytes.
        needed: usize,
    },
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// True if this error was produced by a hard cancel.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::UnsupportedType => write!(f, "tried to copy unsupported types"),
            Error::Cancelled => write!(f, "cancelled"),
            Error::GcThresholdTooLow { needed } => {
                write!(f, "keeper GC threshold is too low, need at least {needed}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
