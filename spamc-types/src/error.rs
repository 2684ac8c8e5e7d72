//! Protocol error taxonomy.
//!
//! A [`TaskError`] is what gets stored on [`crate::Task::error`](crate::task::Task::error) once
//! the parser gives up on a request. It carries everything the Reply Writer needs to format a
//! dialect-correct error response: a numeric code the client can match on, and a human-readable
//! message.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// The four ways a task can fail, per the propagation policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum ErrorKind {
    /// Malformed command line, unknown header, malformed header value, unrecognised dialect, or
    /// a line exceeding the framing limit.
    #[error("protocol error")]
    Protocol,
    /// A body-bearing command arrived without a usable `Content-Length`.
    #[error("length error")]
    Length,
    /// The underlying sink refused a write; the task terminates without further output.
    #[error("transport error")]
    Transport,
    /// `feed_line` was called while the task was not in `ReadCommand` or `ReadHeader`.
    #[error("invalid state")]
    InvalidState,
}

/// A small host-defined numeric error code, echoed in the banner line of an error reply.
///
/// The taxonomy of which integer means what is up to the host (§7); this crate only reserves the
/// value used by the one error the parser itself can originate deterministically
/// ([`ErrorCode::LENGTH_ERROR`]) and a default for everything else.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    /// `RSPAMD_LENGTH_ERROR`: a body-bearing command had no usable `Content-Length`.
    pub const LENGTH_ERROR: Self = Self(1);
    /// Generic malformed-request error: bad command, bad header, bad dialect, overlong line.
    pub const PROTOCOL_ERROR: Self = Self(2);

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An error attached to a [`crate::Task`](crate::task::Task), forcing it into `WriteError` state.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind}: {message} (code {code})")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// The canonical "no usable Content-Length" error the parser raises on an empty line for a
    /// body-bearing command.
    pub fn length_error() -> Self {
        Self::new(
            ErrorKind::Length,
            ErrorCode::LENGTH_ERROR,
            "Unknown content length",
        )
    }

    /// A generic protocol error with a caller-supplied diagnostic message.
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, ErrorCode::PROTOCOL_ERROR, message)
    }
}
