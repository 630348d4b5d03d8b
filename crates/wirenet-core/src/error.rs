//! Error taxonomy shared by every connection role.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// The step at which a connection failed.
///
/// Steady-state kinds (`Read*`/`Write*` header and body) are always terminal
/// for the connection. Handshake kinds identify which of the admission and
/// challenge steps went wrong. [`ErrorKind::Connection`] is raised by the
/// initiator once every connect attempt has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ReadHeader,
    ReadBody,
    WriteHeader,
    WriteBody,
    ReadAccepted,
    WriteAccepted,
    BadAccepted,
    ReadValidation,
    WriteValidation,
    BadValidation,
    ReadValidationResult,
    WriteValidationResult,
    Connection,
}

impl ErrorKind {
    /// Stable snake_case name, used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ReadHeader => "read_header_error",
            ErrorKind::ReadBody => "read_body_error",
            ErrorKind::WriteHeader => "write_header_error",
            ErrorKind::WriteBody => "write_body_error",
            ErrorKind::ReadAccepted => "read_accepted_error",
            ErrorKind::WriteAccepted => "write_accepted_error",
            ErrorKind::BadAccepted => "bad_accepted_error",
            ErrorKind::ReadValidation => "read_validation_error",
            ErrorKind::WriteValidation => "write_validation_error",
            ErrorKind::BadValidation => "bad_validation_error",
            ErrorKind::ReadValidationResult => "read_validation_result_error",
            ErrorKind::WriteValidationResult => "write_validation_result_error",
            ErrorKind::Connection => "connection_error",
        }
    }

    /// `true` for failures of the steady-state read/write pipelines.
    pub fn is_steady_state(&self) -> bool {
        matches!(
            self,
            ErrorKind::ReadHeader | ErrorKind::ReadBody | ErrorKind::WriteHeader | ErrorKind::WriteBody
        )
    }

    /// `true` for failures of the admission or challenge steps.
    pub fn is_handshake(&self) -> bool {
        !self.is_steady_state() && *self != ErrorKind::Connection
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed handshake step, with the I/O error behind it when there was one.
///
/// Rejections (deny flag, wrong response, fail flag) carry no source.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct HandshakeError {
    pub kind: ErrorKind,
    #[source]
    pub source: Option<io::Error>,
}

impl HandshakeError {
    pub(crate) fn io(kind: ErrorKind, source: io::Error) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn rejected(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }
}

/// Errors surfaced to callers of the server and client interfaces.
///
/// Per-connection I/O failures never show up here; they are reported through
/// the owner's error hook. Only setup failures and misuse are returned.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("no address found for {host}:{port}")]
    NoAddress { host: String, port: u16 },

    #[error("connection failed: {kind}")]
    Connection { kind: ErrorKind },

    #[error("connect() may only be called once per client instance")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    /// The listener kept failing after the accept loop's backoff ran out.
    #[error("accept loop gave up: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to build reactor runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_names_are_snake_case() {
        assert_eq!(ErrorKind::ReadHeader.to_string(), "read_header_error");
        assert_eq!(
            ErrorKind::WriteValidationResult.to_string(),
            "write_validation_result_error"
        );
        assert_eq!(ErrorKind::Connection.to_string(), "connection_error");
    }

    #[test]
    fn test_error_kind_classification() {
        assert!(ErrorKind::WriteBody.is_steady_state());
        assert!(!ErrorKind::WriteBody.is_handshake());
        assert!(ErrorKind::BadValidation.is_handshake());
        assert!(!ErrorKind::Connection.is_handshake());
        assert!(!ErrorKind::Connection.is_steady_state());
    }

    #[test]
    fn test_handshake_error_keeps_io_source() {
        use std::error::Error as _;

        let err = HandshakeError::io(
            ErrorKind::ReadValidation,
            io::Error::new(io::ErrorKind::UnexpectedEof, "eof"),
        );
        assert_eq!(err.to_string(), "read_validation_error");
        assert!(err.source().is_some());
        assert!(HandshakeError::rejected(ErrorKind::BadAccepted).source.is_none());
    }
}
