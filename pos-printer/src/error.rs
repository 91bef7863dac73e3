//! Error types for the printer library

use std::fmt;

use thiserror::Error;

/// Failure category reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Radio or service is switched off
    Unavailable,
    /// Bad address, host or device reference
    NotFound,
    /// Connect did not complete in time
    Timeout,
    /// Any other I/O failure
    IoFailure,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Unavailable => "unavailable",
            TransportErrorKind::NotFound => "not found",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::IoFailure => "io failure",
        };
        f.write_str(s)
    }
}

/// Error raised by `Transport::open` or `Connection::write_all`
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::IoFailure, message)
    }

    /// Classify a std I/O error raised while opening a link
    pub fn from_open_io(target: &str, e: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        let message = format!("{}: {}", target, e);
        match e.kind() {
            ErrorKind::NotFound | ErrorKind::AddrNotAvailable => Self::not_found(message),
            ErrorKind::TimedOut => Self::timeout(message),
            _ => Self::io(message),
        }
    }
}

/// Encoder error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Malformed intent (negative feed count, intent not representable)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Printer error types
#[derive(Debug, Clone, Error)]
pub enum PrintError {
    /// Radio or printing service disabled
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Opening the connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connect did not complete in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation attempted without an open session
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// I/O error mid-transfer
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Printer has no cutter; logged and swallowed by the session
    #[error("Cut unsupported: {0}")]
    CutUnsupported(String),

    /// Malformed input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Session used outside its lifecycle
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Feature deferred to the host (PDF)
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Job execution panicked or was aborted
    #[error("Internal error: {0}")]
    Internal(String),

    /// Dispatcher stopped before the job ran
    #[error("Dispatcher closed")]
    DispatcherClosed,
}

impl PrintError {
    /// Map a transport failure raised while opening a connection
    pub fn from_open(e: TransportError) -> Self {
        match e.kind {
            TransportErrorKind::Unavailable => PrintError::TransportUnavailable(e.message),
            TransportErrorKind::Timeout => PrintError::Timeout(e.message),
            TransportErrorKind::NotFound | TransportErrorKind::IoFailure => {
                PrintError::ConnectionFailed(e.to_string())
            }
        }
    }

    /// Stable machine readable code
    pub fn code(&self) -> &'static str {
        match self {
            PrintError::TransportUnavailable(_) => "TRANSPORT_UNAVAILABLE",
            PrintError::ConnectionFailed(_) => "CONNECTION_FAILED",
            PrintError::Timeout(_) => "TIMEOUT",
            PrintError::NotConnected(_) => "NOT_CONNECTED",
            PrintError::WriteFailed(_) => "WRITE_FAILED",
            PrintError::CutUnsupported(_) => "CUT_UNSUPPORTED",
            PrintError::InvalidArgument(_) => "INVALID_ARGUMENT",
            PrintError::InvalidState(_) => "INVALID_STATE",
            PrintError::NotImplemented(_) => "NOT_IMPLEMENTED",
            PrintError::Internal(_) => "INTERNAL",
            PrintError::DispatcherClosed => "DISPATCHER_CLOSED",
        }
    }

    /// Map a transport failure raised while writing
    pub fn from_write(e: TransportError) -> Self {
        PrintError::WriteFailed(e.to_string())
    }
}

impl From<EncodeError> for PrintError {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::InvalidArgument(msg) => PrintError::InvalidArgument(msg),
        }
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
