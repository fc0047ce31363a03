//! Error types for sqinn operations.

use std::fmt;

/// The primary error type for all sqinn operations.
#[derive(Debug)]
pub enum Error {
    /// The worker process failed to start
    Launch(LaunchError),
    /// Wire-level failure: malformed frame, short read/write, decode error
    Transport(TransportError),
    /// The worker reported a failure (bad SQL, statement lifecycle misuse)
    Application(ApplicationError),
    /// Caller-side precondition failure, detected before any I/O
    Contract(ContractViolation),
    /// Value extraction with the wrong target type
    Type(TypeMismatch),
    /// The connection was terminated and must not be used again
    ConnectionClosed,
}

/// Failure to spawn the worker subprocess.
///
/// Fatal to the connection attempt; nothing was opened, so there is no
/// state to clean up.
#[derive(Debug)]
pub struct LaunchError {
    pub message: String,
    pub source: Option<std::io::Error>,
}

/// Wire-level failure.
///
/// Connection-fatal: after a transport error the byte stream may be
/// desynchronized and no further calls may be attempted on the
/// connection. Callers discard it and launch a new one.
#[derive(Debug)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub source: Option<std::io::Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Underlying read/write failed or the stream ended mid-frame
    Io,
    /// A frame length prefix or frame boundary was invalid
    Frame,
    /// A field inside a frame could not be decoded
    Decode,
}

/// A failure reported by the worker inside a well-formed response.
///
/// The connection remains valid; the caller may retry a corrected call.
#[derive(Debug)]
pub struct ApplicationError {
    pub message: String,
}

/// A caller-side precondition failure (mismatched parameter counts,
/// disallowed value types in a fast-path call, out-of-range argument).
///
/// Raised before any bytes are written, so connection state is never
/// corrupted by one.
#[derive(Debug)]
pub struct ContractViolation {
    pub message: String,
}

/// A [`crate::Value`] extraction with the wrong target type.
#[derive(Debug)]
pub struct TypeMismatch {
    pub expected: &'static str,
    pub actual: &'static str,
}

impl Error {
    /// Shorthand for a transport error without an I/O source.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Error::Transport(TransportError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Shorthand for a contract violation.
    pub fn contract(message: impl Into<String>) -> Self {
        Error::Contract(ContractViolation {
            message: message.into(),
        })
    }

    /// Is this error fatal to the connection?
    ///
    /// Launch, transport, and closed-connection errors are fatal;
    /// application errors and contract violations leave the connection
    /// usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Launch(_) | Error::Transport(_) | Error::ConnectionClosed
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Launch(e) => write!(f, "Launch error: {}", e.message),
            Error::Transport(e) => write!(f, "Transport error: {}", e.message),
            Error::Application(e) => write!(f, "sqinn: {}", e.message),
            Error::Contract(e) => write!(f, "Contract violation: {}", e.message),
            Error::Type(e) => write!(f, "Type error: expected {}, found {}", e.expected, e.actual),
            Error::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Launch(e) => e
                .source
                .as_ref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Transport(e) => e
                .source
                .as_ref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.actual)
    }
}

impl From<LaunchError> for Error {
    fn from(err: LaunchError) -> Self {
        Error::Launch(err)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<ApplicationError> for Error {
    fn from(err: ApplicationError) -> Self {
        Error::Application(err)
    }
}

impl From<ContractViolation> for Error {
    fn from(err: ContractViolation) -> Self {
        Error::Contract(err)
    }
}

impl From<TypeMismatch> for Error {
    fn from(err: TypeMismatch) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for sqinn operations.
pub type Result<T> = std::result::Result<T, Error>;
