//! Error descriptor, handler errors, and the infrastructure error type.
//!
//! Three layers, from the wire inwards:
//!
//! - [`Error`] is the `(code, message)` pair rendered into the envelope.
//!   An empty code means "no error".
//! - [`HandlerError`] is what handlers return. It is a closed sum type:
//!   an already-typed [`Error`], a value exposing the [`CodeError`]
//!   capability, or an opaque error that renders as `ServerError`.
//! - [`ServeError`] surfaces transport failures from [`Server`](crate::Server).

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Boxed, thread-safe error used for opaque failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── Error descriptor ─────────────────────────────────────────────────────────

/// The error descriptor carried by a [`Response`](crate::Response).
///
/// ```rust
/// use action_svc::Error;
///
/// let err = Error::INVALID_ACTION.with_message("invalid action 'nope'");
/// assert_eq!(err.code, "InvalidAction");
/// assert!(Error::default().is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "PascalCase")]
#[error("{code}: {message}")]
pub struct Error {
    pub code: Cow<'static, str>,
    #[serde(default)]
    pub message: Cow<'static, str>,
}

impl Error {
    /// The action name is empty or resolves to no handler.
    pub const INVALID_ACTION: Error = Error::from_static("InvalidAction", "invalid action");
    /// Binding, default-filling or validation failed.
    pub const INVALID_PARAMETER: Error =
        Error::from_static("InvalidParameter", "invalid parameter");
    /// The request method has no binding strategy.
    pub const UNSUPPORTED_PROTOCOL: Error =
        Error::from_static("UnsupportedProtocol", "unsupported protocol");
    /// Catch-all for handler errors without a descriptor.
    pub const SERVER_ERROR: Error = Error::from_static("ServerError", "server error");

    pub const fn from_static(code: &'static str, message: &'static str) -> Self {
        Self { code: Cow::Borrowed(code), message: Cow::Borrowed(message) }
    }

    pub fn new(code: impl Into<Cow<'static, str>>, message: impl Into<Cow<'static, str>>) -> Self {
        Self { code: code.into(), message: message.into() }
    }

    /// Returns a copy with the same code and a new message.
    pub fn with_message(&self, message: impl Into<Cow<'static, str>>) -> Self {
        Self { code: self.code.clone(), message: message.into() }
    }

    /// An empty code means the call succeeded.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Reports whether `self` and `other` share a code, ignoring the message.
    pub fn is(&self, other: &Error) -> bool {
        self.code == other.code
    }
}

// ── Capability boundary ──────────────────────────────────────────────────────

/// An error that knows how to describe itself on the wire.
///
/// Wrap implementors with [`HandlerError::coded`] so the renderer picks up
/// their descriptor instead of the generic `ServerError`.
pub trait CodeError: std::error::Error + Send + Sync + 'static {
    fn code_error(&self) -> Error;
}

// ── Handler errors ───────────────────────────────────────────────────────────

/// The error type returned by handlers and middleware.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Already a wire descriptor; rendered verbatim.
    #[error(transparent)]
    Code(#[from] Error),

    /// Exposes a descriptor through [`CodeError`].
    #[error("{0}")]
    Coded(Box<dyn CodeError>),

    /// Anything else; rendered as `ServerError` with this message.
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl HandlerError {
    pub fn coded(err: impl CodeError) -> Self {
        Self::Coded(Box::new(err))
    }

    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    /// Classifies the error into the descriptor that goes on the wire.
    pub fn to_error(&self) -> Error {
        match self {
            Self::Coded(e) => e.code_error(),
            _ => self.typed().unwrap_or_else(|| Error::SERVER_ERROR.with_message(self.to_string())),
        }
    }

    /// The [`Error`] this wraps, if any, including one that was boxed
    /// directly or inside an `io::Error` on its way here.
    pub fn typed(&self) -> Option<Error> {
        match self {
            Self::Code(e) => Some(e.clone()),
            Self::Coded(_) => None,
            Self::Other(e) => {
                if let Some(e) = e.downcast_ref::<Error>() {
                    return Some(e.clone());
                }
                e.downcast_ref::<std::io::Error>()
                    .and_then(std::io::Error::get_ref)
                    .and_then(|inner| inner.downcast_ref::<Error>())
                    .cloned()
            }
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

impl From<&'static str> for HandlerError {
    fn from(msg: &'static str) -> Self {
        Self::Other(msg.into())
    }
}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self::Other(msg.into())
    }
}

// ── Infrastructure errors ────────────────────────────────────────────────────

/// The error type returned by [`Server`](crate::Server).
///
/// Request-level failures never show up here; they are rendered into the
/// response envelope. This type only surfaces binding to a port or
/// accepting a connection.
#[derive(Debug)]
pub struct ServeError(std::io::Error);

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "io: {}", self.0)
    }
}

impl std::error::Error for ServeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<std::io::Error> for ServeError {
    fn from(e: std::io::Error) -> Self {
        Self(e)
    }
}
