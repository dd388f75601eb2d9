//! Error types for the CouchDB client.
//!
//! # Design
//! Three failure classes map to three variants plus a server-error variant:
//! `Validation` for precondition failures raised before any I/O,
//! `Transport` for sockets that cannot be opened or driven, `Protocol` for
//! byte streams that cannot be parsed as HTTP, and `Couch` for responses
//! whose decoded body carries an `error` marker. None of them are
//! recoverable for the call that raised them.

use std::fmt;
use std::io;

/// Errors returned by [`CouchClient`](crate::CouchClient) operations.
#[derive(Debug)]
pub enum Error {
    /// Caller-supplied arguments violated a precondition (empty id, payload
    /// not a JSON object, no database selected). Raised before any socket
    /// is opened.
    Validation(String),

    /// The connection to `target` could not be opened or the request/response
    /// exchange failed at the socket level.
    Transport {
        /// The `host:port` the client was talking to.
        target: String,
        /// The underlying OS error.
        source: io::Error,
    },

    /// The response byte stream could not be parsed as HTTP.
    Protocol(String),

    /// The server answered with an application-level error payload.
    Couch {
        /// `"{error} ({reason})"` as reported by the server.
        message: String,
        /// The HTTP status code that accompanied the error body.
        status: u16,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "{msg}"),
            Error::Transport { target, source } => {
                write!(f, "error connecting to {target} - {source}")
            }
            Error::Protocol(msg) => {
                write!(f, "there was a problem while handling the HTTP protocol: {msg}")
            }
            Error::Couch { message, status } => write!(f, "{message} [HTTP {status}]"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Error {
    /// The HTTP status code carried by a server-reported error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Couch { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn couch_error_displays_message_and_status() {
        let err = Error::Couch {
            message: "conflict (Document update conflict.)".to_string(),
            status: 409,
        };
        assert_eq!(err.to_string(), "conflict (Document update conflict.) [HTTP 409]");
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn transport_error_names_the_target() {
        let err = Error::Transport {
            target: "127.0.0.1:5984".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.to_string().contains("127.0.0.1:5984"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn validation_error_has_no_status() {
        assert_eq!(Error::Validation("no database specified".into()).status(), None);
    }
}
