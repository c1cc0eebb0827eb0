//! Client error types.

use derive_more::{Display, Error};
use tracing::instrument;

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ClientErrorKind {
    /// Network or protocol failure before a status code was available.
    #[display("transport failure: {message}")]
    Transport {
        /// Underlying error text.
        message: String,
    },
    /// The server refused a move.
    #[display("move rejected with HTTP {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body as sent by the server.
        body: String,
    },
    /// The server refused a registration under the configured policy.
    #[display("registration rejected with HTTP {status}: {body}")]
    RegistrationRejected {
        /// HTTP status code.
        status: u16,
        /// Response body, usually the reason.
        body: String,
    },
    /// No change was observed for too many polling cycles.
    #[display("opponent did not respond within {cycles} polling cycles")]
    OpponentTimeout {
        /// Cycles waited.
        cycles: u32,
    },
    /// The matchmaker refused the queue join.
    #[display("queue join rejected with HTTP {status}: {body}")]
    QueueRejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// A username failed the local policy.
    #[display("invalid username: {reason}")]
    InvalidUsername {
        /// Which rule failed.
        reason: String,
    },
    /// Configuration could not be loaded or is inconsistent.
    #[display("configuration: {message}")]
    Config {
        /// Details.
        message: String,
    },
    /// The session store could not be read or written.
    #[display("session store: {message}")]
    Store {
        /// Details.
        message: String,
    },
    /// The session task is gone.
    #[display("session is closed")]
    SessionClosed,
}

/// Client error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Client error: {} at {}:{}", kind, file, line)]
pub struct ClientError {
    /// Error classification.
    pub kind: ClientErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ClientError {
    /// Creates a new client error with caller location tracking.
    #[track_caller]
    #[instrument(skip(kind))]
    pub fn new(kind: ClientErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Shorthand for a transport failure.
    #[track_caller]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Transport {
            message: message.into(),
        })
    }

    /// Shorthand for a session store failure.
    #[track_caller]
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Store {
            message: message.into(),
        })
    }

    /// The error classification.
    pub fn kind(&self) -> &ClientErrorKind {
        &self.kind
    }

    /// True for failures that polling loops recover from by retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ClientErrorKind::Transport { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::store(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for ClientError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::store(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_caller_location() {
        let err = ClientError::transport("connection refused");
        assert!(err.file.ends_with("error.rs"));
        assert!(err.to_string().contains("connection refused"));
        assert!(err.is_transient());
    }

    #[test]
    fn rejection_keeps_status_and_body() {
        let err = ClientError::new(ClientErrorKind::Rejected {
            status: 400,
            body: "cell taken".to_string(),
        });
        assert!(!err.is_transient());
        assert!(err.to_string().contains("HTTP 400: cell taken"));
    }
}
