//! Error types and the fault taxonomy.

use std::fmt;
use std::io;
use thiserror::Error;

/// Classification of a fault.
///
/// Every error raised during a run maps to exactly one kind. The kind
/// decides whether an operation is retried and how the fault is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Timeout, connection reset, unreachable host, 5xx or short body.
    TransientNetwork,
    /// Malformed response, missing required header or rejected request.
    Protocol,
    /// Content digest did not match the checksum supplied by the source.
    Integrity,
    /// Missing credentials or unreachable service during setup.
    Configuration,
    /// The destination store refused or failed a write.
    Store,
    /// The run was interrupted.
    Cancelled,
}

impl FaultKind {
    /// Returns true if operations failing with this kind may be retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, FaultKind::TransientNetwork)
    }

    /// Short stable name used in logs and ledgers.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::TransientNetwork => "transient",
            FaultKind::Protocol => "protocol",
            FaultKind::Integrity => "integrity",
            FaultKind::Configuration => "configuration",
            FaultKind::Store => "store",
            FaultKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from constructing or decoding identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The identifier was empty.
    #[error("identifier is empty")]
    Empty,

    /// The identifier contains a character outside the legal alphabet.
    #[error("identifier {id:?} contains illegal character {ch:?}")]
    IllegalChar {
        /// The rejected identifier.
        id: String,
        /// The offending character.
        ch: char,
    },

    /// A destination id could not be mapped back to a source id.
    #[error("malformed destination id {0:?}")]
    MalformedDestination(String),
}

/// A timestamp string that matched none of the accepted formats.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable timestamp {0:?}")]
pub struct TimestampError(pub String);

/// Errors raised while talking to the source repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request exceeded its read timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The connection could not be established or was reset.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The repository answered with a 5xx status.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response excerpt or reason.
        message: String,
    },

    /// The body ended before the advertised length.
    #[error("short response: expected {expected} bytes, received {received}")]
    ShortBody {
        /// Advertised content length.
        expected: u64,
        /// Bytes actually received.
        received: u64,
    },

    /// The response could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A required response header was absent.
    #[error("missing response header {0}")]
    MissingHeader(String),

    /// The repository rejected the request with a 4xx status.
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response excerpt or reason.
        message: String,
    },

    /// Login failed or the session was refused after a refresh.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The fetch was abandoned because the run was cancelled.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Maps a non-success HTTP status to a fetch error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if status >= 500 {
            FetchError::Server {
                status,
                message: message.into(),
            }
        } else {
            FetchError::Rejected {
                status,
                message: message.into(),
            }
        }
    }

    /// Returns the fault classification of this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            FetchError::Timeout(_)
            | FetchError::Connection(_)
            | FetchError::Server { .. }
            | FetchError::ShortBody { .. } => FaultKind::TransientNetwork,
            FetchError::Malformed(_)
            | FetchError::MissingHeader(_)
            | FetchError::Rejected { .. } => FaultKind::Protocol,
            FetchError::Authentication(_) => FaultKind::Configuration,
            FetchError::Cancelled => FaultKind::Cancelled,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors from reading or appending ledger files.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An I/O error occurred.
    #[error("ledger I/O error: {0}")]
    Io(#[from] io::Error),

    /// A ledger line could not be parsed.
    #[error("malformed ledger line {line}: {reason}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// Why the line was rejected.
        reason: String,
    },

    /// An identifier in a ledger or reprocess list was invalid.
    #[error("invalid identifier on line {line}: {source}")]
    InvalidId {
        /// 1-based line number.
        line: usize,
        /// Underlying identifier error.
        source: IdError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(FetchError::Timeout("read".into()).is_retryable());
        assert!(FetchError::Connection("reset".into()).is_retryable());
        assert!(FetchError::from_status(503, "busy").is_retryable());
        assert!(FetchError::ShortBody {
            expected: 10,
            received: 4
        }
        .is_retryable());

        assert!(!FetchError::from_status(404, "gone").is_retryable());
        assert!(!FetchError::MissingHeader("x-content-sha256".into()).is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(FetchError::from_status(500, "").kind(), FaultKind::TransientNetwork);
        assert_eq!(FetchError::from_status(418, "").kind(), FaultKind::Protocol);
        assert_eq!(
            FetchError::Authentication("denied".into()).kind(),
            FaultKind::Configuration
        );
    }

    #[test]
    fn error_display() {
        let err = FetchError::ShortBody {
            expected: 100,
            received: 42,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("42"));
        assert_eq!(FaultKind::Integrity.to_string(), "integrity");
    }
}
