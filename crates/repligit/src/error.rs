//! Smart HTTP client error types.

use thiserror::Error;

/// Errors that can occur while talking to a remote over smart HTTP.
#[derive(Debug, Error)]
pub enum GitError {
    /// The remote answered with a non-2xx status.
    #[error("transport error: {url} returned HTTP {status}")]
    Transport {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Connection, TLS or body streaming failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error while reading a response body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid pkt-line framing.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// Unexpected content in an otherwise well-framed response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An object id that is not 40 lowercase hex characters.
    #[error("invalid object id: {0:?}")]
    InvalidObjectId(String),

    /// The push report did not confirm the update. Carries the offending line.
    #[error("push rejected: {0}")]
    PushRejected(String),
}

/// Coarse classification of a [`GitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never produced a usable response.
    Transport,
    /// The response was received but violated the protocol.
    Protocol,
}

impl GitError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } | Self::Http(_) | Self::Io(_) => ErrorKind::Transport,
            Self::InvalidPktLine(_)
            | Self::Protocol(_)
            | Self::InvalidObjectId(_)
            | Self::PushRejected(_) => ErrorKind::Protocol,
        }
    }

    /// Returns true for transport-level failures.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Returns true for protocol-level failures.
    pub fn is_protocol(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = GitError::Transport {
            url: "https://example.com/info/refs".into(),
            status: 404,
        };
        assert!(err.is_transport());
        assert!(!err.is_protocol());

        assert!(GitError::InvalidPktLine("x".into()).is_protocol());
        assert!(GitError::PushRejected("ng refs/heads/main".into()).is_protocol());
        assert_eq!(
            GitError::Io(std::io::Error::other("boom")).kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn test_push_rejected_display_keeps_line() {
        let err = GitError::PushRejected("ng refs/heads/main non-fast-forward".into());
        assert_eq!(
            err.to_string(),
            "push rejected: ng refs/heads/main non-fast-forward"
        );
    }
}
