//! Error taxonomy for backend exchanges.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single request/response exchange with the backend.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Transport { status: StatusCode, body: String },

    /// Connection-level failure: DNS, refused connection, reset mid-transfer.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response from backend: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid server URL {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            Self::Network(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Failure while exchanging an access code for a token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad or expired code. The user has to enter another one.
    #[error("access code rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("not logged in, run `btp-meetings login` first")]
    NotLoggedIn,

    #[error("access expired, run `btp-meetings login` again")]
    Expired,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Why a phase stream ended before a terminal message. Logged, never shown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamFailure {
    #[error("could not connect: {0}")]
    Connect(String),

    #[error("stream request returned {0}")]
    Status(StatusCode),

    #[error("malformed stream record: {0}")]
    Malformed(String),

    #[error("connection dropped before a terminal phase")]
    Disconnected,
}

/// Pull a human readable message out of a FastAPI style error body.
pub(crate) fn detail_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("detail")
                .and_then(|d| d.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
