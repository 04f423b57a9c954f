use thiserror::Error;

/// Failures surfaced by auth and query calls against the managed backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Backend returned {status}: {message}")]
    Remote {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Failed to decode backend response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl BackendError {
    /// HTTP status of a remote rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Remote { status, .. } => Some(*status),
            BackendError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the backend refused the request itself (4xx), as opposed to
    /// failing to answer.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    pub(crate) fn remote(status: u16, message: impl Into<String>) -> Self {
        BackendError::Remote {
            status,
            code: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Transport(e)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e)
    }
}

/// A cookie adapter refused a write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("response headers cannot be modified in the current context")]
    ReadOnlyContext,

    #[error("invalid cookie {name}: {message}")]
    Invalid { name: String, message: String },

    #[error("cookie store unavailable: {0}")]
    Unavailable(String),
}
