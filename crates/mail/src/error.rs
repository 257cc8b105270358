//! Error taxonomy for mail operations
//!
//! Errors are split by how the caller should react: configuration and
//! authentication failures are fatal, `NotFound` is a caller mistake, and
//! `Provider` carries the HTTP status so transports can retry 5xx-class
//! failures with backoff.

use thiserror::Error;

/// Errors produced by the mail crate
#[derive(Debug, Error)]
pub enum Error {
    /// Client registration data is missing or invalid. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The interactive flow failed, or the provider rejected the stored
    /// credential. The persisted token is deleted before this is returned,
    /// so the next acquisition starts from a clean slate.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A folder name or resource id did not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider returned a non-success status. 5xx-class statuses are
    /// transient and worth retrying at the transport boundary.
    #[error("provider returned status {status} for {context}")]
    Provider { status: u16, context: String },

    #[error("transport error: {0}")]
    Transport(#[from] Box<ureq::Error>),

    /// Base64 payload data the provider sent could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Map a non-2xx provider status onto the taxonomy.
    pub(crate) fn from_status(status: u16, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            404 => Error::NotFound(context),
            401 | 403 => Error::Authentication(format!("{context} (status {status})")),
            _ => Error::Provider { status, context },
        }
    }

    /// True for failures that a bounded retry with backoff may resolve.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Provider { status, .. } => *status >= 500 || *status == 429,
            Error::Transport(_) | Error::Io(_) => true,
            _ => false,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Error::Transport(Box::new(err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(Error::from_status(404, "label"), Error::NotFound(_)));
        assert!(matches!(
            Error::from_status(401, "token"),
            Error::Authentication(_)
        ));
        assert!(matches!(
            Error::from_status(500, "list"),
            Error::Provider { status: 500, .. }
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::from_status(503, "list").is_transient());
        assert!(Error::from_status(429, "list").is_transient());
        assert!(!Error::from_status(400, "list").is_transient());
        assert!(!Error::Configuration("empty".into()).is_transient());
    }
}
