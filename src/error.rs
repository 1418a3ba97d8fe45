//! Library error type for the chat service.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// A required API key environment variable is unset.
    #[error("{0} environment variable is not set")]
    MissingApiKey(String),

    /// Transport-level failure talking to an upstream service.
    #[error("request to {service} failed: {source}")]
    Http {
        service: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    /// The generation stream broke or carried an error payload.
    #[error("generation stream from {backend} failed: {message}")]
    Upstream { backend: String, message: String },

    /// Every configured generation backend failed before producing output.
    #[error("all generation backends failed: {0}")]
    BackendsExhausted(String),

    #[error("invalid response from {service}: {message}")]
    InvalidResponse { service: String, message: String },
}

impl ChatError {
    pub(crate) fn http(service: &str, source: reqwest::Error) -> Self {
        Self::Http {
            service: service.to_string(),
            source,
        }
    }

    pub(crate) fn invalid(service: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
