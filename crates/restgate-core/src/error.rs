//! Error types for the Restgate core library
//!
//! Every failure an outbound call can produce is surfaced through [`Error`].
//! The variants follow the failure taxonomy of the request pipeline: the call
//! never produced a response, the server rejected it with a structured
//! envelope, the server rejected it with something we could not decode, or
//! the request body could not be built in the first place.

use thiserror::Error;

use crate::http::error::ApiError;

/// Main error type for Restgate operations
#[derive(Error, Debug)]
pub enum Error {
    /// The transport never produced a response (DNS, connect, TLS, timeout...)
    #[error("Transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Non-success response carrying a decodable error envelope
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Non-success response without a decodable error envelope
    #[error("HTTP {status} {reason}: {body}")]
    Protocol {
        status: u16,
        reason: String,
        body: String,
    },

    /// The request payload could not be built
    #[error("Encoding failure: {message}")]
    Encoding {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The dispatch collaborator rejected a decoded response body
    #[error("Dispatch failure: {message}")]
    Dispatch {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Invalid client configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// JSON encoding of a payload or decoding of a success body failed
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// An operation was dropped by the scheduler before it resolved
    #[error("Scheduler error: {message}")]
    Scheduler { message: String },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a transport error without an underlying cause
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create an encoding error without an underlying cause
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// HTTP status attached to this failure, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(api) => Some(api.status),
            Self::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server rejected the call for exceeding a rate limit.
    ///
    /// The core never retries these; callers that want to can check here.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = Error::Protocol {
            status: 502,
            reason: "Bad Gateway".to_string(),
            body: "<html>upstream</html>".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("502"));
        assert!(text.contains("Bad Gateway"));
        assert!(text.contains("<html>upstream</html>"));
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn test_rate_limited_detection() {
        let err = Error::Protocol {
            status: 429,
            reason: "Too Many Requests".to_string(),
            body: String::new(),
        };
        assert!(err.is_rate_limited());
        assert!(!Error::transport("connection reset").is_rate_limited());
    }

    #[test]
    fn test_helpers_set_messages() {
        assert!(Error::encoding("bad attachment")
            .to_string()
            .contains("bad attachment"));
        assert!(Error::configuration("token missing")
            .to_string()
            .contains("token missing"));
        assert_eq!(Error::transport("x").status(), None);
    }
}
