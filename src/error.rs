//! Error Handling Module
//!
//! A single error type is shared by the remote client, the streaming core and
//! the HTTP layer. Handlers map it onto status codes with [`RelayError::status_code`]
//! and onto client-safe text with [`RelayError::user_message`].
//!
//! # Example
//!
//! ```rust,ignore
//! use assistant_relay::error::RelayError;
//!
//! let error = RelayError::api_error(404, "No thread found");
//! assert_eq!(error.status_code(), Some(404));
//! ```

use thiserror::Error;

/// Errors produced by the relay.
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// No API key was supplied for the remote assistant service
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    /// Transport-level failure talking to the remote service
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The remote service answered with a non-success status
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The remote event stream broke or emitted an error event
    #[error("Stream error: {0}")]
    StreamError(String),

    /// A payload could not be decoded
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The remote run ended in a terminal non-success state
    #[error("Run {run_id} ended with status {status}: {message}")]
    RunFailed {
        run_id: String,
        status: String,
        message: String,
    },

    /// The run kept requesting tool outputs past the configured limit
    #[error("Tool round limit of {0} exceeded")]
    ToolRoundLimit(usize),

    /// Tracing subscriber could not be installed
    #[error("Telemetry initialization error: {0}")]
    TelemetryInit(String),

    /// The turn was cancelled before it completed
    #[error("Turn cancelled")]
    Cancelled,

    /// Anything else
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RelayError {
    /// Build an `ApiError` without details.
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// HTTP status reported by the remote service, when there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True for errors raised by the remote service or the transport to it.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_)
                | Self::ApiError { .. }
                | Self::StreamError(_)
                | Self::RunFailed { .. }
        )
    }

    /// Short description suitable for returning to an HTTP client.
    pub fn user_message(&self) -> String {
        match self {
            Self::ApiError { code, message, .. } => format!("upstream error {code}: {message}"),
            Self::RunFailed { status, .. } => format!("assistant run {status}"),
            Self::ToolRoundLimit(limit) => format!("tool round limit of {limit} exceeded"),
            Self::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::api_error(status.as_u16(), err.to_string()),
            None => Self::HttpError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_exposes_status() {
        let err = RelayError::api_error(404, "No thread found with id 'thread_x'.");
        assert_eq!(err.status_code(), Some(404));
        assert!(err.is_upstream());
        assert_eq!(
            err.user_message(),
            "upstream error 404: No thread found with id 'thread_x'."
        );
    }

    #[test]
    fn local_errors_are_not_upstream() {
        assert!(!RelayError::ToolRoundLimit(8).is_upstream());
        assert!(!RelayError::MissingApiKey("OPENAI_API_KEY".into()).is_upstream());
        assert_eq!(RelayError::Cancelled.status_code(), None);
    }

    #[test]
    fn serde_errors_become_parse_errors() {
        let err: RelayError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, RelayError::ParseError(_)));
    }
}
