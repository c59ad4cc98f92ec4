//! Error types for the `omnitrade` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, ExchangeError>`.
//!
//! [`ExchangeError`] covers:
//! - **Venue errors** — Structured error payloads tunnelled through the venue API
//! - **HTTP status errors** — Unexpected status codes with response body
//! - **HTTP transport errors** — Network, TLS, timeout failures
//! - **JSON errors** — Deserialization failures
//! - **WebSocket errors** — Connection and protocol errors
//! - **URL errors** — Malformed URL construction
//! - **Signature errors** — Credential/HMAC failures
//! - **Invalid arguments** — Client-side validation errors
//! - **Configuration errors** — Fatal misconfiguration detected at start

use std::fmt;

/// Structured error payload returned by a venue API.
///
/// Some venues tunnel failures inside `200 OK` JSON bodies; the adapter's
/// success predicate detects those and they surface here as well.
#[derive(Debug, Clone)]
pub struct VenueErrorBody {
    /// Venue-specific error code (e.g. `"51001"`).
    pub code: Option<String>,
    /// Human-readable description of the error.
    pub message: Option<String>,
}

impl fmt::Display for VenueErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.code.as_deref().unwrap_or("UNKNOWN"),
            self.message.as_deref().unwrap_or("no message"),
        )
    }
}

/// All possible errors produced by the `omnitrade` session core.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// An error response returned by the venue API.
    #[error("venue error: {0}")]
    Api(VenueErrorBody),

    /// The server returned an unexpected HTTP status code.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: reqwest::StatusCode,
        /// The response body text.
        body: String,
    },

    /// A network or transport-level error from `reqwest`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to deserialize a JSON payload.
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Credential material could not be used to sign a request.
    #[error("signature error: {0}")]
    Signature(String),

    /// The caller provided an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The session configuration is invalid. Fatal at start.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ExchangeError>;
