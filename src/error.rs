//! Error types for geobot.

use thiserror::Error;

/// Result type alias using the geobot error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the bot.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Geocoding provider error (distinct from "no results", which is an absence)
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    /// Outbound message delivery failure
    #[error(transparent)]
    Send(#[from] SendError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the geocoding provider.
///
/// A lookup that succeeds but matches nothing is *not* an error; it is
/// reported as `Ok(None)` by the client. These variants cover transport
/// failures (including timeouts), non-success HTTP statuses, and
/// provider-level status codes other than `OK` / `ZERO_RESULTS`.
#[derive(Error, Debug)]
pub enum GeocodeError {
    /// Network failure, timeout, or unparseable response body
    #[error("Geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the provider
    #[error("Geocoding endpoint returned HTTP {0}")]
    Endpoint(u16),

    /// Provider status other than OK / ZERO_RESULTS (e.g. OVER_QUERY_LIMIT)
    #[error("Geocoding provider returned status {0}")]
    Provider(String),
}

/// Errors from the Messenger Send API.
#[derive(Error, Debug)]
pub enum SendError {
    /// Network failure or timeout
    #[error("Send request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the Send API
    #[error("Send API error ({status}): {body}")]
    Api { status: u16, body: String },
}
