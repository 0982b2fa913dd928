use thiserror::Error;

/// Errors raised while talking to the signage backend.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Transport failure or timeout.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The body was not the JSON document we expected.
    #[error("Malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The server answered with a non-success status code.
    #[error("{url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// A URL from config, layout, or a feed could not be resolved.
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The backend no longer recognises this display's session.
    #[error("Unauthorized")]
    Unauthorized,
}

pub type Result<T> = std::result::Result<T, PlayerError>;
