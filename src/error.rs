//! Error types for dnspod-ddns.

use thiserror::Error;

/// Result type alias for dnspod-ddns.
pub type Result<T> = std::result::Result<T, DdnsError>;

/// DDNS error types.
#[derive(Error, Debug)]
pub enum DdnsError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with a non-OK status code.
    #[error("Provider error (code {code}): {message}")]
    Api { code: String, message: String },

    /// The provider rejected the request at the HTTP level (4xx).
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The provider answered with a body we could not make sense of.
    #[error("Malformed response: {0}")]
    Parse(String),

    /// IP detection error.
    #[error("IP detection failed: {0}")]
    IpDetection(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DdnsError {
    /// Whether the failure happened on the wire (connect, timeout, reset, 5xx).
    ///
    /// Only these are worth retrying; `Api` and `HttpStatus` errors come back
    /// the same.
    pub fn is_transport(&self) -> bool {
        matches!(self, DdnsError::Network(_))
    }
}

impl From<reqwest::Error> for DdnsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DdnsError::Parse(e.to_string())
        } else {
            DdnsError::Network(e.to_string())
        }
    }
}

impl From<toml::de::Error> for DdnsError {
    fn from(e: toml::de::Error) -> Self {
        DdnsError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for DdnsError {
    fn from(e: toml::ser::Error) -> Self {
        DdnsError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for DdnsError {
    fn from(e: serde_json::Error) -> Self {
        DdnsError::Serialization(e.to_string())
    }
}
