//! Error types for image fetches.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching one image.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while storing the image.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The payload arrived but is not an acceptable image.
    #[error("validation failed for {url}: {reason}")]
    Validation {
        /// The URL whose payload was rejected.
        url: String,
        /// Why the payload was rejected.
        reason: String,
    },

    /// The payload exceeded the hard size ceiling.
    #[error("payload from {url} exceeds {limit_bytes} bytes")]
    PayloadTooLarge {
        /// The URL that produced the payload.
        url: String,
        /// The configured ceiling.
        limit_bytes: u64,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a payload validation error.
    pub fn validation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a payload-too-large error.
    pub fn payload_too_large(url: impl Into<String>, limit_bytes: u64) -> Self {
        Self::PayloadTooLarge {
            url: url.into(),
            limit_bytes,
        }
    }

    /// Returns true when the payload was received but rejected as an image.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

// No From<reqwest::Error>/From<io::Error>: every variant needs the url or path
// as context, which the source errors do not carry.
