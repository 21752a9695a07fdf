//! Rendered-page capability consumed by discovery and extraction.
//!
//! The pipeline never talks to a browser directly. It holds one
//! [`BrowserSession`] value (owned by the orchestrator) exposing two blocking
//! operations: authenticate, and render a page reference into its markup.
//!
//! Implementations may block; async callers must invoke them from
//! `tokio::task::spawn_blocking` (see [`render_blocking`]).

mod http;

pub use http::{HttpSession, LoginForm};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::fetch::{FailureType, RetryDecision, RetryPolicy};

/// Default per-render timeout.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Login credentials loaded at process start. Never logged or persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A page as rendered by the session: final URL plus DOM/script markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub url: Url,
    pub html: String,
}

impl RenderedPage {
    #[must_use]
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
        }
    }
}

/// Errors raised by a [`BrowserSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// Rendering did not finish within the per-operation timeout.
    #[error("timeout rendering {page_ref}")]
    Timeout {
        /// The page reference being rendered.
        page_ref: String,
    },

    /// Network-level failure while talking to the source.
    #[error("network error rendering {page_ref}: {source}")]
    Network {
        /// The page reference being rendered.
        page_ref: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The source answered with an error status.
    #[error("HTTP {status} rendering {page_ref}")]
    HttpStatus {
        /// The page reference being rendered.
        page_ref: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The page reference cannot be rendered by this session backend.
    #[error("unsupported page reference: {page_ref}")]
    UnsupportedPageRef {
        /// The rejected page reference.
        page_ref: String,
    },

    /// Login was rejected or produced no session.
    #[error("authentication failed: {reason}")]
    Authentication {
        /// Why the login was considered failed.
        reason: String,
    },

    /// The session backend is not usable (runtime missing, worker crashed).
    #[error("session unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },
}

impl SessionError {
    pub fn timeout(page_ref: impl Into<String>) -> Self {
        Self::Timeout {
            page_ref: page_ref.into(),
        }
    }

    pub fn network(page_ref: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            page_ref: page_ref.into(),
            source,
        }
    }

    pub fn http_status(page_ref: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            page_ref: page_ref.into(),
            status,
        }
    }

    pub fn unsupported(page_ref: impl Into<String>) -> Self {
        Self::UnsupportedPageRef {
            page_ref: page_ref.into(),
        }
    }

    pub fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Classifies the error for render retries. Timeouts count as one failed attempt.
    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => FailureType::Transient,
            Self::HttpStatus { status, .. } => match status {
                408 | 500..=599 => FailureType::Transient,
                429 => FailureType::RateLimited,
                401 | 403 => FailureType::NeedsAuth,
                _ => FailureType::Permanent,
            },
            Self::UnsupportedPageRef { .. } | Self::Unavailable { .. } => FailureType::Permanent,
            Self::Authentication { .. } => FailureType::NeedsAuth,
        }
    }
}

/// Synchronous capability over an authenticated browsing session.
pub trait BrowserSession: Send + Sync {
    /// Establishes an authenticated session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Authentication`] when the login is rejected.
    fn authenticate(&self, credentials: &Credentials) -> Result<(), SessionError>;

    /// Renders a page reference and returns its DOM/script content.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the page cannot be rendered.
    fn render(&self, page_ref: &str) -> Result<RenderedPage, SessionError>;
}

/// Runs [`BrowserSession::render`] on the blocking pool.
///
/// # Errors
///
/// Propagates the session error, or [`SessionError::Unavailable`] if the
/// blocking task panicked.
pub async fn render_blocking(
    session: &Arc<dyn BrowserSession>,
    page_ref: &str,
) -> Result<RenderedPage, SessionError> {
    let session = Arc::clone(session);
    let page_ref_owned = page_ref.to_string();
    tokio::task::spawn_blocking(move || session.render(&page_ref_owned))
        .await
        .map_err(|e| SessionError::unavailable(format!("render task failed: {e}")))?
}

/// Runs [`BrowserSession::authenticate`] on the blocking pool.
///
/// # Errors
///
/// Propagates the session error, or [`SessionError::Unavailable`] if the
/// blocking task panicked.
pub async fn authenticate_blocking(
    session: &Arc<dyn BrowserSession>,
    credentials: &Credentials,
) -> Result<(), SessionError> {
    let session = Arc::clone(session);
    let credentials = credentials.clone();
    tokio::task::spawn_blocking(move || session.authenticate(&credentials))
        .await
        .map_err(|e| SessionError::unavailable(format!("authentication task failed: {e}")))?
}

/// Renders a page, retrying transient failures under `policy`.
///
/// Returns the page together with the number of attempts made; on failure the
/// last error and the attempt count.
///
/// # Errors
///
/// Returns the final [`SessionError`] once the policy stops retrying.
#[tracing::instrument(skip(session, policy), fields(max_attempts = policy.max_attempts()))]
pub async fn render_with_retry(
    session: &Arc<dyn BrowserSession>,
    page_ref: &str,
    policy: &RetryPolicy,
) -> Result<(RenderedPage, u32), (SessionError, u32)> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match render_blocking(session, page_ref).await {
            Ok(page) => {
                debug!(attempt, url = %page.url, "page rendered");
                return Ok((page, attempt));
            }
            Err(error) => match policy.should_retry(error.failure_type(), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        page_ref,
                        attempt = next_attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying page render"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(page_ref, %reason, "not retrying page render");
                    return Err((error, attempt));
                }
            },
        }
    }
}
