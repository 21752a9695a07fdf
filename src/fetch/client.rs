//! HTTP client wrapper for image fetches.
//!
//! The [`HttpClient`] is created once per run and cloned into worker tasks,
//! sharing one connection pool and (optionally) the session cookie jar.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, REFERER};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, FETCH_TIMEOUT_SECS, IMAGE_ACCEPT};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for fetching image payloads into memory.
///
/// # Example
///
/// ```no_run
/// use binder_core::fetch::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let bytes = client
///     .fetch_bytes("https://img.example.com/001.jpg", None, 64 * 1024 * 1024)
///     .await?;
/// println!("{} bytes", bytes.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with default timeouts and no cookie jar.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_options(None, CONNECT_TIMEOUT_SECS, FETCH_TIMEOUT_SECS)
    }

    /// Creates a client sharing `cookie_jar` with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    #[instrument(level = "debug", skip(cookie_jar))]
    pub fn with_options(
        cookie_jar: Option<Arc<Jar>>,
        connect_timeout_secs: u64,
        fetch_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(cookie_jar, connect_timeout_secs, fetch_timeout_secs)?;
        Ok(Self { client })
    }

    /// Fetches `url` into memory, refusing payloads larger than `max_bytes`.
    ///
    /// `referer` is sent as the `Referer` header; image hosts for comic
    /// readers commonly refuse hot-linked requests without it.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for malformed URLs, network failures,
    /// timeouts, non-success statuses and oversized payloads.
    #[instrument(skip(self, referer), fields(url = %url))]
    pub async fn fetch_bytes(
        &self,
        url: &str,
        referer: Option<&str>,
        max_bytes: u64,
    ) -> Result<Vec<u8>, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let mut request = self.client.get(parsed).header(ACCEPT, IMAGE_ACCEPT);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(|e| map_send_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        if let Some(length) = response.content_length()
            && length > max_bytes
        {
            return Err(DownloadError::payload_too_large(url, max_bytes));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_send_error(url, e))?;
            if body.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(DownloadError::payload_too_large(url, max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(bytes = body.len(), "payload received");
        Ok(body)
    }
}

fn map_send_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

/// Builds the shared reqwest client used by image fetches and the HTTP session.
///
/// # Errors
///
/// Returns the builder error if the TLS backend cannot be initialized.
pub(crate) fn build_http_client(
    cookie_jar: Option<Arc<Jar>>,
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent());
    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }
    builder.build()
}
