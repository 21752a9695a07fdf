//! Image fetching: HTTP client, retry policy, payload validation and the
//! concurrent per-chapter fetcher.

mod client;
pub mod constants;
mod engine;
mod error;
mod retry;
mod validate;

pub(crate) use client::build_http_client;
pub use client::HttpClient;
pub use engine::{
    ChapterFetchOutcome, EngineError, FetchOptions, FetchStats, ImageFetcher, PageFailure,
    page_file_stem,
};
pub use error::DownloadError;
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use validate::{extension_for, validate_cached_file, validate_payload};
