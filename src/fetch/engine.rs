//! Concurrent page fetcher with per-image retry and a validated page cache.
//!
//! One [`ImageFetcher`] is created per run. For each chapter it spawns one
//! Tokio task per [`ImageReference`], gated by a semaphore, and waits for
//! every task before returning (the completion barrier). Tasks only share the
//! atomic [`FetchStats`]; each returns its own outcome through its join handle.
//!
//! Cached pages live in the chapter's page directory as `page-NNNN.<ext>`.
//! A cached page is reused when it still validates, unless overwrite is set.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::constants::{
    DEFAULT_MIN_PAYLOAD_BYTES, MAX_CONCURRENCY, MAX_PAYLOAD_BYTES, MIN_CONCURRENCY,
};
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::validate::{extension_for, validate_cached_file, validate_payload};
use super::{DownloadError, HttpClient};
use crate::fs_util::temp_path_for;
use crate::model::{ChapterId, FetchedImage, ImageReference, PageGap};

/// Extensions tried when looking for a cached page.
const CACHE_EXTENSIONS: [&str; 5] = ["jpg", "png", "webp", "gif", "bmp"];

/// Error type for fetcher setup and chapter-level failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The chapter's page directory could not be created.
    #[error("cannot create page cache {path}: {source}")]
    CacheDir {
        /// The directory that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Counters accumulated across every chapter of a run.
#[derive(Debug, Default)]
pub struct FetchStats {
    fetched: AtomicUsize,
    reused: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
}

impl FetchStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages downloaded over the network.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }

    /// Pages served from a valid cache entry.
    #[must_use]
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::SeqCst)
    }

    /// Pages whose retries were exhausted.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Retry attempts made (attempts beyond the first).
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    fn increment_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_reused(&self) {
        self.reused.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tunables for page fetching.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Ignore cached pages and fetch everything again.
    pub overwrite: bool,
    /// Payloads at or below this size are rejected.
    pub min_payload_bytes: u64,
    /// Payloads above this size are rejected.
    pub max_payload_bytes: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            min_payload_bytes: DEFAULT_MIN_PAYLOAD_BYTES,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

/// One page whose fetch was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub page_index: usize,
    pub url: String,
    pub attempts: u32,
    pub reason: String,
    /// True when the last attempt delivered a payload that was not a usable image.
    pub invalid_payload: bool,
}

impl PageFailure {
    fn from_error(reference: &ImageReference, error: &DownloadError, attempts: u32) -> Self {
        Self {
            page_index: reference.page_index,
            url: reference.url.clone(),
            attempts,
            reason: error.to_string(),
            invalid_payload: error.is_validation(),
        }
    }

    /// The gap recorded when this page is dropped under the lenient policy.
    #[must_use]
    pub fn to_gap(&self) -> PageGap {
        PageGap {
            page_index: self.page_index,
            url: self.url.clone(),
            attempts: self.attempts,
            reason: self.reason.clone(),
        }
    }
}

/// Everything the barrier collected for one chapter, ordered by page index.
#[derive(Debug, Default)]
pub struct ChapterFetchOutcome {
    pub images: Vec<FetchedImage>,
    pub failures: Vec<PageFailure>,
}

impl ChapterFetchOutcome {
    /// True when every reference produced a stored image.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of pages that needed the network.
    #[must_use]
    pub fn network_pages(&self) -> usize {
        self.images.iter().filter(|i| i.attempt_count > 0).count() + self.failures.len()
    }
}

/// Downloads, validates and caches the images of a chapter.
#[derive(Debug)]
pub struct ImageFetcher {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
    client: HttpClient,
    options: FetchOptions,
    stats: Arc<FetchStats>,
}

impl ImageFetcher {
    /// Creates a fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is outside
    /// 1..=100.
    #[instrument(level = "debug", skip(retry_policy, client, options))]
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        client: HttpClient,
        options: FetchOptions,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            overwrite = options.overwrite,
            "creating image fetcher"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            client,
            options,
            stats: Arc::new(FetchStats::new()),
        })
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Counters accumulated over every chapter fetched so far.
    #[must_use]
    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// Fetches every reference of one chapter into `cache_dir`.
    ///
    /// Returns only after all page tasks have finished. Individual page
    /// failures are reported in the outcome, not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CacheDir`] if the page directory cannot be
    /// created, or [`EngineError::SemaphoreClosed`].
    #[instrument(skip(self, references, referer), fields(chapter = %chapter_id, pages = references.len()))]
    pub async fn fetch_chapter(
        &self,
        chapter_id: &ChapterId,
        references: &[ImageReference],
        cache_dir: &Path,
        referer: Option<&str>,
    ) -> Result<ChapterFetchOutcome, EngineError> {
        tokio::fs::create_dir_all(cache_dir)
            .await
            .map_err(|source| EngineError::CacheDir {
                path: cache_dir.to_path_buf(),
                source,
            })?;

        let mut handles = Vec::with_capacity(references.len());

        for reference in references {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let reference = reference.clone();
            let client = self.client.clone();
            let policy = self.retry_policy.clone();
            let options = self.options.clone();
            let stats = Arc::clone(&self.stats);
            let cache_dir = cache_dir.to_path_buf();
            let referer = referer.map(str::to_string);

            let task_reference = reference.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                fetch_page(
                    &client,
                    &task_reference,
                    &cache_dir,
                    referer.as_deref(),
                    &policy,
                    &options,
                    &stats,
                )
                .await
            });
            handles.push((reference, handle));
        }

        debug!(task_count = handles.len(), "waiting for page tasks");

        let mut outcome = ChapterFetchOutcome::default();
        for (reference, handle) in handles {
            match handle.await {
                Ok(Ok(image)) => outcome.images.push(image),
                Ok(Err(failure)) => outcome.failures.push(failure),
                Err(e) => {
                    warn!(page = reference.page_index, error = %e, "page task panicked");
                    self.stats.increment_failed();
                    outcome.failures.push(PageFailure {
                        page_index: reference.page_index,
                        url: reference.url.clone(),
                        attempts: 0,
                        reason: format!("page task failed: {e}"),
                        invalid_payload: false,
                    });
                }
            }
        }

        outcome.images.sort_by_key(|i| i.page_index);
        outcome.failures.sort_by_key(|f| f.page_index);

        info!(
            stored = outcome.images.len(),
            failed = outcome.failures.len(),
            "chapter fetch complete"
        );
        Ok(outcome)
    }
}

/// Stem of the cached file for a page (`page-0001` for index 0).
#[must_use]
pub fn page_file_stem(page_index: usize) -> String {
    format!("page-{:04}", page_index + 1)
}

/// Finds an existing cache file for `page_index`, whatever its extension.
fn find_cached_page(cache_dir: &Path, page_index: usize) -> Option<PathBuf> {
    let stem = page_file_stem(page_index);
    CACHE_EXTENSIONS
        .iter()
        .map(|ext| cache_dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[instrument(skip_all, fields(page = reference.page_index, url = %reference.url))]
async fn fetch_page(
    client: &HttpClient,
    reference: &ImageReference,
    cache_dir: &Path,
    referer: Option<&str>,
    policy: &RetryPolicy,
    options: &FetchOptions,
    stats: &FetchStats,
) -> Result<FetchedImage, PageFailure> {
    if let Some(existing) = find_cached_page(cache_dir, reference.page_index) {
        let cached = if options.overwrite {
            None
        } else {
            validate_cached_file(&existing, options.min_payload_bytes)
        };
        match cached {
            Some((_, bytes)) => {
                debug!(path = %existing.display(), "reusing cached page");
                stats.increment_reused();
                return Ok(FetchedImage {
                    chapter_id: reference.chapter_id.clone(),
                    page_index: reference.page_index,
                    local_path: existing,
                    byte_size: bytes.len() as u64,
                    content_hash: sha256_hex(&bytes),
                    attempt_count: 0,
                });
            }
            None => {
                debug!(path = %existing.display(), overwrite = options.overwrite, "discarding cached page");
                if let Err(e) = tokio::fs::remove_file(&existing).await {
                    let error = DownloadError::io(&existing, e);
                    stats.increment_failed();
                    return Err(PageFailure::from_error(reference, &error, 0));
                }
            }
        }
    }

    let (bytes, format, attempts) = match fetch_with_retry(client, reference, referer, policy, options, stats).await {
        Ok(fetched) => fetched,
        Err((error, attempts)) => {
            warn!(attempts, error = %error, "page fetch failed after all attempts");
            stats.increment_failed();
            return Err(PageFailure::from_error(reference, &error, attempts));
        }
    };

    let path = cache_dir.join(format!(
        "{}.{}",
        page_file_stem(reference.page_index),
        extension_for(format)
    ));
    if let Err(error) = store_page(&path, &bytes).await {
        stats.increment_failed();
        return Err(PageFailure::from_error(reference, &error, attempts));
    }

    stats.increment_fetched();
    Ok(FetchedImage {
        chapter_id: reference.chapter_id.clone(),
        page_index: reference.page_index,
        local_path: path,
        byte_size: bytes.len() as u64,
        content_hash: sha256_hex(&bytes),
        attempt_count: attempts,
    })
}

/// Fetches and validates one payload. Returns the bytes, the sniffed format
/// and the number of attempts made, or the last error with the attempt count.
async fn fetch_with_retry(
    client: &HttpClient,
    reference: &ImageReference,
    referer: Option<&str>,
    policy: &RetryPolicy,
    options: &FetchOptions,
    stats: &FetchStats,
) -> Result<(Vec<u8>, image::ImageFormat, u32), (DownloadError, u32)> {
    let url = reference.url.as_str();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "attempting page fetch");

        let result = match client.fetch_bytes(url, referer, options.max_payload_bytes).await {
            Ok(bytes) => validate_payload(url, &bytes, options.min_payload_bytes).map(|f| (bytes, f)),
            Err(e) => Err(e),
        };

        match result {
            Ok((bytes, format)) => return Ok((bytes, format, attempt)),
            Err(e) => match policy.should_retry(classify_error(&e), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        url,
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "retrying page fetch"
                    );
                    stats.increment_retried();
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, %reason, "not retrying page fetch");
                    return Err((e, attempt));
                }
            },
        }
    }
}

/// Writes a page through a temporary sibling so a crash never leaves a
/// truncated file under the final name.
async fn store_page(path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    let tmp = temp_path_for(path);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(DownloadError::io(&tmp, e));
    }
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| DownloadError::io(path, e))
}
