//! Constants for the fetch module (timeouts, payload bounds, concurrency).

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout for one image fetch (20 seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 20;

/// Default minimum payload size accepted as an image (1 KiB).
pub const DEFAULT_MIN_PAYLOAD_BYTES: u64 = 1024;

/// Hard ceiling for one image payload (64 MiB).
pub const MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// `Accept` header sent with image requests.
pub const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;
