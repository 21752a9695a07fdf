//! Shared fixtures: in-process test images, a scripted browsing session and
//! scripted HTTP responders.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use binder_core::{BrowserSession, Credentials, RenderedPage, RetryPolicy, SessionError};
use image::{ImageFormat, Rgb, RgbImage};
use url::Url;
use wiremock::{Respond, ResponseTemplate};

/// PNG of the given size filled with seeded noise, so it never compresses
/// below the minimum payload size.
pub fn noisy_png(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    let img = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Retry policy with short, jitter-free delays.
pub fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(10),
        Duration::from_millis(40),
        2.0,
    )
    .with_jitter(Duration::ZERO)
}

/// Session serving fixed HTML per page reference and counting renders.
#[derive(Debug, Default)]
pub struct StaticSession {
    pages: HashMap<String, String>,
    renders: AtomicUsize,
    logins: AtomicUsize,
}

impl StaticSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

impl BrowserSession for StaticSession {
    fn authenticate(&self, _credentials: &Credentials) -> Result<(), SessionError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn render(&self, page_ref: &str) -> Result<RenderedPage, SessionError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        let html = self
            .pages
            .get(page_ref)
            .ok_or_else(|| SessionError::http_status(page_ref, 404))?;
        let url = Url::parse(page_ref).map_err(|_| SessionError::unsupported(page_ref))?;
        Ok(RenderedPage::new(url, html.clone()))
    }
}

/// 8comic-style catalog listing `(href, name)` chapters in order.
pub fn eight_comic_catalog(title: &str, chapters: &[(&str, &str)]) -> String {
    let anchors: String = chapters
        .iter()
        .enumerate()
        .map(|(i, (href, name))| format!(r#"<a id="c{}" href="{href}">{name}</a>"#, i + 1))
        .collect();
    format!(
        r#"<html><head><meta name="name" content="{title}"></head>
<body><div id="chapters">{anchors}</div></body></html>"#
    )
}

/// Chapter page whose reader container lists `image_urls` in order.
pub fn chapter_page(image_urls: &[String]) -> String {
    let images: String = image_urls
        .iter()
        .map(|u| format!(r#"<img src="{u}">"#))
        .collect();
    format!(r#"<html><body><div id="comics-pics">{images}</div></body></html>"#)
}

/// Fails the first `fail_count` requests with 503, then serves `body`.
pub struct FlakyResponder {
    request_count: Arc<AtomicUsize>,
    fail_count: usize,
    body: Vec<u8>,
}

impl FlakyResponder {
    pub fn new(fail_count: usize, body: Vec<u8>) -> (Self, Arc<AtomicUsize>) {
        let request_count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                request_count: Arc::clone(&request_count),
                fail_count,
                body,
            },
            request_count,
        )
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            ResponseTemplate::new(503).set_body_bytes(b"service unavailable".to_vec())
        } else {
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(self.body.clone())
        }
    }
}

/// Serves `body` after a fixed delay and records when each request arrived.
///
/// A request occupies the host from its arrival until its delayed response
/// goes out, so two requests overlapped when they arrived less than `delay`
/// apart.
pub struct DelayedResponder {
    arrivals: Arc<Mutex<Vec<Instant>>>,
    delay: Duration,
    body: Vec<u8>,
}

impl DelayedResponder {
    pub fn new(delay: Duration, body: Vec<u8>) -> (Self, Arc<Mutex<Vec<Instant>>>) {
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                arrivals: Arc::clone(&arrivals),
                delay,
                body,
            },
            arrivals,
        )
    }
}

impl Respond for DelayedResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/png")
            .set_body_bytes(self.body.clone())
            .set_delay(self.delay)
    }
}

/// Largest number of requests in flight at once, given arrival times and the
/// fixed time each one was held.
pub fn peak_in_flight(arrivals: &[Instant], held_for: Duration) -> usize {
    let mut sorted = arrivals.to_vec();
    sorted.sort();
    (0..sorted.len())
        .map(|i| {
            sorted[..=i]
                .iter()
                .filter(|&&start| sorted[i].duration_since(start) < held_for)
                .count()
        })
        .max()
        .unwrap_or(0)
}
