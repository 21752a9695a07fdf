//! Failure taxonomy and user-facing descriptors for the run summary.

use crate::fetch::PageFailure;

/// Stage-level failure classes reported per chapter (or per run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    /// The session rejected the credentials; nothing could be processed.
    Authentication,
    /// Catalog unreadable or empty; nothing could be processed.
    Discovery,
    /// Every extraction strategy came back empty, or the page never rendered.
    Extraction,
    /// One image's retries were exhausted on network or HTTP errors.
    Fetch,
    /// A payload arrived but never validated as an image.
    Validation,
    /// Zero usable pages, a page that would not normalize, or a write error.
    Assembly,
    /// The manifest could not be written.
    Publish,
}

impl FailureKind {
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Authentication => "🔐",
            Self::Discovery => "🧭",
            Self::Extraction => "🔎",
            Self::Fetch => "🌐",
            Self::Validation => "🖼️",
            Self::Assembly => "📦",
            Self::Publish => "📄",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Authentication => "AuthenticationFailure",
            Self::Discovery => "DiscoveryFailure",
            Self::Extraction => "ExtractionFailure",
            Self::Fetch => "FetchFailure",
            Self::Validation => "ValidationFailure",
            Self::Assembly => "AssemblyFailure",
            Self::Publish => "PublishFailure",
        }
    }

    #[must_use]
    pub fn descriptor(self) -> FailureDescriptor {
        let (what, why, fix) = match self {
            Self::Authentication => (
                "Login rejected",
                "The source did not accept the username and password.",
                "Check CHAPTER_BINDER_USERNAME and CHAPTER_BINDER_PASSWORD, or run without them.",
            ),
            Self::Discovery => (
                "Content could not be discovered",
                "The catalog page did not render or listed no chapters.",
                "Check the content id and --source, then rerun.",
            ),
            Self::Extraction => (
                "No image URLs found",
                "The chapter page did not render, or no extraction strategy matched its markup.",
                "Rerun later; if it persists the source layout changed or needs a browser session.",
            ),
            Self::Fetch => (
                "Image download failed",
                "The image host kept failing or refused the request after every retry.",
                "Rerun to resume; cached pages are kept. Raise -r for flaky hosts.",
            ),
            Self::Validation => (
                "Downloaded image was invalid",
                "The host returned something that is not a decodable image (often an error page).",
                "Rerun with --overwrite to refetch; check whether the source blocks hot-linking.",
            ),
            Self::Assembly => (
                "Chapter document not built",
                "No usable pages remained, a page failed to decode, or the output was not writable.",
                "Check free disk space and permissions, then rerun with --overwrite.",
            ),
            Self::Publish => (
                "Manifest not written",
                "The documents directory could not be scanned or index.json could not be written.",
                "Check permissions on the output directory and rerun.",
            ),
        };
        FailureDescriptor {
            kind: self,
            what,
            why,
            fix,
        }
    }
}

/// What went wrong, why, and what to do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureDescriptor {
    pub kind: FailureKind,
    pub what: &'static str,
    pub why: &'static str,
    pub fix: &'static str,
}

/// Kind of a page that was given up on.
fn page_failure_kind(failure: &PageFailure) -> FailureKind {
    if failure.invalid_payload {
        FailureKind::Validation
    } else {
        FailureKind::Fetch
    }
}

/// Chapter-level kind for a set of page failures: validation only when every
/// failure was an invalid payload.
#[must_use]
pub fn chapter_fetch_failure_kind(failures: &[PageFailure]) -> FailureKind {
    let mut kinds = failures.iter().map(page_failure_kind);
    match kinds.next() {
        Some(FailureKind::Validation) if kinds.all(|k| k == FailureKind::Validation) => {
            FailureKind::Validation
        }
        _ => FailureKind::Fetch,
    }
}
