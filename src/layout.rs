//! On-disk layout for one content item.
//!
//! ```text
//! <output>/<Title>_<id>/
//!     <Title>_<id>-urls/ch0001 - <chapter>.txt     URL list checkpoints
//!     <Title>_<id>-pages/ch0001 - <chapter>/      fetched page cache
//!     <Title>_<id>-pdf/ch0001 - <chapter>.pdf     chapter documents
//!     <Title>_<id>-pdf/index.json                 manifest
//! ```
//!
//! The documents directory and extension follow the document format
//! (`-cbz`/`.cbz` for CBZ output).

use std::path::{Path, PathBuf};

use crate::assemble::DocumentFormat;
use crate::model::ChapterDescriptor;

/// Maximum characters kept from a title in a path segment.
pub const MAX_TITLE_CHARS: usize = 80;

/// Manifest file name inside the documents directory.
pub const MANIFEST_FILE_NAME: &str = "index.json";

/// Path derivation for one content item under an output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLayout {
    book_dir: PathBuf,
    book_name: String,
    format: DocumentFormat,
}

impl BookLayout {
    /// Creates the layout for `title`/`content_id` under `output_dir`.
    #[must_use]
    pub fn new(output_dir: &Path, title: &str, content_id: &str, format: DocumentFormat) -> Self {
        let book_name = format!(
            "{}_{}",
            sanitize_title(title),
            sanitize_title(content_id)
        );
        Self {
            book_dir: output_dir.join(&book_name),
            book_name,
            format,
        }
    }

    #[must_use]
    pub fn book_dir(&self) -> &Path {
        &self.book_dir
    }

    #[must_use]
    pub fn urls_dir(&self) -> PathBuf {
        self.book_dir.join(format!("{}-urls", self.book_name))
    }

    #[must_use]
    pub fn pages_dir(&self) -> PathBuf {
        self.book_dir.join(format!("{}-pages", self.book_name))
    }

    #[must_use]
    pub fn documents_dir(&self) -> PathBuf {
        self.book_dir
            .join(format!("{}-{}", self.book_name, self.format.extension()))
    }

    #[must_use]
    pub fn url_list_path(&self, chapter: &ChapterDescriptor) -> PathBuf {
        self.urls_dir().join(format!("{}.txt", chapter_stem(chapter)))
    }

    #[must_use]
    pub fn page_cache_dir(&self, chapter: &ChapterDescriptor) -> PathBuf {
        self.pages_dir().join(chapter_stem(chapter))
    }

    #[must_use]
    pub fn document_path(&self, chapter: &ChapterDescriptor) -> PathBuf {
        self.documents_dir()
            .join(format!("{}.{}", chapter_stem(chapter), self.format.extension()))
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.documents_dir().join(MANIFEST_FILE_NAME)
    }
}

/// File stem shared by a chapter's URL list, page cache and document.
#[must_use]
pub fn chapter_stem(chapter: &ChapterDescriptor) -> String {
    format!(
        "{} - {}",
        chapter.id,
        sanitize_title(&chapter.title)
    )
}

/// Splits a chapter stem (`ch0012 - Title`) into its sequence index and title.
#[must_use]
pub fn parse_chapter_stem(stem: &str) -> Option<(u32, String)> {
    let (id_part, title) = stem.split_once(" - ")?;
    let digits = id_part.strip_prefix("ch")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, title.to_string()))
}

/// Sanitizes a display title for use as a single path segment.
///
/// Reserved path characters become `_`, whitespace runs collapse to one space,
/// leading/trailing dots and spaces are removed.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::new();
    let mut previous_space = false;

    for ch in title.trim().chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => continue,
            c if c.is_whitespace() => ' ',
            c => c,
        };

        if mapped == ' ' {
            if !previous_space {
                out.push(' ');
            }
            previous_space = true;
        } else {
            out.push(mapped);
            previous_space = false;
        }
    }

    let truncated: String = out.chars().take(MAX_TITLE_CHARS).collect();
    let cleaned = truncated.trim_matches(|c: char| c == '.' || c == ' ');
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}
