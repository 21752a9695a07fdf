//! Core data model shared by every pipeline stage.
//!
//! Records flow leaves-first: [`ChapterDescriptor`] from discovery,
//! [`ImageReference`] from extraction, [`FetchedImage`] from the fetcher,
//! [`ChapterDocument`] from the assembler and [`IndexEntry`] from the publisher.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable chapter identifier, derived from the catalog sequence (`ch0001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(String);

impl ChapterId {
    /// Builds the identifier for a 1-based catalog sequence index.
    #[must_use]
    pub fn from_sequence(sequence_index: u32) -> Self {
        Self(format!("ch{sequence_index:04}"))
    }

    /// Parses the sequence index back out of an identifier.
    #[must_use]
    pub fn sequence_index(&self) -> Option<u32> {
        self.0.strip_prefix("ch")?.parse().ok()
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chapter as listed in the content catalog. Immutable after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDescriptor {
    pub id: ChapterId,
    pub title: String,
    /// 1-based position in catalog order.
    pub sequence_index: u32,
    /// Page reference handed to the session for rendering (URL or anchor id).
    pub source_page_ref: String,
}

impl ChapterDescriptor {
    #[must_use]
    pub fn new(
        sequence_index: u32,
        title: impl Into<String>,
        source_page_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: ChapterId::from_sequence(sequence_index),
            title: title.into(),
            sequence_index,
            source_page_ref: source_page_ref.into(),
        }
    }
}

/// Ordered image reference extracted for one chapter.
///
/// `page_index` is dense (`0..n`) within a chapter and defines document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub chapter_id: ChapterId,
    pub page_index: usize,
    pub url: String,
    /// Name of the extraction strategy that produced this reference.
    pub strategy_used: String,
}

/// A validated image stored in chapter-scoped storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub chapter_id: ChapterId,
    pub page_index: usize,
    pub local_path: PathBuf,
    pub byte_size: u64,
    /// Lowercase hex SHA-256 of the stored bytes.
    pub content_hash: String,
    /// Network attempts spent on this image; 0 when reused from cache.
    pub attempt_count: u32,
}

/// A fully written chapter document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDocument {
    pub chapter_id: ChapterId,
    pub path: PathBuf,
    pub page_count: usize,
    pub byte_size: u64,
    pub created_at: SystemTime,
}

/// One manifest row, derived from a document on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chapter_id: ChapterId,
    pub title: String,
    pub page_count: usize,
    pub file_size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub document_path: PathBuf,
}

/// A page dropped under the lenient partial-failure policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageGap {
    pub page_index: usize,
    pub url: String,
    pub attempts: u32,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_id_is_zero_padded() {
        assert_eq!(ChapterId::from_sequence(7).as_str(), "ch0007");
        assert_eq!(ChapterId::from_sequence(1234).to_string(), "ch1234");
    }

    #[test]
    fn test_chapter_id_sequence_round_trip() {
        let id = ChapterId::from_sequence(42);
        assert_eq!(id.sequence_index(), Some(42));
    }

    #[test]
    fn test_chapter_id_orders_by_sequence() {
        assert!(ChapterId::from_sequence(9) < ChapterId::from_sequence(10));
    }

    #[test]
    fn test_descriptor_derives_id_from_sequence() {
        let chapter = ChapterDescriptor::new(3, "Volume 1", "c-3");
        assert_eq!(chapter.id, ChapterId::from_sequence(3));
        assert_eq!(chapter.sequence_index, 3);
    }
}
