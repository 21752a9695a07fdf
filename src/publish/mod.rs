//! Manifest publishing.
//!
//! The [`IndexPublisher`] scans a content item's documents directory, derives
//! one [`IndexEntry`] per chapter document (PDF or CBZ) from filesystem
//! metadata and the document's page structure, and writes the whole manifest
//! again as `index.json`. Image data is never decoded.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::assemble::{DocumentFormat, count_pages};
use crate::fs_util::write_atomic;
use crate::layout::{MANIFEST_FILE_NAME, parse_chapter_stem};
use crate::model::{ChapterId, IndexEntry};

/// Errors raised while publishing the manifest.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The documents directory could not be listed.
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest could not be serialized.
    #[error("cannot serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The manifest file could not be written.
    #[error("cannot write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The manifest document consumed by presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
}

/// Builds and writes manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexPublisher;

impl IndexPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Lists the chapter documents in `documents_dir`, sorted by sequence.
    ///
    /// Files that are not named like a chapter document, or that cannot be
    /// read as one, are skipped with a warning. A missing directory yields
    /// no entries.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Scan`] when the directory cannot be listed.
    pub fn scan(&self, documents_dir: &Path) -> Result<Vec<IndexEntry>, PublishError> {
        let scan_error = |source| PublishError::Scan {
            path: documents_dir.to_path_buf(),
            source,
        };
        let reader = match fs::read_dir(documents_dir) {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(scan_error(e)),
        };

        let mut entries = Vec::new();
        for dir_entry in reader {
            let path = dir_entry.map_err(scan_error)?.path();
            if DocumentFormat::from_path(&path).is_none() {
                continue;
            }

            match index_entry(&path) {
                Some(entry) => entries.push(entry),
                None => warn!(path = %path.display(), "skipping unrecognized document"),
            }
        }

        entries.sort_by(|a, b| {
            a.chapter_id
                .cmp(&b.chapter_id)
                .then_with(|| a.document_path.cmp(&b.document_path))
        });
        debug!(count = entries.len(), "documents scanned");
        Ok(entries)
    }

    /// Rebuilds the manifest for `documents_dir` and writes it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when scanning, serializing or writing fails.
    #[instrument(skip(self), fields(dir = %documents_dir.display()))]
    pub fn publish(&self, documents_dir: &Path, title: &str) -> Result<(PathBuf, Manifest), PublishError> {
        let manifest = Manifest {
            title: title.to_string(),
            generated_at: Utc::now(),
            entries: self.scan(documents_dir)?,
        };

        let path = documents_dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_string_pretty(&manifest)?;
        write_atomic(&path, json.as_bytes()).map_err(|source| PublishError::Write {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), entries = manifest.entries.len(), "manifest published");
        Ok((path, manifest))
    }
}

/// Derives the manifest row for one document; `None` when its name or
/// contents are not recognized.
fn index_entry(path: &Path) -> Option<IndexEntry> {
    let stem = path.file_stem()?.to_str()?;
    let (sequence_index, title) = parse_chapter_stem(stem)?;
    let metadata = fs::metadata(path).ok()?;
    let page_count = match count_pages(path) {
        Ok(count) => count,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable document");
            return None;
        }
    };

    Some(IndexEntry {
        chapter_id: ChapterId::from_sequence(sequence_index),
        title,
        page_count,
        file_size_bytes: metadata.len(),
        modified_at: metadata.modified().ok().map(DateTime::<Utc>::from)?,
        document_path: PathBuf::from(path.file_name()?),
    })
}

/// Opens `path` with the platform's default handler without waiting for it.
///
/// # Errors
///
/// Returns the spawn error when no handler could be started.
pub fn open_in_default_app(path: &Path) -> std::io::Result<()> {
    if cfg!(target_os = "windows") {
        Command::new("explorer").arg(path).spawn()?;
        return Ok(());
    }
    if cfg!(target_os = "macos") {
        Command::new("open").arg(path).spawn()?;
        return Ok(());
    }
    Command::new("xdg-open").arg(path).spawn()?;
    Ok(())
}
