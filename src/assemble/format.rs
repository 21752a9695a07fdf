//! Chapter document formats and format-independent inspection.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{cbz, pdf};

/// Container a chapter's pages are packed into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// One image page per PDF page, sized from the page's pixel density.
    #[default]
    Pdf,
    /// A ZIP of JPEG pages plus `ComicInfo.xml`.
    Cbz,
}

impl DocumentFormat {
    pub const ALL: [Self; 2] = [Self::Pdf, Self::Cbz];

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Cbz => "cbz",
        }
    }

    /// Format named by the extension of `path`, if any.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(extension))
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown format '{s}' (expected pdf or cbz)"))
    }
}

/// Errors raised while reading a finished document back.
#[derive(Debug, Error)]
pub enum DocumentReadError {
    #[error("{path} is not a chapter document")]
    UnknownFormat { path: PathBuf },

    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("unreadable pdf {path}: {reason}")]
    Pdf { path: PathBuf, reason: String },
}

fn format_of(path: &Path) -> Result<DocumentFormat, DocumentReadError> {
    DocumentFormat::from_path(path).ok_or_else(|| DocumentReadError::UnknownFormat {
        path: path.to_path_buf(),
    })
}

fn archive_error(path: &Path) -> impl FnOnce(zip::result::ZipError) -> DocumentReadError + '_ {
    move |source| DocumentReadError::Archive {
        path: path.to_path_buf(),
        source,
    }
}

fn pdf_error(path: &Path) -> impl FnOnce(lopdf::Error) -> DocumentReadError + '_ {
    move |e| DocumentReadError::Pdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Source page numbers (1-based) packed into the document, in document order.
///
/// # Errors
///
/// Returns [`DocumentReadError`] when the file is not a readable document.
pub fn packed_pages(path: &Path) -> Result<Vec<usize>, DocumentReadError> {
    match format_of(path)? {
        DocumentFormat::Cbz => cbz::page_numbers(path).map_err(archive_error(path)),
        DocumentFormat::Pdf => {
            let document = lopdf::Document::load(path).map_err(pdf_error(path))?;
            pdf::page_numbers(&document).map_err(pdf_error(path))
        }
    }
}

/// Number of pages in the document.
///
/// # Errors
///
/// Returns [`DocumentReadError`] when the file is not a readable document.
pub fn count_pages(path: &Path) -> Result<usize, DocumentReadError> {
    match format_of(path)? {
        DocumentFormat::Cbz => cbz::page_numbers(path)
            .map(|pages| pages.len())
            .map_err(archive_error(path)),
        DocumentFormat::Pdf => {
            let document = lopdf::Document::load(path).map_err(pdf_error(path))?;
            Ok(document.get_pages().len())
        }
    }
}

/// The encoded page images, in document order.
///
/// # Errors
///
/// Returns [`DocumentReadError`] when the file or a page cannot be read.
pub fn read_pages(path: &Path) -> Result<Vec<Vec<u8>>, DocumentReadError> {
    match format_of(path)? {
        DocumentFormat::Cbz => {
            let file = File::open(path).map_err(|source| DocumentReadError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            let pages = cbz::read_entries(file).map_err(archive_error(path))?;
            Ok(pages.into_iter().map(|(_, bytes)| bytes).collect())
        }
        DocumentFormat::Pdf => {
            let document = lopdf::Document::load(path).map_err(pdf_error(path))?;
            pdf::page_images(&document).map_err(pdf_error(path))
        }
    }
}
