//! Document assembly: normalize a chapter's pages and pack them, in page
//! order, into one PDF or CBZ document.
//!
//! A document is rebuilt when it is missing, older than one of its inputs,
//! holds a different page set than the one being assembled, or overwrite is
//! requested. Writes go to a temporary sibling that is renamed into place, so
//! a failed build never leaves a partial document.

mod cbz;
mod density;
mod format;
mod normalize;
mod pdf;

pub use cbz::{COMIC_INFO_ENTRY, ComicInfo, page_entry_name, write_cbz};
pub use density::{DEFAULT_DPI, Dpi, declared_density, effective_density};
pub use format::{DocumentFormat, DocumentReadError, count_pages, packed_pages, read_pages};
pub use normalize::{
    DEFAULT_JPEG_QUALITY, DEFAULT_MAX_EDGE, NormalizeOptions, NormalizedPage, normalize_page,
    target_dimensions,
};
pub use pdf::{SOURCE_PAGES_KEY, build_pdf, page_size_points};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::fs_util::{modified_time, replace_with, temp_path_for};
use crate::model::{ChapterDescriptor, ChapterDocument, ChapterId, FetchedImage};

/// Errors raised while building a chapter document.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// Nothing left to pack.
    #[error("chapter {chapter} has no valid pages to assemble")]
    NoPages { chapter: ChapterId },

    /// A stored page could not be read.
    #[error("cannot read page {path}: {source}")]
    ReadPage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored page could not be decoded or re-encoded.
    #[error("page {page_index} of chapter {chapter} failed normalization: {source}")]
    Normalize {
        chapter: ChapterId,
        page_index: usize,
        #[source]
        source: image::ImageError,
    },

    /// The document could not be written.
    #[error("cannot write document {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive writer failed.
    #[error("cannot build archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// The PDF writer failed.
    #[error("cannot build pdf {path}: {reason}")]
    Pdf { path: PathBuf, reason: String },

    /// The blocking assembly task died.
    #[error("assembly task failed: {reason}")]
    Task { reason: String },
}

/// Whether a document was produced by this call or left as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStatus {
    Built,
    UpToDate,
}

/// Result of assembling one chapter.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub document: ChapterDocument,
    pub status: AssemblyStatus,
}

/// A normalized page and the source page number (1-based) it came from.
#[derive(Debug, Clone)]
pub struct PackedPage {
    pub number: usize,
    pub page: NormalizedPage,
}

/// Everything needed to assemble one chapter.
#[derive(Debug, Clone)]
pub struct AssemblyJob {
    pub chapter: ChapterDescriptor,
    /// Title of the content item, recorded as the series name.
    pub series_title: String,
    /// Pages to pack; sorted by page index before packing.
    pub images: Vec<FetchedImage>,
    /// Files besides the pages whose changes invalidate the document.
    pub extra_inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Builds chapter documents.
#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    options: NormalizeOptions,
    format: DocumentFormat,
    overwrite: bool,
}

impl DocumentAssembler {
    #[must_use]
    pub fn new(options: NormalizeOptions, format: DocumentFormat, overwrite: bool) -> Self {
        Self {
            options,
            format,
            overwrite,
        }
    }

    /// True when `output` exists and is at least as new as every input.
    #[must_use]
    pub fn is_fresh(output: &Path, inputs: &[PathBuf]) -> bool {
        let Some(output_time) = modified_time(output) else {
            return false;
        };
        inputs
            .iter()
            .all(|input| modified_time(input).is_some_and(|t| t <= output_time))
    }

    /// Assembles on the blocking pool.
    ///
    /// # Errors
    ///
    /// See [`DocumentAssembler::assemble_blocking`].
    #[instrument(skip(self, job), fields(chapter = %job.chapter.id, pages = job.images.len()))]
    pub async fn assemble(&self, job: AssemblyJob) -> Result<Assembled, AssemblyError> {
        let assembler = self.clone();
        tokio::task::spawn_blocking(move || assembler.assemble_blocking(&job))
            .await
            .map_err(|e| AssemblyError::Task {
                reason: e.to_string(),
            })?
    }

    /// Builds the document unless it is fresh, already holds exactly the
    /// pages being assembled, and overwrite is off.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::NoPages`] for an empty page set, and the
    /// read, normalization or write error otherwise.
    pub fn assemble_blocking(&self, job: &AssemblyJob) -> Result<Assembled, AssemblyError> {
        if job.images.is_empty() {
            return Err(AssemblyError::NoPages {
                chapter: job.chapter.id.clone(),
            });
        }

        let mut images = job.images.clone();
        images.sort_by_key(|i| i.page_index);
        let wanted: Vec<usize> = images.iter().map(|i| i.page_index + 1).collect();

        let mut inputs: Vec<PathBuf> = images.iter().map(|i| i.local_path.clone()).collect();
        inputs.extend(job.extra_inputs.iter().cloned());

        if !self.overwrite && Self::is_fresh(&job.output, &inputs) {
            match packed_pages(&job.output) {
                Ok(packed) if packed == wanted => {
                    debug!(path = %job.output.display(), "document up to date");
                    return Ok(Assembled {
                        document: describe(&job.chapter.id, &job.output, packed.len())?,
                        status: AssemblyStatus::UpToDate,
                    });
                }
                Ok(packed) => debug!(
                    path = %job.output.display(),
                    packed = packed.len(),
                    wanted = wanted.len(),
                    "page set changed, rebuilding"
                ),
                Err(e) => warn!(path = %job.output.display(), error = %e, "unreadable document, rebuilding"),
            }
        }

        let mut pages = Vec::with_capacity(images.len());
        for image in &images {
            let bytes = fs::read(&image.local_path).map_err(|source| AssemblyError::ReadPage {
                path: image.local_path.clone(),
                source,
            })?;
            let page = normalize_page(&bytes, &self.options).map_err(|source| AssemblyError::Normalize {
                chapter: job.chapter.id.clone(),
                page_index: image.page_index,
                source,
            })?;
            pages.push(PackedPage {
                number: image.page_index + 1,
                page,
            });
        }

        let info = ComicInfo {
            series: job.series_title.clone(),
            title: job.chapter.title.clone(),
            number: job.chapter.sequence_index,
            page_count: pages.len(),
        };
        write_document(self.format, &job.output, &pages, &info)?;
        info!(path = %job.output.display(), pages = pages.len(), format = %self.format, "document written");

        Ok(Assembled {
            document: describe(&job.chapter.id, &job.output, pages.len())?,
            status: AssemblyStatus::Built,
        })
    }
}

fn write_document(
    format: DocumentFormat,
    output: &Path,
    pages: &[PackedPage],
    info: &ComicInfo,
) -> Result<(), AssemblyError> {
    let write_error = |source| AssemblyError::Write {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let tmp = temp_path_for(output);
    let result = File::create(&tmp)
        .map_err(write_error)
        .and_then(|file| match format {
            DocumentFormat::Cbz => write_cbz(BufWriter::new(file), pages, info)
                .and_then(|writer| writer.into_inner().map_err(|e| e.into_error().into()))
                .map_err(|source| AssemblyError::Archive {
                    path: output.to_path_buf(),
                    source,
                }),
            DocumentFormat::Pdf => write_pdf(file, output, pages, info),
        })
        .and_then(|file| file.sync_all().map_err(write_error));

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    replace_with(&tmp, output).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        write_error(source)
    })
}

fn write_pdf(file: File, output: &Path, pages: &[PackedPage], info: &ComicInfo) -> Result<File, AssemblyError> {
    let pdf_error = |reason: String| AssemblyError::Pdf {
        path: output.to_path_buf(),
        reason,
    };
    let mut document = build_pdf(pages, info).map_err(|e| pdf_error(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    document
        .save_to(&mut writer)
        .map_err(|e| pdf_error(e.to_string()))?;
    writer.flush().map_err(|source| AssemblyError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    writer.into_inner().map_err(|e| AssemblyError::Write {
        path: output.to_path_buf(),
        source: e.into_error(),
    })
}

fn describe(chapter_id: &ChapterId, path: &Path, page_count: usize) -> Result<ChapterDocument, AssemblyError> {
    let metadata = fs::metadata(path).map_err(|source| AssemblyError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ChapterDocument {
        chapter_id: chapter_id.clone(),
        path: path.to_path_buf(),
        page_count,
        byte_size: metadata.len(),
        created_at: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    })
}
