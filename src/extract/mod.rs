//! Image URL extraction for one chapter.
//!
//! The [`UrlExtractor`] renders a chapter page through the session (with
//! bounded retries), then walks its ordered strategy list. The first strategy
//! whose candidates survive normalization wins; its name is stored on every
//! reference. Results are checkpointed to the chapter's URL list file, and a
//! later run without overwrite reads that file instead of rendering again.

mod checkpoint;
mod normalize;
mod strategy;

pub use checkpoint::{UNKNOWN_STRATEGY, load_url_list, save_url_list};
pub use normalize::{
    IMAGE_EXTENSIONS, dedupe_preserving_order, first_srcset_candidate, has_image_extension,
    normalize_candidate,
};
pub use strategy::{AttributeScan, ExtractionStrategy, ScriptPattern, default_strategies};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::fetch::RetryPolicy;
use crate::model::{ChapterDescriptor, ChapterId, ImageReference};
use crate::session::{BrowserSession, RenderedPage, SessionError, render_with_retry};

/// Render attempts per chapter page.
pub const DEFAULT_RENDER_ATTEMPTS: u32 = 3;

/// Errors raised while resolving a chapter's image references.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The chapter page could not be rendered.
    #[error("chapter {chapter} could not be rendered after {attempts} attempt(s): {source}")]
    Render {
        chapter: ChapterId,
        attempts: u32,
        #[source]
        source: SessionError,
    },

    /// Every strategy came back empty.
    #[error("no image URLs found for chapter {chapter} (tried {})", tried.join(", "))]
    NoImages {
        chapter: ChapterId,
        tried: Vec<String>,
    },

    /// The URL list checkpoint could not be read or written.
    #[error("URL list {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    fn checkpoint(path: &Path, source: std::io::Error) -> Self {
        Self::Checkpoint {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where a chapter's references came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSource {
    /// Read back from an existing URL list.
    Checkpoint,
    /// Extracted from a freshly rendered page.
    Extracted {
        /// Render attempts spent on the chapter page.
        render_attempts: u32,
    },
}

/// References for one chapter together with their provenance.
#[derive(Debug, Clone)]
pub struct ResolvedReferences {
    pub references: Vec<ImageReference>,
    pub source: ReferenceSource,
}

/// Resolves ordered image references for chapters.
pub struct UrlExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    render_policy: RetryPolicy,
}

impl std::fmt::Debug for UrlExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("UrlExtractor")
            .field("strategies", &names)
            .field("render_policy", &self.render_policy)
            .finish()
    }
}

impl UrlExtractor {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>, render_policy: RetryPolicy) -> Self {
        Self {
            strategies,
            render_policy,
        }
    }

    /// Strategy names in fallback order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the strategies over an already rendered page.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NoImages`] when no strategy yields a valid URL.
    pub fn extract_from_page(
        &self,
        chapter: &ChapterDescriptor,
        page: &RenderedPage,
    ) -> Result<Vec<ImageReference>, ExtractError> {
        for strategy in &self.strategies {
            let Some(candidates) = strategy.extract(page) else {
                debug!(strategy = strategy.name(), "strategy found no candidates");
                continue;
            };

            let raw_count = candidates.len();
            let urls = dedupe_preserving_order(
                candidates
                    .iter()
                    .filter_map(|raw| normalize_candidate(raw, &page.url))
                    .collect(),
            );

            if urls.is_empty() {
                debug!(
                    strategy = strategy.name(),
                    raw_count, "no candidate survived validation"
                );
                continue;
            }

            debug!(strategy = strategy.name(), raw_count, accepted = urls.len(), "strategy accepted");
            return Ok(urls
                .into_iter()
                .enumerate()
                .map(|(page_index, url)| ImageReference {
                    chapter_id: chapter.id.clone(),
                    page_index,
                    url,
                    strategy_used: strategy.name().to_string(),
                })
                .collect());
        }

        Err(ExtractError::NoImages {
            chapter: chapter.id.clone(),
            tried: self.strategy_names().into_iter().map(str::to_string).collect(),
        })
    }

    /// Renders the chapter page and extracts its references.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Render`] once render retries are exhausted, or
    /// [`ExtractError::NoImages`].
    #[instrument(skip(self, session, chapter), fields(chapter = %chapter.id))]
    pub async fn extract(
        &self,
        session: &Arc<dyn BrowserSession>,
        chapter: &ChapterDescriptor,
    ) -> Result<(Vec<ImageReference>, u32), ExtractError> {
        let (page, attempts) = render_with_retry(session, &chapter.source_page_ref, &self.render_policy)
            .await
            .map_err(|(source, attempts)| ExtractError::Render {
                chapter: chapter.id.clone(),
                attempts,
                source,
            })?;
        let references = self.extract_from_page(chapter, &page)?;
        Ok((references, attempts))
    }

    /// Returns the chapter's references, from its URL list when one exists
    /// (and `overwrite` is false), otherwise by extraction followed by a
    /// checkpoint write.
    ///
    /// # Errors
    ///
    /// Returns any [`ExtractError`]; a failed extraction leaves no list behind.
    #[instrument(skip(self, session, chapter), fields(chapter = %chapter.id, list = %url_list.display()))]
    pub async fn resolve(
        &self,
        session: &Arc<dyn BrowserSession>,
        chapter: &ChapterDescriptor,
        url_list: &Path,
        overwrite: bool,
    ) -> Result<ResolvedReferences, ExtractError> {
        if !overwrite {
            match load_url_list(url_list, &chapter.id) {
                Ok(Some(references)) => {
                    debug!(count = references.len(), "reusing URL list");
                    return Ok(ResolvedReferences {
                        references,
                        source: ReferenceSource::Checkpoint,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "unreadable URL list, extracting again"),
            }
        }

        let (references, render_attempts) = self.extract(session, chapter).await?;
        save_url_list(url_list, &references).map_err(|e| ExtractError::checkpoint(url_list, e))?;
        info!(
            count = references.len(),
            strategy = references.first().map_or("", |r| r.strategy_used.as_str()),
            "image URLs saved"
        );

        Ok(ResolvedReferences {
            references,
            source: ReferenceSource::Extracted { render_attempts },
        })
    }
}

impl Default for UrlExtractor {
    fn default() -> Self {
        Self::new(
            default_strategies(),
            RetryPolicy::with_max_attempts(DEFAULT_RENDER_ATTEMPTS),
        )
    }
}
