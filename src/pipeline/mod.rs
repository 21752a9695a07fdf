//! Run orchestration.
//!
//! A [`Pipeline`] owns the session capability and the stage components. One
//! run authenticates (when credentials are given), discovers the catalog,
//! then takes each chapter through extraction, fetch and assembly in
//! sequence order before publishing the manifest. Chapter-level failures are
//! recorded and the run moves on; only authentication and discovery
//! failures end the run early.

mod policy;
mod summary;

pub use policy::PartialFailurePolicy;
pub use summary::{
    ChapterOutcome, ChapterStatus, FetchTotals, ProcessExit, RunSummary, determine_exit_outcome,
};

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::assemble::{AssemblyJob, AssemblyStatus, DocumentAssembler, DocumentFormat, NormalizeOptions};
use crate::extract::{DEFAULT_RENDER_ATTEMPTS, ReferenceSource, UrlExtractor};
use crate::failure::{FailureKind, chapter_fetch_failure_kind};
use crate::fetch::{ImageFetcher, RetryPolicy};
use crate::layout::BookLayout;
use crate::model::ChapterDescriptor;
use crate::publish::IndexPublisher;
use crate::session::{BrowserSession, Credentials, SessionError, authenticate_blocking};
use crate::site::{DiscoveryError, SiteProfile, discover};

/// Render attempts for the catalog page.
pub const DEFAULT_DISCOVERY_ATTEMPTS: u32 = 3;

/// Failures that end a run before any chapter is processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The session rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(#[source] SessionError),

    /// The catalog could not be read.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl PipelineError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Authentication(_) => FailureKind::Authentication,
            Self::Discovery(_) => FailureKind::Discovery,
        }
    }
}

/// What to acquire and where to put it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub profile: SiteProfile,
    pub content_id: String,
    /// Ignore URL lists, cached pages and fresh documents.
    pub overwrite: bool,
    pub policy: PartialFailurePolicy,
    pub format: DocumentFormat,
}

/// Receives run progress; every method defaults to doing nothing.
pub trait ProgressSink: Send + Sync {
    fn chapters_discovered(&self, _title: &str, _total: usize) {}
    fn chapter_started(&self, _chapter: &ChapterDescriptor) {}
    fn chapter_finished(&self, _outcome: &ChapterOutcome) {}
}

/// Progress sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// The top-level orchestrator.
pub struct Pipeline {
    config: PipelineConfig,
    session: Arc<dyn BrowserSession>,
    extractor: UrlExtractor,
    fetcher: ImageFetcher,
    assembler: DocumentAssembler,
    publisher: IndexPublisher,
    discovery_policy: RetryPolicy,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("extractor", &self.extractor)
            .field("fetcher", &self.fetcher)
            .field("assembler", &self.assembler)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline with the profile's extraction strategies and
    /// default normalization.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        session: Arc<dyn BrowserSession>,
        fetcher: ImageFetcher,
    ) -> Self {
        let extractor = UrlExtractor::new(
            config.profile.strategies(),
            RetryPolicy::with_max_attempts(DEFAULT_RENDER_ATTEMPTS),
        );
        let assembler = DocumentAssembler::new(NormalizeOptions::default(), config.format, config.overwrite);
        Self {
            config,
            session,
            extractor,
            fetcher,
            assembler,
            publisher: IndexPublisher::new(),
            discovery_policy: RetryPolicy::with_max_attempts(DEFAULT_DISCOVERY_ATTEMPTS),
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: UrlExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replaces the normalization settings; format and overwrite still follow the config.
    #[must_use]
    pub fn with_normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.assembler = DocumentAssembler::new(options, self.config.format, self.config.overwrite);
        self
    }

    #[must_use]
    pub fn with_discovery_policy(mut self, policy: RetryPolicy) -> Self {
        self.discovery_policy = policy;
        self
    }

    /// Runs the whole acquisition for the configured content item.
    ///
    /// `cancel` is checked before each chapter; chapters not started once it
    /// is set are reported as cancelled. The manifest is published even after
    /// cancellation so it reflects every document on disk.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when authentication or discovery fails.
    #[instrument(skip_all, fields(source = %self.config.profile, id = %self.config.content_id))]
    pub async fn run(
        &self,
        credentials: Option<&Credentials>,
        cancel: &AtomicBool,
        progress: &dyn ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        if let Some(credentials) = credentials {
            authenticate_blocking(&self.session, credentials)
                .await
                .map_err(PipelineError::Authentication)?;
            info!("session authenticated");
        } else {
            debug!("no credentials, continuing anonymously");
        }

        let catalog = discover(
            &self.session,
            self.config.profile,
            &self.config.content_id,
            &self.discovery_policy,
        )
        .await?;
        progress.chapters_discovered(&catalog.title, catalog.chapters.len());

        let layout = BookLayout::new(
            &self.config.output_dir,
            &catalog.title,
            &self.config.content_id,
            self.config.format,
        );
        let mut outcomes = Vec::with_capacity(catalog.chapters.len());

        for chapter in catalog.chapters {
            if cancel.load(Ordering::SeqCst) {
                debug!(chapter = %chapter.id, "cancelled before start");
                outcomes.push(ChapterOutcome::new(chapter));
                continue;
            }

            progress.chapter_started(&chapter);
            let outcome = self.process_chapter(&layout, &catalog.title, chapter).await;
            progress.chapter_finished(&outcome);
            outcomes.push(outcome);
        }

        let (manifest_path, publish_error) =
            match self.publisher.publish(&layout.documents_dir(), &catalog.title) {
                Ok((path, _)) => (Some(path), None),
                Err(e) => {
                    warn!(error = %e, "manifest not published");
                    (None, Some(e.to_string()))
                }
            };

        let stats = self.fetcher.stats();
        let summary = RunSummary {
            title: catalog.title,
            book_dir: layout.book_dir().to_path_buf(),
            outcomes,
            manifest_path,
            publish_error,
            fetch: FetchTotals {
                fetched: stats.fetched(),
                reused: stats.reused(),
                failed: stats.failed(),
                retried: stats.retried(),
            },
        };

        info!(
            succeeded = summary.succeeded(),
            partial = summary.partial(),
            failed = summary.failed(),
            cancelled = summary.cancelled(),
            "run complete"
        );
        Ok(summary)
    }

    /// Takes one chapter from references to document. Never fails the run.
    #[instrument(skip(self, layout, series_title, chapter), fields(chapter = %chapter.id))]
    async fn process_chapter(
        &self,
        layout: &BookLayout,
        series_title: &str,
        chapter: ChapterDescriptor,
    ) -> ChapterOutcome {
        let mut outcome = ChapterOutcome::new(chapter.clone());
        let url_list = layout.url_list_path(&chapter);

        let resolved = match self
            .extractor
            .resolve(&self.session, &chapter, &url_list, self.config.overwrite)
            .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(error = %e, "extraction failed");
                return outcome.failed(FailureKind::Extraction, e.to_string());
            }
        };
        outcome.references_from_checkpoint = resolved.source == ReferenceSource::Checkpoint;

        let referer = page_referer(&chapter.source_page_ref);
        let fetched = match self
            .fetcher
            .fetch_chapter(
                &chapter.id,
                &resolved.references,
                &layout.page_cache_dir(&chapter),
                referer,
            )
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(error = %e, "fetch stage failed");
                return outcome.failed(FailureKind::Fetch, e.to_string());
            }
        };
        outcome.network_pages = fetched.network_pages();
        outcome.gaps = fetched.failures.iter().map(|f| f.to_gap()).collect();

        let nothing_fetched = fetched.images.is_empty() && !fetched.failures.is_empty();
        if nothing_fetched || !self.config.policy.allows(fetched.failures.len()) {
            let kind = chapter_fetch_failure_kind(&fetched.failures);
            let reason = format!(
                "{} of {} page(s) failed ({} policy)",
                fetched.failures.len(),
                resolved.references.len(),
                self.config.policy
            );
            warn!(%reason, "chapter not assembled");
            return outcome.failed(kind, reason);
        }

        let job = AssemblyJob {
            chapter: chapter.clone(),
            series_title: series_title.to_string(),
            images: fetched.images,
            extra_inputs: vec![url_list],
            output: layout.document_path(&chapter),
        };
        match self.assembler.assemble(job).await {
            Ok(assembled) => {
                if assembled.status == AssemblyStatus::UpToDate {
                    debug!("document up to date");
                }
                outcome.status = if outcome.gaps.is_empty() {
                    ChapterStatus::Succeeded
                } else {
                    ChapterStatus::Partial
                };
                outcome.assembly = Some(assembled.status);
                outcome.document = Some(assembled.document);
                info!(gaps = outcome.gaps.len(), "chapter done");
                outcome
            }
            Err(e) => {
                warn!(error = %e, "assembly failed");
                outcome.failed(FailureKind::Assembly, e.to_string())
            }
        }
    }
}

/// The chapter page is sent as `Referer` when it is a web URL.
fn page_referer(source_page_ref: &str) -> Option<&str> {
    let lower = source_page_ref.to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://")).then_some(source_page_ref)
}
