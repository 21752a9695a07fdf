//! Chapter Binder Core Library
//!
//! Turns a serialized comic on a supported site into one PDF (or CBZ) document
//! per chapter plus a JSON manifest describing every document on disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`site`] - Source profiles and chapter discovery
//! - [`session`] - The browsing-session capability (render and authenticate)
//! - [`extract`] - Image URL extraction with fallback strategies and URL lists
//! - [`fetch`] - Bounded-concurrency image fetching with retry and a page cache
//! - [`assemble`] - Page normalization and PDF/CBZ packing
//! - [`publish`] - Manifest generation
//! - [`pipeline`] - Run orchestration, partial-failure policy and summaries
//! - [`config`] - Config file loading and credential lookup

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assemble;
pub mod config;
pub mod extract;
pub mod failure;
pub mod fetch;
mod fs_util;
mod html;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod session;
pub mod site;
mod user_agent;

// Re-export commonly used types
pub use assemble::{AssemblyError, DocumentAssembler, DocumentFormat, NormalizeOptions};
pub use config::{ConfigError, FileConfig};
pub use extract::{ExtractError, UrlExtractor};
pub use failure::{FailureDescriptor, FailureKind};
pub use fetch::constants::DEFAULT_CONCURRENCY;
pub use fetch::{
    DEFAULT_MAX_RETRIES, DownloadError, EngineError, FetchOptions, HttpClient, ImageFetcher,
    RetryPolicy,
};
pub use layout::BookLayout;
pub use model::{
    ChapterDescriptor, ChapterDocument, ChapterId, FetchedImage, ImageReference, IndexEntry,
    PageGap,
};
pub use pipeline::{
    ChapterOutcome, ChapterStatus, NoProgress, PartialFailurePolicy, Pipeline, PipelineConfig,
    PipelineError, ProcessExit, ProgressSink, RunSummary,
};
pub use publish::{IndexPublisher, Manifest, PublishError};
pub use session::{BrowserSession, Credentials, HttpSession, RenderedPage, SessionError};
pub use site::{Catalog, DiscoveryError, SiteProfile};
