//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use binder_core::config::FileConfig;
use binder_core::fetch::constants::{DEFAULT_MIN_PAYLOAD_BYTES, FETCH_TIMEOUT_SECS};
use binder_core::session::DEFAULT_RENDER_TIMEOUT;
use binder_core::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DocumentFormat, NormalizeOptions,
    PartialFailurePolicy, SiteProfile,
};

/// Download comic chapters and bind them into PDF or CBZ documents.
///
/// Each chapter of the content item is resolved to its page images, fetched
/// into a resumable cache and packed into one document, and an index.json
/// manifest lists every document produced so far.
#[derive(Parser, Debug)]
#[command(name = "chapter-binder")]
#[command(author, version, about)]
pub struct Args {
    /// Content identifier on the source site (for example 103)
    #[arg(value_name = "BOOK_ID")]
    pub book_id: String,

    /// Source site profile. 8comic chapter links without a usable href are
    /// followed through their cview() handler; a link with neither fails
    /// extraction for that chapter
    #[arg(short, long, default_value_t = SiteProfile::default())]
    pub source: SiteProfile,

    /// Chapter document format: pdf or cbz [default: pdf]
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<DocumentFormat>,

    /// Regenerate everything, ignoring URL lists, cached pages and fresh documents
    #[arg(long)]
    pub overwrite: bool,

    /// Open the generated manifest when the run produced a document
    #[arg(long)]
    pub show_content: bool,

    /// What to do with a chapter that has missing pages [default: strict]
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<PartialFailurePolicy>,

    /// Maximum concurrent image fetches per chapter (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum attempts per image for transient failures (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: Option<u8>,

    /// Output directory [default: current directory]
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Config file [default: $XDG_CONFIG_HOME/chapter-binder/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Effective settings after merging flags, config file and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub policy: PartialFailurePolicy,
    pub format: DocumentFormat,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub normalize: NormalizeOptions,
    pub min_payload_bytes: u64,
    pub fetch_timeout_secs: u64,
    pub render_timeout: Duration,
}

impl Args {
    /// Flag > config file > built-in default.
    #[must_use]
    pub fn resolve(&self, file: Option<&FileConfig>) -> Settings {
        let file = file.cloned().unwrap_or_default();
        let normalize_defaults = NormalizeOptions::default();

        Settings {
            output_dir: self
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            policy: self.policy.or(file.policy).unwrap_or_default(),
            format: self.format.or(file.format).unwrap_or_default(),
            concurrency: self
                .concurrency
                .or(file.concurrency)
                .map_or(DEFAULT_CONCURRENCY, usize::from),
            max_attempts: self
                .max_retries
                .or(file.max_retries)
                .map_or(DEFAULT_MAX_RETRIES, u32::from),
            normalize: NormalizeOptions {
                max_edge: file.max_edge.unwrap_or(normalize_defaults.max_edge),
                jpeg_quality: file.jpeg_quality.unwrap_or(normalize_defaults.jpeg_quality),
                default_dpi: file.default_dpi.unwrap_or(normalize_defaults.default_dpi),
            },
            min_payload_bytes: file.min_payload_bytes.unwrap_or(DEFAULT_MIN_PAYLOAD_BYTES),
            fetch_timeout_secs: file.fetch_timeout_secs.unwrap_or(FETCH_TIMEOUT_SECS),
            render_timeout: file
                .render_timeout_secs
                .map_or(DEFAULT_RENDER_TIMEOUT, Duration::from_secs),
        }
    }
}
