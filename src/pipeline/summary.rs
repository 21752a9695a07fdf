//! Per-chapter outcomes and the run summary.

use std::path::PathBuf;

use crate::assemble::AssemblyStatus;
use crate::failure::FailureKind;
use crate::model::{ChapterDescriptor, ChapterDocument, PageGap};

/// Final state of one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterStatus {
    /// Every page made it into the document.
    Succeeded,
    /// A document was produced with gaps (lenient policy).
    Partial,
    /// No document was produced.
    Failed { kind: FailureKind, reason: String },
    /// The run was cancelled before this chapter started.
    Cancelled,
}

/// What happened to one chapter.
#[derive(Debug, Clone)]
pub struct ChapterOutcome {
    pub chapter: ChapterDescriptor,
    pub status: ChapterStatus,
    pub document: Option<ChapterDocument>,
    pub assembly: Option<AssemblyStatus>,
    pub gaps: Vec<PageGap>,
    /// True when image references were read back from the URL list.
    pub references_from_checkpoint: bool,
    /// Pages that needed at least one network attempt.
    pub network_pages: usize,
}

impl ChapterOutcome {
    pub(crate) fn new(chapter: ChapterDescriptor) -> Self {
        Self {
            chapter,
            status: ChapterStatus::Cancelled,
            document: None,
            assembly: None,
            gaps: Vec::new(),
            references_from_checkpoint: false,
            network_pages: 0,
        }
    }

    pub(crate) fn failed(mut self, kind: FailureKind, reason: impl Into<String>) -> Self {
        self.status = ChapterStatus::Failed {
            kind,
            reason: reason.into(),
        };
        self.document = None;
        self
    }

    /// True when the chapter has a complete document on disk.
    #[must_use]
    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }
}

/// Counters copied from the fetcher at the end of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchTotals {
    pub fetched: usize,
    pub reused: usize,
    pub failed: usize,
    pub retried: usize,
}

/// How the process should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// At least one chapter document is available.
    Success,
    /// No chapter document is available.
    Failure,
}

impl ProcessExit {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

/// Maps the number of available documents to the process exit.
#[must_use]
pub fn determine_exit_outcome(documents_available: usize) -> ProcessExit {
    if documents_available > 0 {
        ProcessExit::Success
    } else {
        ProcessExit::Failure
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub title: String,
    pub book_dir: PathBuf,
    pub outcomes: Vec<ChapterOutcome>,
    pub manifest_path: Option<PathBuf>,
    pub publish_error: Option<String>,
    pub fetch: FetchTotals,
}

impl RunSummary {
    fn count(&self, predicate: impl Fn(&ChapterStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.status)).count()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|s| *s == ChapterStatus::Succeeded)
    }

    #[must_use]
    pub fn partial(&self) -> usize {
        self.count(|s| *s == ChapterStatus::Partial)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ChapterStatus::Failed { .. }))
    }

    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.count(|s| *s == ChapterStatus::Cancelled)
    }

    /// Chapters with a complete document on disk after this run.
    #[must_use]
    pub fn documents_available(&self) -> usize {
        self.outcomes.iter().filter(|o| o.has_document()).count()
    }

    #[must_use]
    pub fn exit_outcome(&self) -> ProcessExit {
        determine_exit_outcome(self.documents_available())
    }

    /// Failed chapters, in sequence order.
    pub fn failures(&self) -> impl Iterator<Item = (&ChapterDescriptor, FailureKind, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            ChapterStatus::Failed { kind, reason } => Some((&o.chapter, *kind, reason.as_str())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn outcome(seq: u32, status: ChapterStatus, with_document: bool) -> ChapterOutcome {
        let chapter = ChapterDescriptor::new(seq, "t", "r");
        let document = with_document.then(|| ChapterDocument {
            chapter_id: chapter.id.clone(),
            path: PathBuf::from("x.cbz"),
            page_count: 1,
            byte_size: 1,
            created_at: SystemTime::UNIX_EPOCH,
        });
        ChapterOutcome {
            status,
            document,
            ..ChapterOutcome::new(chapter)
        }
    }

    fn summary(outcomes: Vec<ChapterOutcome>) -> RunSummary {
        RunSummary {
            title: "T".to_string(),
            book_dir: PathBuf::from("/out/T_1"),
            outcomes,
            manifest_path: None,
            publish_error: None,
            fetch: FetchTotals::default(),
        }
    }

    #[test]
    fn test_exit_outcome_success_with_one_document() {
        assert_eq!(determine_exit_outcome(1), ProcessExit::Success);
        assert_eq!(ProcessExit::Success.code(), 0);
    }

    #[test]
    fn test_exit_outcome_failure_without_documents() {
        assert_eq!(determine_exit_outcome(0), ProcessExit::Failure);
        assert_eq!(ProcessExit::Failure.code(), 1);
    }

    #[test]
    fn test_summary_counts() {
        let s = summary(vec![
            outcome(1, ChapterStatus::Succeeded, true),
            outcome(2, ChapterStatus::Partial, true),
            outcome(
                3,
                ChapterStatus::Failed {
                    kind: FailureKind::Fetch,
                    reason: "HTTP 503".to_string(),
                },
                false,
            ),
            outcome(4, ChapterStatus::Cancelled, false),
        ]);
        assert_eq!(s.succeeded(), 1);
        assert_eq!(s.partial(), 1);
        assert_eq!(s.failed(), 1);
        assert_eq!(s.cancelled(), 1);
        assert_eq!(s.documents_available(), 2);
        assert_eq!(s.exit_outcome(), ProcessExit::Success);
        let failures: Vec<_> = s.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1, FailureKind::Fetch);
    }

    #[test]
    fn test_all_failed_run_exits_nonzero() {
        let s = summary(vec![outcome(
            1,
            ChapterStatus::Failed {
                kind: FailureKind::Extraction,
                reason: "none".to_string(),
            },
            false,
        )]);
        assert_eq!(s.exit_outcome(), ProcessExit::Failure);
    }
}
