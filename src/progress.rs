//! Progress bar over a run's chapters.

use binder_core::{ChapterDescriptor, ChapterOutcome, ChapterStatus, ProgressSink};
use indicatif::{ProgressBar, ProgressStyle};

/// Chapter-level progress bar drawn on stderr.
pub(crate) struct ChapterProgress {
    bar: ProgressBar,
}

impl ChapterProgress {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { bar }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for ChapterProgress {
    fn chapters_discovered(&self, title: &str, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message(title.to_string());
    }

    fn chapter_started(&self, chapter: &ChapterDescriptor) {
        self.bar
            .set_message(format!("{} {}", chapter.id, chapter.title));
    }

    fn chapter_finished(&self, outcome: &ChapterOutcome) {
        if let ChapterStatus::Failed { kind, .. } = &outcome.status {
            self.bar.println(format!(
                "{} {} {}",
                kind.icon(),
                outcome.chapter.id,
                outcome.chapter.title
            ));
        }
        self.bar.inc(1);
    }
}
