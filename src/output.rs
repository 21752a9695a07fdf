//! Run summary formatting.

use binder_core::{ChapterStatus, FailureKind, RunSummary};

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending ellipsis if truncated.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut output: String = text.chars().take(width - 1).collect();
    output.push('…');
    output
}

/// Lines describing a finished run, headline first.
pub fn summary_lines(summary: &RunSummary, width: usize) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: {} succeeded, {} partial, {} failed, {} cancelled ({} of {} chapters available)",
        summary.title,
        summary.succeeded(),
        summary.partial(),
        summary.failed(),
        summary.cancelled(),
        summary.documents_available(),
        summary.outcomes.len()
    )];

    lines.push(format!(
        "Images: {} fetched, {} reused, {} failed, {} retries",
        summary.fetch.fetched, summary.fetch.reused, summary.fetch.failed, summary.fetch.retried
    ));

    for outcome in &summary.outcomes {
        if outcome.status != ChapterStatus::Partial {
            continue;
        }
        let pages: Vec<String> = outcome
            .gaps
            .iter()
            .map(|g| (g.page_index + 1).to_string())
            .collect();
        lines.push(truncate_to_width(
            &format!(
                "  ⚠ {} {}: missing page(s) {}",
                outcome.chapter.id,
                outcome.chapter.title,
                pages.join(", ")
            ),
            width,
        ));
    }

    let mut kinds: Vec<FailureKind> = Vec::new();
    for (chapter, kind, reason) in summary.failures() {
        lines.push(truncate_to_width(
            &format!("  {} {} {}: {reason}", kind.icon(), chapter.id, chapter.title),
            width,
        ));
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    if let Some(error) = &summary.publish_error {
        lines.push(truncate_to_width(
            &format!("  {} {error}", FailureKind::Publish.icon()),
            width,
        ));
        kinds.push(FailureKind::Publish);
    }

    kinds.sort();
    for kind in kinds {
        lines.extend(descriptor_lines(kind, width));
    }

    if let Some(path) = &summary.manifest_path {
        lines.push(format!("Manifest: {}", path.display()));
    }
    lines
}

/// What / why / fix block for one failure kind.
pub fn descriptor_lines(kind: FailureKind, width: usize) -> Vec<String> {
    let descriptor = kind.descriptor();
    vec![
        format!("{} {}: {}", kind.icon(), kind.label(), descriptor.what),
        truncate_to_width(&format!("   Why: {}", descriptor.why), width),
        truncate_to_width(&format!("   Fix: {}", descriptor.fix), width),
    ]
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use binder_core::pipeline::FetchTotals;
    use binder_core::{ChapterDescriptor, ChapterOutcome, PageGap};

    use super::*;

    fn outcome(seq: u32, status: ChapterStatus, gaps: Vec<PageGap>) -> ChapterOutcome {
        ChapterOutcome {
            chapter: ChapterDescriptor::new(seq, format!("Chapter {seq}"), "ref"),
            status,
            document: None,
            assembly: None,
            gaps,
            references_from_checkpoint: false,
            network_pages: 0,
        }
    }

    fn summary(outcomes: Vec<ChapterOutcome>) -> RunSummary {
        RunSummary {
            title: "Series".to_string(),
            book_dir: PathBuf::from("/out/Series_1"),
            outcomes,
            manifest_path: Some(PathBuf::from("/out/Series_1/Series_1-cbz/index.json")),
            publish_error: None,
            fetch: FetchTotals::default(),
        }
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdef", 4), "abc…");
        assert_eq!(truncate_to_width("abc", 0), "");
    }

    #[test]
    fn test_summary_lists_gaps_and_failures_with_fix() {
        let gap = PageGap {
            page_index: 2,
            url: "https://img.example.com/3.jpg".to_string(),
            attempts: 3,
            reason: "HTTP 404".to_string(),
        };
        let lines = summary_lines(
            &summary(vec![
                outcome(1, ChapterStatus::Succeeded, vec![]),
                outcome(2, ChapterStatus::Partial, vec![gap]),
                outcome(
                    3,
                    ChapterStatus::Failed {
                        kind: FailureKind::Extraction,
                        reason: "no image URLs".to_string(),
                    },
                    vec![],
                ),
            ]),
            200,
        );

        assert!(lines[0].contains("1 succeeded, 1 partial, 1 failed"));
        assert!(lines.iter().any(|l| l.contains("ch0002") && l.contains("missing page(s) 3")));
        assert!(lines.iter().any(|l| l.contains("ch0003") && l.contains("no image URLs")));
        assert!(lines.iter().any(|l| l.contains("ExtractionFailure")));
        assert!(lines.iter().any(|l| l.trim_start().starts_with("Fix:")));
        assert!(lines.last().unwrap().starts_with("Manifest:"));
    }

    #[test]
    fn test_clean_run_has_no_descriptors() {
        let lines = summary_lines(&summary(vec![outcome(1, ChapterStatus::Succeeded, vec![])]), 80);
        assert!(!lines.iter().any(|l| l.contains("Why:")));
    }
}
