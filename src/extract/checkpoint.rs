//! Per-chapter URL list files: the resume point between extraction and fetch.
//!
//! ```text
//! # strategy: primary-src
//! https://img.example.com/1.jpg
//! https://img.example.com/2.jpg
//! ```

use std::fmt::Write as _;
use std::path::Path;

use crate::fs_util::write_atomic;
use crate::model::{ChapterId, ImageReference};

const STRATEGY_HEADER: &str = "# strategy:";

/// Strategy name recorded when a list carries no header.
pub const UNKNOWN_STRATEGY: &str = "url-list";

/// Writes the ordered references of one chapter atomically.
///
/// # Errors
///
/// Returns the IO error from creating the directory or writing the file.
pub fn save_url_list(path: &Path, references: &[ImageReference]) -> std::io::Result<()> {
    let strategy = references
        .first()
        .map_or(UNKNOWN_STRATEGY, |r| r.strategy_used.as_str());

    let mut contents = format!("{STRATEGY_HEADER} {strategy}\n");
    for reference in references {
        let _ = writeln!(contents, "{}", reference.url);
    }
    write_atomic(path, contents.as_bytes())
}

/// Loads a chapter's URL list.
///
/// Returns `Ok(None)` when the file does not exist or lists no URL. Comment
/// and blank lines are ignored; page indices follow line order.
///
/// # Errors
///
/// Returns the IO error for any failure other than a missing file.
pub fn load_url_list(path: &Path, chapter_id: &ChapterId) -> std::io::Result<Option<Vec<ImageReference>>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut strategy = UNKNOWN_STRATEGY.to_string();
    let mut urls = Vec::new();
    for line in contents.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix(STRATEGY_HEADER) {
            strategy = name.trim().to_string();
        } else if !line.is_empty() && !line.starts_with('#') {
            urls.push(line.to_string());
        }
    }

    if urls.is_empty() {
        return Ok(None);
    }

    Ok(Some(
        urls.into_iter()
            .enumerate()
            .map(|(page_index, url)| ImageReference {
                chapter_id: chapter_id.clone(),
                page_index,
                url,
                strategy_used: strategy.clone(),
            })
            .collect(),
    ))
}
