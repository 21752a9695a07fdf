//! Small filesystem helpers shared by the pipeline stages.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Returns the sibling temporary path used while `path` is being written.
#[must_use]
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    path.with_extension(format!("{extension}part"))
}

/// Writes `bytes` to `path` through a temporary sibling and a rename, so a
/// reader never observes a half-written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path_for(path);
    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    replace_with(&tmp, path)
}

/// Renames `tmp` over `path`. The previous file stays in place until the
/// rename succeeds, so a failure never loses it.
pub(crate) fn replace_with(tmp: &Path, path: &Path) -> std::io::Result<()> {
    fs::rename(tmp, path)
}

/// Modification time of `path`, or `None` if it cannot be read.
pub(crate) fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("list.txt");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_failed_replace_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ch0001.pdf");
        fs::write(&path, b"good").unwrap();

        assert!(replace_with(&temp_path_for(&path), &path).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"good");
    }

    #[test]
    fn test_temp_path_keeps_extension_visible() {
        let tmp = temp_path_for(Path::new("/out/ch0001.cbz"));
        assert_eq!(tmp, PathBuf::from("/out/ch0001.cbzpart"));
    }
}
