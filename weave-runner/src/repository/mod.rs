//! Repository layer
//!
//! Repositories own the durable, file-based state of the orchestrator: the
//! mailbox directories and the shared-data area where reports are stored.
//! Every mutation is either a whole-file write followed by a rename or a
//! rename on its own, so concurrent processes never see partial artifacts and
//! no lock manager is needed.
//!
//! All repositories are trait-based to enable testing and mocking.

mod mailbox;
mod reports;

// Re-export traits
pub use mailbox::MailboxRepository;
pub use reports::ReportRepository;

// Re-export implementations
pub use mailbox::{FileMailbox, MailboxCounts};
pub use reports::FileReportRepository;

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Creates a directory tree if it does not exist yet
pub(crate) async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io(path, e))
}

/// Writes `bytes` to a hidden sibling file, then renames it over `path`
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staging = dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));

    tokio::fs::write(&staging, bytes)
        .await
        .map_err(|e| Error::io(&staging, e))?;

    if let Err(e) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(Error::io(path, e));
    }

    Ok(())
}

/// Lists visible `*.<extension>` files of a directory, sorted by name
///
/// A missing directory yields an empty list.
pub(crate) async fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(dir, e))? {
        let path = entry.path();
        let visible = path
            .file_name()
            .map(|n| !n.to_string_lossy().starts_with('.'))
            .unwrap_or(false);
        let matches = path.extension().map(|e| e == extension).unwrap_or(false);
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);

        if visible && matches && is_file {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.json");

        write_atomic(&target, b"{\"a\": 1}").await.unwrap();
        write_atomic(&target, b"{\"a\": 2}").await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"a\": 2}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_list_files_filters_hidden_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::write(dir.path().join(".c.json.tmp"), "{}").unwrap();
        std::fs::write(dir.path().join(".d.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let files = list_files(dir.path(), "json").await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);

        let missing = list_files(&dir.path().join("missing"), "json").await.unwrap();
        assert!(missing.is_empty());
    }
}
