//! Runtime statistics
//!
//! Point-in-time snapshot of the orchestrator: registered workers, live
//! processes, disk usage of the data directories and pending mail.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::context::OrchestratorContext;
use crate::error::{Error, Result};

/// A running invocation as exposed in statistics
#[derive(Debug, Clone, Serialize)]
pub struct InvocationSummary {
    pub worker: String,
    pub script_path: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub supported_workers: Vec<String>,
    pub active_processes: usize,
    pub peak_processes: usize,
    pub launched_processes: usize,
    pub active_invocations: Vec<InvocationSummary>,
    /// Bytes under the shared-data directory
    pub shared_data_size: u64,
    /// Bytes under the cache directory
    pub cache_size: u64,
    pub pending_inbox: usize,
    pub pending_outbox: usize,
    pub uptime_seconds: i64,
    pub generated_at: DateTime<Utc>,
}

/// Collects statistics for a context
pub async fn statistics(context: &OrchestratorContext) -> Result<Statistics> {
    let supported_workers = context
        .registry
        .list()
        .into_iter()
        .map(|d| d.name.clone())
        .collect();

    let active_invocations = context
        .processes
        .snapshot()
        .into_iter()
        .map(|i| InvocationSummary {
            worker: i.worker,
            script_path: i.script_path,
            pid: i.pid,
            started_at: i.started_at,
        })
        .collect();

    let shared_data_size = directory_size(&context.shared_data_dir()).await?;
    let cache_size = directory_size(&context.cache_dir()).await?;
    let counts = context.mailbox().counts().await?;
    let generated_at = Utc::now();

    Ok(Statistics {
        supported_workers,
        active_processes: context.processes.active(),
        peak_processes: context.processes.peak(),
        launched_processes: context.processes.launched(),
        active_invocations,
        shared_data_size,
        cache_size,
        pending_inbox: counts.inbox,
        pending_outbox: counts.outbox,
        uptime_seconds: (generated_at - context.started_at()).num_seconds(),
        generated_at,
    })
}

/// Recursive size of all regular files below `root`; missing means zero
pub async fn directory_size(root: &Path) -> Result<u64> {
    let mut total = 0u64;
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::io(&dir, e)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(&dir, e))? {
            // Symlinks are not followed
            let metadata = match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            if metadata.is_dir() {
                pending.push(entry.path());
            } else if metadata.is_file() {
                total += metadata.len();
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use weave_core::domain::message::{Message, MessageKind};

    use crate::repository::MailboxRepository;

    #[tokio::test]
    async fn test_directory_size_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), vec![0u8; 100]).unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("nested/b.bin"), vec![0u8; 20]).unwrap();
        std::fs::write(dir.path().join("nested/deeper/c.bin"), vec![0u8; 3]).unwrap();

        assert_eq!(directory_size(dir.path()).await.unwrap(), 123);
    }

    #[tokio::test]
    async fn test_missing_directory_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(directory_size(&dir.path().join("nope")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_statistics_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let context = OrchestratorContext::new(Config::new(dir.path())).unwrap();

        std::fs::create_dir_all(context.shared_data_dir()).unwrap();
        std::fs::write(context.shared_data_dir().join("r.json"), "12345").unwrap();

        let mailbox = context.mailbox();
        mailbox
            .send(&Message::new("python", "ruby", MessageKind::Data, serde_json::json!({})))
            .await
            .unwrap();

        let _guard = context.processes.register("python", "analyze.py", Some(1));

        let stats = statistics(&context).await.unwrap();
        assert!(stats.supported_workers.contains(&"python".to_string()));
        assert_eq!(stats.supported_workers.len(), 7);
        assert_eq!(stats.active_processes, 1);
        assert_eq!(stats.active_invocations[0].script_path, "analyze.py");
        assert_eq!(stats.shared_data_size, 5);
        assert_eq!(stats.cache_size, 0);
        assert_eq!(stats.pending_outbox, 1);
        assert_eq!(stats.pending_inbox, 0);
    }
}
