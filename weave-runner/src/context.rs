//! Orchestrator context
//!
//! Holds the process-wide state of the engine:
//! - Configuration and the resolved directory layout
//! - The read-only worker registry
//! - Tracking of in-flight worker processes
//! - The root cancellation token used at teardown
//!
//! Components receive the context explicitly instead of reaching for globals.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::registry::WorkerRegistry;
use crate::repository::FileMailbox;

/// Shared state for one orchestrator instance
pub struct OrchestratorContext {
    pub config: Config,

    /// Worker catalog, immutable after creation
    pub registry: Arc<WorkerRegistry>,

    /// Live worker processes
    pub processes: Arc<ProcessTracker>,

    shutdown: CancellationToken,

    started_at: DateTime<Utc>,
}

impl OrchestratorContext {
    /// Creates a context, building the registry from the built-in table and
    /// the configured worker entries
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let registry = WorkerRegistry::with_overrides(&config.workers)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Creates a context around an already-built registry
    pub fn with_registry(config: Config, registry: WorkerRegistry) -> Arc<Self> {
        info!(
            "Orchestrator context ready: {} worker(s), root={}",
            registry.len(),
            config.root_dir.display()
        );

        Arc::new(Self {
            config,
            registry: Arc::new(registry),
            processes: Arc::new(ProcessTracker::new()),
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
        })
    }

    /// Mailbox rooted at the configured communication directory
    pub fn mailbox(&self) -> FileMailbox {
        FileMailbox::new(self.config.communication_path())
    }

    pub fn shared_data_dir(&self) -> PathBuf {
        self.config.shared_data_path()
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.config.temp_path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.config.cache_path()
    }

    pub fn workers_dir(&self) -> PathBuf {
        self.config.workers_path()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Token cancelled when the context shuts down; runs derive theirs from it
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Cancels every in-flight invocation derived from this context
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(
                "Shutting down orchestrator context ({} active process(es))",
                self.processes.active()
            );
            self.shutdown.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for OrchestratorContext {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A worker process currently running
#[derive(Debug, Clone)]
pub struct ActiveInvocation {
    pub id: Uuid,
    pub worker: String,
    pub script_path: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// Counts and describes running worker processes
///
/// Registration returns a guard; dropping it removes the entry, so every
/// exit path of the runner keeps the count accurate.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    active: AtomicUsize,
    peak: AtomicUsize,
    launched: AtomicUsize,
    invocations: Mutex<HashMap<Uuid, ActiveInvocation>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly spawned process
    pub fn register(
        self: &Arc<Self>,
        worker: &str,
        script_path: &str,
        pid: Option<u32>,
    ) -> ProcessGuard {
        let id = Uuid::new_v4();
        let invocation = ActiveInvocation {
            id,
            worker: worker.to_string(),
            script_path: script_path.to_string(),
            pid,
            started_at: Utc::now(),
        };

        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.insert(id, invocation);
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.launched.fetch_add(1, Ordering::SeqCst);

        debug!("Process {} registered ({} active)", id, now);

        ProcessGuard {
            tracker: Arc::clone(self),
            id,
        }
    }

    /// Number of processes running right now
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running processes seen so far
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total processes spawned over the lifetime of the tracker
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    /// Snapshot of running invocations, oldest first
    pub fn snapshot(&self) -> Vec<ActiveInvocation> {
        let mut list: Vec<_> = self
            .invocations
            .lock()
            .map(|invocations| invocations.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by_key(|i| i.started_at);
        list
    }

    fn release(&self, id: Uuid) {
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.remove(&id);
        }
        let left = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("Process {} released ({} active)", id, left);
    }
}

/// Removes its invocation from the tracker when dropped
#[derive(Debug)]
pub struct ProcessGuard {
    tracker: Arc<ProcessTracker>,
    id: Uuid,
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.tracker.release(self.id);
    }
}
