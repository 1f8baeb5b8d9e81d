//! Orchestrator configuration
//!
//! Defines the directory layout, timeouts and concurrency limits of the
//! engine. Values come from built-in defaults, then an optional YAML file,
//! then environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use weave_core::domain::pipeline::FailurePolicy;
use weave_core::domain::worker::WorkerDescriptor;

/// Orchestrator configuration
///
/// Directory fields may be relative; they are resolved against `root_dir`
/// through the `*_path` accessors.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for every relative path below
    pub root_dir: PathBuf,

    /// Where worker scripts are looked up
    pub workers_dir: PathBuf,

    /// Reports and other artifacts shared between workers
    pub shared_data_dir: PathBuf,

    /// Input payload files and compiled worker binaries
    pub temp_dir: PathBuf,

    /// Parent of the mailbox (inbox/outbox/logs)
    pub communication_dir: PathBuf,

    pub cache_dir: PathBuf,

    /// Deadline for a single worker invocation (build step included)
    pub communication_timeout: Duration,

    /// Ceiling on simultaneously running worker processes
    pub max_concurrent_processes: usize,

    pub failure_policy: FailurePolicy,

    /// Default tracing filter directive
    pub log_level: String,

    /// Extra or replacement worker descriptors
    pub workers: Vec<WorkerDescriptor>,
}

/// On-disk shape of the YAML configuration file
///
/// Every field is optional; unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    root_dir: Option<PathBuf>,
    workers_dir: Option<PathBuf>,
    shared_data_dir: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    communication_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    /// Seconds
    communication_timeout: Option<u64>,
    max_concurrent_processes: Option<usize>,
    failure_policy: Option<FailurePolicy>,
    log_level: Option<String>,
    #[serde(default)]
    workers: Vec<WorkerDescriptor>,
}

impl Config {
    /// Creates a configuration with defaults rooted at `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            workers_dir: PathBuf::from("."),
            shared_data_dir: PathBuf::from("shared_data"),
            temp_dir: PathBuf::from("temp"),
            communication_dir: PathBuf::from("communication"),
            cache_dir: PathBuf::from("cache"),
            communication_timeout: Duration::from_secs(30),
            max_concurrent_processes: 8,
            failure_policy: FailurePolicy::Continue,
            log_level: "info".to_string(),
            workers: Vec::new(),
        }
    }

    /// Loads configuration from defaults, an optional YAML file and the
    /// process environment
    ///
    /// Environment variables:
    /// - WEAVE_ROOT (base directory)
    /// - WEAVE_TIMEOUT (seconds)
    /// - WEAVE_MAX_PROCESSES
    /// - WEAVE_FAIL_FAST (1/true)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let mut config = Self::new(cwd.clone());

        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            config
                .merge_yaml(&raw)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        }

        config.apply_overrides(|key| std::env::var(key).ok());

        if config.root_dir.is_relative() {
            config.root_dir = cwd.join(&config.root_dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Overlays the values present in a YAML document
    pub fn merge_yaml(&mut self, raw: &str) -> Result<()> {
        let file: FileConfig = serde_yaml::from_str(raw).context("Invalid YAML configuration")?;

        if let Some(root) = file.root_dir {
            self.root_dir = root;
        }
        if let Some(dir) = file.workers_dir {
            self.workers_dir = dir;
        }
        if let Some(dir) = file.shared_data_dir {
            self.shared_data_dir = dir;
        }
        if let Some(dir) = file.temp_dir {
            self.temp_dir = dir;
        }
        if let Some(dir) = file.communication_dir {
            self.communication_dir = dir;
        }
        if let Some(dir) = file.cache_dir {
            self.cache_dir = dir;
        }
        if let Some(secs) = file.communication_timeout {
            self.communication_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = file.max_concurrent_processes {
            self.max_concurrent_processes = max;
        }
        if let Some(policy) = file.failure_policy {
            self.failure_policy = policy;
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
        self.workers.extend(file.workers);

        Ok(())
    }

    /// Applies environment-style overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup("WEAVE_ROOT") {
            self.root_dir = PathBuf::from(root);
        }

        if let Some(secs) = lookup("WEAVE_TIMEOUT").and_then(|s| s.parse::<u64>().ok()) {
            self.communication_timeout = Duration::from_secs(secs);
        }

        if let Some(max) = lookup("WEAVE_MAX_PROCESSES").and_then(|s| s.parse::<usize>().ok()) {
            self.max_concurrent_processes = max;
        }

        if let Some(flag) = lookup("WEAVE_FAIL_FAST") {
            if matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes") {
                self.failure_policy = FailurePolicy::FailFast;
            }
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.communication_timeout.is_zero() {
            anyhow::bail!("communication_timeout must be greater than 0");
        }

        if self.max_concurrent_processes == 0 {
            anyhow::bail!("max_concurrent_processes must be greater than 0");
        }

        for worker in &self.workers {
            if worker.name.trim().is_empty() {
                anyhow::bail!("worker entries must have a name");
            }
        }

        Ok(())
    }

    pub fn workers_path(&self) -> PathBuf {
        self.resolve(&self.workers_dir)
    }

    pub fn shared_data_path(&self) -> PathBuf {
        self.resolve(&self.shared_data_dir)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.resolve(&self.temp_dir)
    }

    pub fn communication_path(&self) -> PathBuf {
        self.resolve(&self.communication_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.resolve(&self.cache_dir)
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root_dir.join(dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::new("/srv/weave");
        assert_eq!(config.communication_timeout, Duration::from_secs(30));
        assert_eq!(config.max_concurrent_processes, 8);
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.shared_data_path(), PathBuf::from("/srv/weave/shared_data"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::new("/tmp");

        config.max_concurrent_processes = 0;
        assert!(config.validate().is_err());

        config.max_concurrent_processes = 2;
        config.communication_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config.communication_timeout = Duration::from_secs(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_yaml() {
        let mut config = Config::new("/tmp");
        config
            .merge_yaml(
                r#"
shared_data_dir: /var/lib/weave
communication_timeout: 5
max_concurrent_processes: 3
failure_policy: fail_fast
enable_caching: true
workers:
  - name: bash
    runtime_version: "5.2"
    launch_command: bash
    supported_extensions: [".sh"]
    transports: [file, pipe]
"#,
            )
            .unwrap();

        assert_eq!(config.shared_data_path(), PathBuf::from("/var/lib/weave"));
        assert_eq!(config.communication_timeout, Duration::from_secs(5));
        assert_eq!(config.max_concurrent_processes, 3);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.workers.len(), 1);
        assert_eq!(config.workers[0].launch_command, "bash");
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let mut config = Config::new("/tmp");
        assert!(config.merge_yaml("max_concurrent_processes: [1, 2]").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WEAVE_TIMEOUT", "12"),
            ("WEAVE_MAX_PROCESSES", "not-a-number"),
            ("WEAVE_FAIL_FAST", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::new("/tmp");
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.communication_timeout, Duration::from_secs(12));
        assert_eq!(config.max_concurrent_processes, 8);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
    }
}
