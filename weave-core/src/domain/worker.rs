//! Worker domain types
//!
//! A worker is an external program, written in any language, that performs one
//! pipeline stage. Descriptors are created once at startup and never mutated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Launch characteristics of one worker language/runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    /// Registry key (e.g. "python", "cpp")
    pub name: String,

    /// Human-readable name used in reports (e.g. "C++")
    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub runtime_version: String,

    /// Executable path or name used to launch (or build) the worker
    pub launch_command: String,

    #[serde(default)]
    pub supported_extensions: BTreeSet<String>,

    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    #[serde(default)]
    pub data_formats: BTreeSet<String>,

    #[serde(default)]
    pub transports: BTreeSet<Transport>,

    #[serde(default)]
    pub execution: ExecutionModel,
}

impl WorkerDescriptor {
    /// Creates an interpreted worker descriptor with empty tag sets
    pub fn new(name: impl Into<String>, launch_command: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            runtime_version: String::new(),
            launch_command: launch_command.into(),
            supported_extensions: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            data_formats: BTreeSet::new(),
            transports: BTreeSet::new(),
            execution: ExecutionModel::Interpreted,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = version.into();
        self
    }

    pub fn with_execution(mut self, execution: ExecutionModel) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.supported_extensions = extensions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities = capabilities.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_data_formats(mut self, formats: &[&str]) -> Self {
        self.data_formats = formats.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_transports(mut self, transports: &[Transport]) -> Self {
        self.transports = transports.iter().copied().collect();
        self
    }

    /// True for workers that must be compiled before every run
    pub fn requires_build_step(&self) -> bool {
        self.execution.requires_build_step()
    }

    /// Name shown to humans, falling back to the registry key
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Checks whether the worker handles files with the given suffix
    pub fn supports_extension(&self, extension: &str) -> bool {
        let normalized = if extension.starts_with('.') {
            extension.to_string()
        } else {
            format!(".{}", extension)
        };
        self.supported_extensions.contains(&normalized)
    }
}

/// How a worker is turned into a running process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ExecutionModel {
    /// `launch_command script args...`
    #[default]
    Interpreted,

    /// Build with `launch_command flags... script -o artifact`, then run the artifact
    Compiled {
        #[serde(default)]
        flags: Vec<String>,
    },

    /// `launch_command run --manifest-path <script dir>/Cargo.toml -- args...`
    CargoProject,
}

impl ExecutionModel {
    pub fn requires_build_step(&self) -> bool {
        matches!(self, ExecutionModel::Compiled { .. })
    }
}

/// Communication methods a worker supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    File,
    Pipe,
    Socket,
    Http,
    SharedMemory,
    Database,
    Websocket,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Transport::File => "file",
            Transport::Pipe => "pipe",
            Transport::Socket => "socket",
            Transport::Http => "http",
            Transport::SharedMemory => "shared_memory",
            Transport::Database => "database",
            Transport::Websocket => "websocket",
        };
        write!(f, "{}", name)
    }
}
