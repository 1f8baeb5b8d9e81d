//! Worker registry
//!
//! Static catalog of the worker languages the orchestrator knows how to
//! launch. Built once at startup (built-in table plus configured entries) and
//! shared read-only afterwards.

use std::collections::HashMap;
use tracing::{debug, info};
use weave_core::domain::worker::{ExecutionModel, Transport, WorkerDescriptor};

use crate::error::{Error, Result};

/// Lookup table of worker descriptors keyed by name
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, WorkerDescriptor>,
}

impl WorkerRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in worker table
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_workers() {
            // Built-in names are unique
            registry.workers.insert(descriptor.name.clone(), descriptor);
        }
        registry
    }

    /// Built-in table followed by configured descriptors
    ///
    /// Configured entries replace built-ins of the same name, but two
    /// configured entries with the same name are rejected.
    pub fn with_overrides(overrides: &[WorkerDescriptor]) -> Result<Self> {
        let mut registry = Self::builtin();
        let mut seen = std::collections::HashSet::new();

        for descriptor in overrides {
            if !seen.insert(descriptor.name.clone()) {
                return Err(Error::DuplicateWorker(descriptor.name.clone()));
            }
            registry.register(descriptor.clone(), true)?;
        }

        Ok(registry)
    }

    /// Registers a descriptor
    ///
    /// # Arguments
    /// * `descriptor` - The worker to add
    /// * `replace` - Overwrite an existing entry with the same name
    pub fn register(&mut self, descriptor: WorkerDescriptor, replace: bool) -> Result<()> {
        validate(&descriptor)?;

        if !replace && self.workers.contains_key(&descriptor.name) {
            return Err(Error::DuplicateWorker(descriptor.name));
        }

        debug!(
            "Registering worker {} ({})",
            descriptor.name, descriptor.launch_command
        );
        if self
            .workers
            .insert(descriptor.name.clone(), descriptor)
            .is_some()
        {
            info!("Replaced an existing worker registration");
        }
        Ok(())
    }

    /// Looks up a worker by name
    pub fn resolve(&self, name: &str) -> Result<&WorkerDescriptor> {
        self.workers
            .get(name)
            .ok_or_else(|| Error::UnknownWorker(name.to_string()))
    }

    /// All descriptors sorted by name
    pub fn list(&self) -> Vec<&WorkerDescriptor> {
        let mut workers: Vec<_> = self.workers.values().collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        workers
    }

    /// Workers advertising the given capability tag
    pub fn with_capability(&self, capability: &str) -> Vec<&WorkerDescriptor> {
        self.list()
            .into_iter()
            .filter(|w| w.capabilities.contains(capability))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

fn validate(descriptor: &WorkerDescriptor) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidDescriptor {
        name: descriptor.name.clone(),
        reason: reason.to_string(),
    };

    if descriptor.name.trim().is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if descriptor.name.contains(['/', '\\', '.']) {
        // The name ends up in mailbox file names
        return Err(invalid("name cannot contain '/', '\\' or '.'"));
    }
    if descriptor.launch_command.trim().is_empty() {
        return Err(invalid("launch_command cannot be empty"));
    }
    Ok(())
}

/// The worker languages shipped with the orchestrator
fn builtin_workers() -> Vec<WorkerDescriptor> {
    use Transport::*;

    vec![
        WorkerDescriptor::new("python", "python3")
            .with_display_name("Python")
            .with_version("3.9+")
            .with_extensions(&[".py"])
            .with_capabilities(&["data_processing", "image_optimization", "api_server"])
            .with_data_formats(&["json", "yaml", "pickle", "numpy"])
            .with_transports(&[File, Pipe, Http]),
        WorkerDescriptor::new("cpp", "g++")
            .with_display_name("C++")
            .with_version("17")
            .with_execution(ExecutionModel::Compiled {
                flags: vec!["-std=c++17".to_string(), "-O3".to_string()],
            })
            .with_extensions(&[".cpp", ".hpp"])
            .with_capabilities(&["performance_optimization", "image_processing", "algorithms"])
            .with_data_formats(&["json", "binary", "protobuf"])
            .with_transports(&[File, Pipe, SharedMemory]),
        WorkerDescriptor::new("php", "php")
            .with_display_name("PHP")
            .with_version("8.0+")
            .with_extensions(&[".php"])
            .with_capabilities(&["web_backend", "form_processing", "database"])
            .with_data_formats(&["json", "xml", "serialize"])
            .with_transports(&[File, Http, Database]),
        WorkerDescriptor::new("rust", "cargo")
            .with_display_name("Rust")
            .with_version("1.70+")
            .with_execution(ExecutionModel::CargoProject)
            .with_extensions(&[".rs"])
            .with_capabilities(&["performance_utils", "concurrency", "system_programming"])
            .with_data_formats(&["json", "binary", "messagepack"])
            .with_transports(&[File, Pipe, Socket]),
        WorkerDescriptor::new("ruby", "ruby")
            .with_display_name("Ruby")
            .with_version("3.0+")
            .with_extensions(&[".rb"])
            .with_capabilities(&["color_processing", "automation", "dsl"])
            .with_data_formats(&["json", "yaml", "marshal"])
            .with_transports(&[File, Pipe, Http]),
        WorkerDescriptor::new("javascript", "node")
            .with_display_name("JavaScript")
            .with_version("ES2020")
            .with_extensions(&[".js", ".mjs"])
            .with_capabilities(&["frontend", "animation", "dom_manipulation"])
            .with_data_formats(&["json", "yaml"])
            .with_transports(&[File, Http, Websocket]),
        WorkerDescriptor::new("lua", "lua")
            .with_display_name("Lua")
            .with_version("5.4")
            .with_extensions(&[".lua"])
            .with_capabilities(&["configuration", "scripting", "embedding"])
            .with_data_formats(&["json", "lua_table"])
            .with_transports(&[File, Pipe]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let registry = WorkerRegistry::builtin();
        assert_eq!(registry.len(), 7);

        let cpp = registry.resolve("cpp").unwrap();
        assert!(cpp.requires_build_step());
        assert_eq!(cpp.label(), "C++");

        let names: Vec<_> = registry.list().iter().map(|w| w.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cpp", "javascript", "lua", "php", "python", "ruby", "rust"]
        );
    }

    #[test]
    fn test_resolve_unknown_worker() {
        let registry = WorkerRegistry::builtin();
        let err = registry.resolve("cobol").unwrap_err();
        assert!(matches!(err, Error::UnknownWorker(name) if name == "cobol"));
    }

    #[test]
    fn test_register_rejects_overwrite_without_replace() {
        let mut registry = WorkerRegistry::builtin();
        let custom = WorkerDescriptor::new("python", "/opt/python/bin/python");

        let err = registry.register(custom.clone(), false).unwrap_err();
        assert!(matches!(err, Error::DuplicateWorker(_)));
        assert_eq!(registry.resolve("python").unwrap().launch_command, "python3");

        registry.register(custom, true).unwrap();
        assert_eq!(
            registry.resolve("python").unwrap().launch_command,
            "/opt/python/bin/python"
        );
    }

    #[test]
    fn test_register_validates_descriptor() {
        let mut registry = WorkerRegistry::new();
        assert!(matches!(
            registry.register(WorkerDescriptor::new("", "sh"), false),
            Err(Error::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            registry.register(WorkerDescriptor::new("shell", " "), false),
            Err(Error::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            registry.register(WorkerDescriptor::new("../shell", "sh"), false),
            Err(Error::InvalidDescriptor { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_with_overrides() {
        let overrides = vec![
            WorkerDescriptor::new("shell", "sh"),
            WorkerDescriptor::new("ruby", "/usr/local/bin/ruby"),
        ];
        let registry = WorkerRegistry::with_overrides(&overrides).unwrap();
        assert_eq!(registry.len(), 8);
        assert_eq!(registry.resolve("ruby").unwrap().launch_command, "/usr/local/bin/ruby");

        let duplicated = vec![
            WorkerDescriptor::new("shell", "sh"),
            WorkerDescriptor::new("shell", "bash"),
        ];
        assert!(WorkerRegistry::with_overrides(&duplicated).is_err());
    }

    #[test]
    fn test_with_capability() {
        let registry = WorkerRegistry::builtin();
        let colorists = registry.with_capability("color_processing");
        assert_eq!(colorists.len(), 1);
        assert_eq!(colorists[0].name, "ruby");
    }
}
