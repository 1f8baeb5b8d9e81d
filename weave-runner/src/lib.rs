//! Weave Runner
//!
//! Orchestration engine for worker programs written in different languages.
//!
//! Architecture:
//! - Configuration: defaults, YAML file and environment overrides
//! - Context: process-wide state (registry, live processes, shutdown token)
//! - Registry: catalog of launchable worker languages
//! - Command: turns a worker, a script and arguments into an invocation
//! - Repositories: file mailbox and persisted run reports
//! - Services: process execution and runtime statistics
//! - Scheduler: pipeline coordination
//!
//! Workers talk to the engine through their command line, an optional JSON
//! input file and the single JSON value they print on stdout.

pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod pipelines;
pub mod registry;
pub mod repository;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use context::OrchestratorContext;
pub use error::{Error, Result};
pub use registry::WorkerRegistry;
pub use scheduler::PipelineCoordinator;
