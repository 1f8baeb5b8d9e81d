//! Scheduler layer
//!
//! This layer turns pipeline definitions into ordered worker invocations.
//! It decides which stages run, skip or get cancelled, and aggregates their
//! outcomes into a persisted report.

pub mod coordinator;
pub mod template;

pub use coordinator::PipelineCoordinator;
pub use template::TemplateContext;
