//! Service layer
//!
//! Services contain the execution logic of the engine. The process runner
//! launches worker invocations under a concurrency ceiling and a deadline;
//! the statistics service inspects the running context.
//!
//! The runner is trait-based so the coordinator can be tested with a fake.

mod process;
mod statistics;

// Re-export traits
pub use process::ProcessRunner;

// Re-export implementations
pub use process::TokioProcessRunner;
pub use statistics::{InvocationSummary, Statistics, directory_size, statistics};
