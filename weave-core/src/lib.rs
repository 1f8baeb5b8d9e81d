//! Weave Core
//!
//! Core types for the Weave multi-language worker orchestrator.
//!
//! This crate contains only data: descriptors of the external worker
//! programs, the messages they exchange and the results and reports the
//! orchestrator produces. Execution logic lives in `weave-runner`.

pub mod domain;
