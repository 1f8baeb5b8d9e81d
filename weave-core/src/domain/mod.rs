//! Core domain types
//!
//! This module contains the structures shared by the orchestration engine and
//! its command-line front end: worker descriptors, mailbox messages, execution
//! results and pipeline definitions/reports.

pub mod execution;
pub mod message;
pub mod pipeline;
pub mod worker;
