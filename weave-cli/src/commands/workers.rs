//! Workers command handler
//!
//! Lists the worker registry.

use anyhow::Result;
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;
use weave_core::domain::worker::{ExecutionModel, WorkerDescriptor};
use weave_runner::OrchestratorContext;

/// List registered workers
pub fn list_workers(context: &Arc<OrchestratorContext>) -> Result<ExitCode> {
    let workers = context.registry.list();

    if workers.is_empty() {
        println!("{}", "No workers registered.".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{}",
        format!("Found {} registered worker(s):", workers.len()).bold()
    );
    println!();
    for worker in workers {
        print_worker_summary(worker);
    }

    Ok(ExitCode::SUCCESS)
}

/// Print a worker summary
fn print_worker_summary(worker: &WorkerDescriptor) {
    println!("  {} {} {}", "▸".cyan(), worker.name.bold(), worker.label().dimmed());
    println!("    Launch:       {}", worker.launch_command);
    println!("    Execution:    {}", describe_execution(&worker.execution));
    if !worker.runtime_version.is_empty() {
        println!("    Version:      {}", worker.runtime_version.dimmed());
    }
    if !worker.supported_extensions.is_empty() {
        println!("    Extensions:   {}", join(&worker.supported_extensions).dimmed());
    }
    if !worker.capabilities.is_empty() {
        println!("    Capabilities: {}", join(&worker.capabilities).dimmed());
    }
    if !worker.transports.is_empty() {
        let transports: Vec<String> = worker.transports.iter().map(|t| t.to_string()).collect();
        println!("    Transports:   {}", transports.join(", ").dimmed());
    }
    println!();
}

fn describe_execution(execution: &ExecutionModel) -> String {
    match execution {
        ExecutionModel::Interpreted => "interpreted".to_string(),
        ExecutionModel::Compiled { flags } if flags.is_empty() => "build then run".to_string(),
        ExecutionModel::Compiled { flags } => format!("build then run ({})", flags.join(" ")),
        ExecutionModel::CargoProject => "cargo project".to_string(),
    }
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
