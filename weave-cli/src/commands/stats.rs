//! Stats command handler

use anyhow::Result;
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;
use weave_runner::OrchestratorContext;
use weave_runner::service::{Statistics, statistics};

/// Show runtime statistics
pub async fn show_stats(context: &Arc<OrchestratorContext>, json: bool) -> Result<ExitCode> {
    let stats = statistics(context).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_stats(stats: &Statistics) {
    println!("{}", "Statistics:".bold());
    println!(
        "  Supported workers: {}",
        stats.supported_workers.join(", ").cyan()
    );
    println!("  Active processes:  {}", stats.active_processes);
    println!("  Peak processes:    {}", stats.peak_processes);
    println!("  Shared data:       {} bytes", stats.shared_data_size);
    println!("  Cache:             {} bytes", stats.cache_size);
    println!("  Pending inbox:     {}", stats.pending_inbox);
    println!("  Pending outbox:    {}", stats.pending_outbox);
    println!(
        "  Generated:         {}",
        stats
            .generated_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );

    for invocation in &stats.active_invocations {
        println!(
            "    {} {} {} {}",
            "▸".cyan(),
            invocation.worker.bold(),
            invocation.script_path,
            invocation
                .started_at
                .format("%H:%M:%S")
                .to_string()
                .dimmed()
        );
    }
}
