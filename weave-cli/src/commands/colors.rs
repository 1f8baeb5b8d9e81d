//! Colors command handler
//!
//! Generates the master palette, optimizes it and stores the unified color
//! system in the shared-data directory.

use anyhow::Result;
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;
use weave_runner::pipelines::create_unified_color_system;
use weave_runner::repository::FileReportRepository;
use weave_runner::{OrchestratorContext, PipelineCoordinator};

use super::pipeline::print_report;
use super::{cancel_on_interrupt, exit_code};

/// Create the unified color system
pub async fn create_colors(context: &Arc<OrchestratorContext>) -> Result<ExitCode> {
    println!("{}", "Creating unified color system...".bold());

    let interrupt = cancel_on_interrupt(context);
    let coordinator = PipelineCoordinator::new(Arc::clone(context));
    let reports = FileReportRepository::new(context.shared_data_dir());
    let result = create_unified_color_system(&coordinator, &reports).await;
    interrupt.abort();

    let outcome = result?;
    print_report(&outcome.report);

    match outcome.system {
        Some((system, path)) => {
            println!("{}", "✓ Color system created".green().bold());
            println!("  Version:  {}", system.version.cyan());
            println!("  File:     {}", path.display().to_string().dimmed());
            println!(
                "  Palette:  {}",
                palette_summary(&system.master_palette).dimmed()
            );
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("{}", "✗ Master palette generation failed".red().bold());
            Ok(exit_code(false))
        }
    }
}

fn palette_summary(palette: &serde_json::Value) -> String {
    match palette {
        serde_json::Value::Object(map) => format!("{} group(s)", map.len()),
        serde_json::Value::Array(items) => format!("{} color(s)", items.len()),
        other => other.to_string(),
    }
}
