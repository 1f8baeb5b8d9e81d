//! Pipeline command handler
//!
//! Runs a built-in pipeline and prints its report.

use anyhow::{Result, anyhow};
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;
use weave_core::domain::pipeline::{PipelineReport, RunState, StageReport, StageStatus};
use weave_runner::repository::FileReportRepository;
use weave_runner::{OrchestratorContext, PipelineCoordinator, pipelines};

use super::{cancel_on_interrupt, exit_code};

/// Run a built-in pipeline over the given inputs
pub async fn run_pipeline(
    context: &Arc<OrchestratorContext>,
    name: &str,
    inputs: Vec<String>,
) -> Result<ExitCode> {
    let definition = pipelines::builtin(name).ok_or_else(|| {
        anyhow!(
            "Unknown pipeline '{}' (available: {})",
            name,
            pipelines::names().join(", ")
        )
    })?;

    println!(
        "{}",
        format!(
            "Running pipeline '{}' over {} input(s)...",
            definition.name,
            inputs.len()
        )
        .bold()
    );

    let interrupt = cancel_on_interrupt(context);
    let coordinator = PipelineCoordinator::new(Arc::clone(context));
    let result = coordinator.run(&definition, &inputs).await;
    interrupt.abort();

    let report = result?;
    let report_path = FileReportRepository::new(context.shared_data_dir()).report_path(&report.run_id);

    print_report(&report);
    if report_path.exists() {
        println!("  Report:   {}", report_path.display().to_string().dimmed());
    } else {
        println!(
            "  Report:   {}",
            "could not be saved, see weave.log".yellow()
        );
    }

    Ok(exit_code(report.succeeded))
}

/// Print a pipeline report
pub fn print_report(report: &PipelineReport) {
    println!();
    if report.succeeded {
        println!(
            "{}",
            format!("✓ Pipeline '{}' completed", report.pipeline).green().bold()
        );
    } else {
        println!(
            "{}",
            format!("✗ Pipeline '{}' did not complete", report.pipeline)
                .red()
                .bold()
        );
    }
    println!("  Run ID:   {}", report.run_id.cyan());
    println!("  State:    {}", colorize_state(report.state));
    println!("  Inputs:   {}", report.total_inputs);
    println!("  Duration: {}ms", report.duration_ms);
    println!("  Chain:    {}", report.processing_chain.join(" → ").dimmed());

    println!("\n{}", "Stages:".bold());
    for stage in &report.stages {
        print_stage(stage);
    }
    println!();
}

fn print_stage(stage: &StageReport) {
    println!(
        "  {} {} ({}) {} {}",
        "▸".cyan(),
        stage.label.bold(),
        stage.worker,
        colorize_status(&stage.status),
        format!("{}ms", stage.duration_ms).dimmed()
    );

    match &stage.status {
        StageStatus::Failed { kind, message } => {
            println!("      {} {}", format!("{:?}:", kind).red(), message.dimmed());
        }
        StageStatus::Skipped { reason } => println!("      {}", reason.dimmed()),
        StageStatus::Succeeded | StageStatus::Cancelled => {}
    }
}

/// Colorize a stage status for display
fn colorize_status(status: &StageStatus) -> ColoredString {
    match status {
        StageStatus::Succeeded => status.name().green(),
        StageStatus::Failed { .. } => status.name().red(),
        StageStatus::Skipped { .. } => status.name().yellow(),
        StageStatus::Cancelled => status.name().magenta(),
    }
}

/// Colorize a run state for display
fn colorize_state(state: RunState) -> ColoredString {
    let text = state.to_string();
    match state {
        RunState::Succeeded => text.green(),
        RunState::PartiallyFailed => text.yellow(),
        RunState::Failed => text.red(),
        RunState::Cancelled => text.magenta(),
        RunState::Pending | RunState::Running => text.normal(),
    }
}
