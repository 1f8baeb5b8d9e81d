//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod colors;
mod mailbox;
mod pipeline;
mod selftest;
mod stats;
mod workers;

pub use mailbox::MailboxCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;
use weave_runner::OrchestratorContext;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline over a set of input files
    Pipeline {
        /// Input files (images for the optimization pipeline)
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<String>,

        /// Built-in pipeline to run
        #[arg(long, default_value = weave_runner::pipelines::OPTIMIZATION)]
        name: String,
    },
    /// Create the unified color system
    Colors,
    /// Show runtime statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that workers can be launched and answer
    Test,
    /// List registered workers
    Workers,
    /// Send or receive mailbox messages
    Mailbox {
        #[command(subcommand)]
        command: MailboxCommands,
    },
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `context` - The orchestrator context
///
/// # Returns
/// The process exit code; non-zero when the action failed
pub async fn handle_command(command: Commands, context: &Arc<OrchestratorContext>) -> Result<ExitCode> {
    match command {
        Commands::Pipeline { inputs, name } => pipeline::run_pipeline(context, &name, inputs).await,
        Commands::Colors => colors::create_colors(context).await,
        Commands::Stats { json } => stats::show_stats(context, json).await,
        Commands::Test => selftest::communication_test(context).await,
        Commands::Workers => workers::list_workers(context),
        Commands::Mailbox { command } => mailbox::handle_mailbox_command(command, context).await,
    }
}

/// Shuts the context down on Ctrl-C, killing running workers
fn cancel_on_interrupt(context: &Arc<OrchestratorContext>) -> JoinHandle<()> {
    let context = Arc::clone(context);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("{}", "Interrupted, cancelling running workers...".yellow());
                context.shutdown();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    })
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
