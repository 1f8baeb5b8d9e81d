//! Weave CLI
//!
//! Command-line front end of the Weave orchestrator: runs the built-in
//! pipelines, inspects workers and statistics, and exchanges mailbox messages.

mod commands;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use commands::{Commands, handle_command};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use weave_core::domain::pipeline::FailurePolicy;
use weave_runner::{Config, OrchestratorContext};

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Multi-language worker orchestrator", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(long, env = "WEAVE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Base directory for workers and data (overrides WEAVE_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Skip every stage after the first failure
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Action to run; defaults to the communication test
    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref(), cli.root.as_deref(), cli.fail_fast)?;

    logging::init(&config)?;
    info!("Starting weave (root={})", config.root_dir.display());

    let context =
        OrchestratorContext::new(config).context("Failed to build the worker registry")?;

    println!("{}", "Weave multi-language orchestrator".bold());
    println!("{}", "=".repeat(50).dimmed());

    let code = handle_command(cli.command.unwrap_or(Commands::Test), &context).await;
    context.shutdown();
    code
}

/// Loads configuration and applies the command-line overrides
fn load_config(path: Option<&Path>, root: Option<&Path>, fail_fast: bool) -> Result<Config> {
    let mut config = Config::load(path)?;

    if let Some(root) = root {
        config.root_dir = std::path::absolute(root)
            .with_context(|| format!("Invalid root directory: {}", root.display()))?;
    }
    if fail_fast {
        config.failure_policy = FailurePolicy::FailFast;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_no_subcommand() {
        let cli = Cli::try_parse_from(["weave"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.fail_fast);
    }

    #[test]
    fn test_pipeline_requires_inputs() {
        let err = Cli::try_parse_from(["weave", "pipeline"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from(["weave", "pipeline", "a.png", "b.png", "--fail-fast"]).unwrap();
        assert!(cli.fail_fast);
        match cli.command {
            Some(Commands::Pipeline { inputs, name }) => {
                assert_eq!(inputs, vec!["a.png", "b.png"]);
                assert_eq!(name, "optimization");
            }
            _ => panic!("expected pipeline command"),
        }
    }

    #[test]
    fn test_root_and_fail_fast_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("weave.yaml");
        std::fs::write(&config_file, "max_concurrent_processes: 3\n").unwrap();

        let config = load_config(Some(&config_file), Some(dir.path()), true).unwrap();
        assert_eq!(config.root_dir, dir.path());
        assert_eq!(config.max_concurrent_processes, 3);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
    }
}
