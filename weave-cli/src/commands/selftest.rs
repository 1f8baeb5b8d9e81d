//! Test command handler
//!
//! Launches a one-line Python worker and checks that its JSON answer comes
//! back, then prints a short statistics summary.

use anyhow::Result;
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;
use weave_runner::command::CommandBuilder;
use weave_runner::service::{ProcessRunner, TokioProcessRunner, statistics};
use weave_runner::OrchestratorContext;

use super::exit_code;

const PROBE_WORKER: &str = "python";
const PROBE_SCRIPT: &str = r#"import json; print(json.dumps({"status": "ok", "message": "Python communication test"}))"#;

/// Run the inter-language communication test
pub async fn communication_test(context: &Arc<OrchestratorContext>) -> Result<ExitCode> {
    println!("{}", "Testing inter-language communication...".bold());

    let descriptor = context.registry.resolve(PROBE_WORKER)?;
    let spec = CommandBuilder::from_context(context)
        .build(descriptor, "-c", vec![PROBE_SCRIPT.to_string()], None, "selftest")
        .await?;

    let runner = TokioProcessRunner::from_context(context);
    let passed = match runner.run(spec, context.child_token()).await {
        Ok(result) => {
            let ok = result.succeeded
                && result
                    .parsed_payload
                    .as_ref()
                    .and_then(|p| p.get("status"))
                    .and_then(|s| s.as_str())
                    == Some("ok");
            if !ok && !result.stderr.trim().is_empty() {
                println!("  {}", result.stderr.trim().dimmed());
            }
            ok
        }
        Err(e) => {
            println!("  {}", e.to_string().dimmed());
            false
        }
    };

    if passed {
        println!("  {} {}", "✓".green(), descriptor.label());
    } else {
        println!("  {} {}", "✗".red(), descriptor.label());
    }

    let stats = statistics(context).await?;
    println!();
    println!(
        "  Supported workers: {}",
        stats.supported_workers.join(", ").cyan()
    );
    println!("  Shared data:       {} bytes", stats.shared_data_size);

    Ok(exit_code(passed))
}
