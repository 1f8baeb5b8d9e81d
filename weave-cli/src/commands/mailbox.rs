//! Mailbox command handlers
//!
//! Sends messages to the outbox and receives messages from the inbox of the
//! orchestrator's own mailbox.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use serde_json::Value as JsonValue;
use std::process::ExitCode;
use std::sync::Arc;
use weave_core::domain::message::{Message, MessageKind};
use weave_runner::OrchestratorContext;
use weave_runner::repository::MailboxRepository;

/// Mailbox subcommands
#[derive(Subcommand)]
pub enum MailboxCommands {
    /// Write a message to the outbox
    Send {
        /// Sending worker
        #[arg(long)]
        from: String,

        /// Receiving worker
        #[arg(long)]
        to: String,

        /// Message type: command, data, response or error
        #[arg(long, default_value = "data")]
        kind: MessageKind,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Consume pending inbox messages
    Receive {
        /// Only messages addressed to this worker
        #[arg(long)]
        worker: Option<String>,

        /// Move outbox messages into the inbox first
        #[arg(long)]
        loopback: bool,
    },
}

/// Handle mailbox commands
///
/// # Arguments
/// * `command` - The mailbox command to execute
/// * `context` - The orchestrator context
pub async fn handle_mailbox_command(
    command: MailboxCommands,
    context: &Arc<OrchestratorContext>,
) -> Result<ExitCode> {
    match command {
        MailboxCommands::Send {
            from,
            to,
            kind,
            payload,
        } => send_message(context, from, to, kind, &payload).await,
        MailboxCommands::Receive { worker, loopback } => {
            receive_messages(context, worker.as_deref(), loopback).await
        }
    }
}

async fn send_message(
    context: &OrchestratorContext,
    from: String,
    to: String,
    kind: MessageKind,
    payload: &str,
) -> Result<ExitCode> {
    let payload: JsonValue =
        serde_json::from_str(payload).context("Payload must be valid JSON")?;

    let message = Message::new(from, to, kind, payload);
    let path = context.mailbox().send(&message).await?;

    println!("{}", "✓ Message sent".green().bold());
    println!("  ID:   {}", message.id.cyan());
    println!("  File: {}", path.display().to_string().dimmed());

    Ok(ExitCode::SUCCESS)
}

async fn receive_messages(
    context: &OrchestratorContext,
    worker: Option<&str>,
    loopback: bool,
) -> Result<ExitCode> {
    let mailbox = context.mailbox();

    if loopback {
        let moved = mailbox.deliver_to(&mailbox).await?;
        println!("{}", format!("Moved {} message(s) to the inbox", moved).dimmed());
    }

    let messages = match worker {
        Some(worker) => mailbox.receive_for(worker).await?,
        None => mailbox.receive_all().await?,
    };

    if messages.is_empty() {
        println!("{}", "No pending messages.".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{}",
        format!("Received {} message(s):", messages.len()).bold()
    );
    println!();
    for message in &messages {
        print_message(message);
    }

    Ok(ExitCode::SUCCESS)
}

/// Print a message summary
fn print_message(message: &Message) {
    println!(
        "  {} {} → {} {}",
        "▸".cyan(),
        message.source_worker.bold(),
        message.target_worker.bold(),
        format!("[{}]", message.kind).yellow()
    );
    println!("    ID:      {}", message.id.dimmed());
    println!(
        "    Sent:    {}",
        message
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!("    Payload: {}", message.payload);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_runner::Config;

    #[tokio::test]
    async fn test_send_then_receive_with_loopback() {
        let dir = tempfile::tempdir().unwrap();
        let context = OrchestratorContext::new(Config::new(dir.path())).unwrap();

        send_message(
            &context,
            "ruby".to_string(),
            "javascript".to_string(),
            MessageKind::Data,
            r##"{"palette": ["#fff"]}"##,
        )
        .await
        .unwrap();
        assert_eq!(context.mailbox().counts().await.unwrap().outbox, 1);

        receive_messages(&context, Some("javascript"), true).await.unwrap();
        let counts = context.mailbox().counts().await.unwrap();
        assert_eq!(counts.outbox, 0);
        assert_eq!(counts.inbox, 0);
        assert_eq!(counts.processed, 1);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let context = OrchestratorContext::new(Config::new(dir.path())).unwrap();

        let result = send_message(
            &context,
            "a".to_string(),
            "b".to_string(),
            MessageKind::Command,
            "not json",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(context.mailbox().counts().await.unwrap().outbox, 0);
    }
}
