//! File mailbox
//!
//! Durable message exchange between workers on one host:
//!
//! ```text
//! communication/
//!   outbox/            {messageId}_{targetLanguage}.json written by send()
//!   inbox/             pending messages
//!   inbox/processed/   consumed messages
//!   logs/
//! ```
//!
//! Moving a file from `inbox/` to `inbox/processed/` is the only consumption
//! marker. A crash between reading and moving leaves the file in the inbox,
//! so consumers must tolerate redelivery.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use weave_core::domain::message::{MESSAGE_EXTENSION, Message};

use super::{ensure_dir, list_files, write_atomic};
use crate::error::{Error, Result};

/// Repository trait for mailbox operations
#[async_trait]
pub trait MailboxRepository: Send + Sync {
    /// Writes a message to the outbox
    ///
    /// # Returns
    /// Path of the artifact written
    async fn send(&self, message: &Message) -> Result<PathBuf>;

    /// Consumes every pending inbox message
    ///
    /// Malformed files are logged and left in place; they never abort the
    /// batch.
    async fn receive_all(&self) -> Result<Vec<Message>>;

    /// Consumes pending inbox messages addressed to `worker`
    ///
    /// Selection uses the file name only; other files are not opened.
    async fn receive_for(&self, worker: &str) -> Result<Vec<Message>>;
}

/// Pending message counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxCounts {
    pub inbox: usize,
    pub outbox: usize,
    pub processed: usize,
}

/// Filesystem implementation of MailboxRepository
#[derive(Debug, Clone)]
pub struct FileMailbox {
    root: PathBuf,
}

impl FileMailbox {
    /// Creates a mailbox rooted at `root`; directories are created on first use
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.root.join("outbox")
    }

    pub fn inbox_dir(&self) -> PathBuf {
        self.root.join("inbox")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.inbox_dir().join("processed")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Creates every mailbox directory; safe to call repeatedly
    pub async fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.outbox_dir(),
            self.processed_dir(),
            self.logs_dir(),
        ] {
            ensure_dir(&dir).await?;
        }
        Ok(())
    }

    /// Moves every outbox artifact into `recipient`'s inbox
    ///
    /// This is the local transport between two mailboxes on the same
    /// filesystem; a mailbox may deliver to itself.
    ///
    /// # Returns
    /// Number of artifacts moved
    pub async fn deliver_to(&self, recipient: &FileMailbox) -> Result<usize> {
        self.ensure_layout().await?;
        recipient.ensure_layout().await?;

        let mut delivered = 0;
        for path in list_files(&self.outbox_dir(), MESSAGE_EXTENSION).await? {
            let Some(name) = path.file_name() else {
                continue;
            };
            let destination = recipient.inbox_dir().join(name);

            match tokio::fs::rename(&path, &destination).await {
                Ok(()) => {
                    debug!("Delivered {} to {}", path.display(), destination.display());
                    delivered += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{} was delivered concurrently", path.display());
                }
                Err(e) => return Err(Error::io(&path, e)),
            }
        }

        if delivered > 0 {
            info!(
                "Delivered {} message(s) to {}",
                delivered,
                recipient.root.display()
            );
        }
        Ok(delivered)
    }

    /// Counts artifacts in each mailbox area
    pub async fn counts(&self) -> Result<MailboxCounts> {
        Ok(MailboxCounts {
            inbox: list_files(&self.inbox_dir(), MESSAGE_EXTENSION).await?.len(),
            outbox: list_files(&self.outbox_dir(), MESSAGE_EXTENSION).await?.len(),
            processed: list_files(&self.processed_dir(), MESSAGE_EXTENSION)
                .await?
                .len(),
        })
    }

    async fn receive_matching(&self, target: Option<&str>) -> Result<Vec<Message>> {
        self.ensure_layout().await?;

        let mut messages = Vec::new();

        for path in list_files(&self.inbox_dir(), MESSAGE_EXTENSION).await? {
            if let Some(worker) = target {
                if !addressed_to(&path, worker) {
                    continue;
                }
            }

            let message = match read_message(&path).await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping mailbox file: {}", e);
                    continue;
                }
            };

            // The rename is the claim: only one consumer can win it
            let Some(name) = path.file_name() else {
                continue;
            };
            match tokio::fs::rename(&path, self.processed_dir().join(name)).await {
                Ok(()) => messages.push(message),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{} consumed by another receiver", path.display());
                }
                Err(e) => {
                    warn!(
                        "Failed to mark {} as processed, leaving it for redelivery: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        messages.sort_by_key(|m| m.created_at);

        if !messages.is_empty() {
            info!("Received {} message(s)", messages.len());
        }
        Ok(messages)
    }
}

#[async_trait]
impl MailboxRepository for FileMailbox {
    async fn send(&self, message: &Message) -> Result<PathBuf> {
        self.ensure_layout().await?;

        let path = self.outbox_dir().join(message.file_name());
        let body = serde_json::to_vec_pretty(message)?;
        write_atomic(&path, &body).await?;

        info!(
            "Message sent: {} -> {} ({}, {})",
            message.source_worker, message.target_worker, message.kind, message.id
        );
        Ok(path)
    }

    async fn receive_all(&self) -> Result<Vec<Message>> {
        self.receive_matching(None).await
    }

    async fn receive_for(&self, worker: &str) -> Result<Vec<Message>> {
        self.receive_matching(Some(worker)).await
    }
}

/// Whether `{messageId}_{target}.json` names `worker` as its target
///
/// Matched as a suffix: both message ids and worker names may contain
/// underscores.
fn addressed_to(path: &Path, worker: &str) -> bool {
    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
        return false;
    };
    stem.strip_suffix(worker)
        .and_then(|rest| rest.strip_suffix('_'))
        .is_some_and(|id| !id.is_empty())
}

/// Reads and decodes one inbox file
///
/// Returns `Ok(None)` when the file vanished (consumed by someone else).
async fn read_message(path: &Path) -> Result<Option<Message>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::MailboxCorruption {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::domain::message::MessageKind;

    fn mailbox() -> (tempfile::TempDir, FileMailbox) {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = FileMailbox::new(dir.path().join("communication"));
        (dir, mailbox)
    }

    #[tokio::test]
    async fn test_send_writes_named_artifact() {
        let (_dir, mailbox) = mailbox();
        let message = Message::new("python", "ruby", MessageKind::Data, serde_json::json!({"n": 1}));

        let path = mailbox.send(&message).await.unwrap();

        assert_eq!(path, mailbox.outbox_dir().join(format!("{}_ruby.json", message.id)));
        let stored: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored["messageId"], message.id.as_str());
        assert_eq!(stored["targetLanguage"], "ruby");
        assert!(mailbox.logs_dir().is_dir());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_message() {
        let (_dir, mailbox) = mailbox();
        let message = Message::new(
            "cpp",
            "rust",
            MessageKind::Command,
            serde_json::json!({"op": "optimize", "level": 3}),
        );

        mailbox.send(&message).await.unwrap();
        assert_eq!(mailbox.deliver_to(&mailbox).await.unwrap(), 1);

        let received = mailbox.receive_all().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload, message.payload);
        assert_eq!(received[0].id, message.id);
        assert_eq!(received[0].kind, message.kind);
    }

    #[tokio::test]
    async fn test_receive_all_is_idempotent() {
        let (_dir, mailbox) = mailbox();
        for target in ["ruby", "php", "lua"] {
            let message = Message::new("python", target, MessageKind::Data, serde_json::json!(target));
            mailbox.send(&message).await.unwrap();
        }
        mailbox.deliver_to(&mailbox).await.unwrap();

        let first = mailbox.receive_all().await.unwrap();
        assert_eq!(first.len(), 3);

        let second = mailbox.receive_all().await.unwrap();
        assert!(second.is_empty());

        let counts = mailbox.counts().await.unwrap();
        assert_eq!(counts.inbox, 0);
        assert_eq!(counts.processed, 3);
    }

    #[tokio::test]
    async fn test_malformed_files_are_skipped() {
        let (_dir, mailbox) = mailbox();
        mailbox.ensure_layout().await.unwrap();
        std::fs::write(mailbox.inbox_dir().join("broken_ruby.json"), "{not json").unwrap();

        let good = Message::new("python", "ruby", MessageKind::Response, serde_json::json!(null));
        mailbox.send(&good).await.unwrap();
        mailbox.deliver_to(&mailbox).await.unwrap();

        let received = mailbox.receive_all().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, good.id);

        // The corrupt file stays pending and is never reported as a message
        assert!(mailbox.inbox_dir().join("broken_ruby.json").exists());
        assert!(mailbox.receive_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receive_for_filters_by_file_name() {
        let (_dir, mailbox) = mailbox();
        let for_ruby = Message::new("python", "ruby", MessageKind::Data, serde_json::json!(1));
        let for_php = Message::new("python", "php", MessageKind::Data, serde_json::json!(2));
        mailbox.send(&for_ruby).await.unwrap();
        mailbox.send(&for_php).await.unwrap();
        mailbox.deliver_to(&mailbox).await.unwrap();

        let ruby = mailbox.receive_for("ruby").await.unwrap();
        assert_eq!(ruby.len(), 1);
        assert_eq!(ruby[0].id, for_ruby.id);

        assert_eq!(mailbox.counts().await.unwrap().inbox, 1);
        let rest = mailbox.receive_all().await.unwrap();
        assert_eq!(rest[0].id, for_php.id);
    }

    #[tokio::test]
    async fn test_deliver_between_mailboxes() {
        let dir = tempfile::tempdir().unwrap();
        let sender = FileMailbox::new(dir.path().join("a"));
        let receiver = FileMailbox::new(dir.path().join("b"));

        let message = Message::new("ruby", "lua", MessageKind::Error, serde_json::json!("oops"));
        sender.send(&message).await.unwrap();
        assert_eq!(sender.deliver_to(&receiver).await.unwrap(), 1);

        assert_eq!(sender.counts().await.unwrap().outbox, 0);
        assert!(sender.receive_all().await.unwrap().is_empty());
        assert_eq!(receiver.receive_all().await.unwrap()[0].id, message.id);
    }

    #[tokio::test]
    async fn test_concurrent_receivers_consume_once() {
        let (_dir, mailbox) = mailbox();
        for i in 0..20 {
            let message = Message::new("python", "ruby", MessageKind::Data, serde_json::json!(i));
            mailbox.send(&message).await.unwrap();
        }
        mailbox.deliver_to(&mailbox).await.unwrap();

        let a = mailbox.clone();
        let b = mailbox.clone();
        let (left, right) = tokio::join!(
            tokio::spawn(async move { a.receive_all().await.unwrap() }),
            tokio::spawn(async move { b.receive_all().await.unwrap() }),
        );

        let total = left.unwrap().len() + right.unwrap().len();
        assert_eq!(total, 20);
    }

    #[test]
    fn test_addressed_to() {
        assert!(addressed_to(Path::new("/x/abc_ruby.json"), "ruby"));
        assert!(addressed_to(Path::new("/x/abc_shell_script.json"), "shell_script"));
        assert!(addressed_to(Path::new("/x/msg_01_ruby.json"), "ruby"));
        assert!(!addressed_to(Path::new("/x/msg_01_ruby.json"), "php"));
        assert!(!addressed_to(Path::new("/x/xruby.json"), "ruby"));
        assert!(!addressed_to(Path::new("/x/_ruby.json"), "ruby"));
    }

    #[tokio::test]
    async fn test_receive_for_handles_underscored_ids() {
        let (_dir, mailbox) = mailbox();
        mailbox.ensure_layout().await.unwrap();
        let raw = r#"{
            "source_language": "python",
            "target_language": "ruby",
            "message_type": "data",
            "payload": {"n": 1},
            "timestamp": "2024-05-01T10:00:00.123456",
            "message_id": "msg_01"
        }"#;
        std::fs::write(mailbox.inbox_dir().join("msg_01_ruby.json"), raw).unwrap();

        let received = mailbox.receive_for("ruby").await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, "msg_01");
        assert!(!mailbox.inbox_dir().join("msg_01_ruby.json").exists());
        assert!(mailbox.processed_dir().join("msg_01_ruby.json").exists());
    }
}
