//! Mailbox message types

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A message exchanged between workers through the file mailbox
///
/// Field names on disk follow the mailbox file format shared with the
/// workers; the snake_case aliases keep older artifacts readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "sourceLanguage", alias = "source_language")]
    pub source_worker: String,

    #[serde(rename = "targetLanguage", alias = "target_language")]
    pub target_worker: String,

    #[serde(rename = "messageType", alias = "message_type")]
    pub kind: MessageKind,

    pub payload: JsonValue,

    #[serde(rename = "timestamp", deserialize_with = "iso_timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "messageId", alias = "message_id")]
    pub id: String,
}

impl Message {
    /// Creates a message stamped with a fresh id and the current time
    pub fn new(
        source_worker: impl Into<String>,
        target_worker: impl Into<String>,
        kind: MessageKind,
        payload: JsonValue,
    ) -> Self {
        Self {
            source_worker: source_worker.into(),
            target_worker: target_worker.into(),
            kind,
            payload,
            created_at: Utc::now(),
            id: Uuid::new_v4().simple().to_string(),
        }
    }

    /// File name used in the outbox: `{messageId}_{targetLanguage}.json`
    pub fn file_name(&self) -> String {
        format!("{}_{}.{}", self.id, self.target_worker, MESSAGE_EXTENSION)
    }
}

/// Reads RFC 3339 timestamps, and offset-less ISO-8601 ones as UTC
fn iso_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .or_else(|_| raw.parse::<NaiveDateTime>().map(|naive| naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
}

/// Extension of message artifacts
pub const MESSAGE_EXTENSION: &str = "json";

/// Message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Command,
    Data,
    Response,
    Error,
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command" => Ok(MessageKind::Command),
            "data" => Ok(MessageKind::Data),
            "response" => Ok(MessageKind::Response),
            "error" => Ok(MessageKind::Error),
            other => Err(format!("unknown message type '{}'", other)),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Command => write!(f, "command"),
            MessageKind::Data => write!(f, "data"),
            MessageKind::Response => write!(f, "response"),
            MessageKind::Error => write!(f, "error"),
        }
    }
}
