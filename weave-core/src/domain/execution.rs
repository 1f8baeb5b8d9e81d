//! Execution result of one worker invocation

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Outcome of a worker process that ran to completion
///
/// Worker-side failures (non-zero exit, unparseable output) live here as
/// fields; they are never raised as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub succeeded: bool,
    /// Absent when stdout held no JSON; a `null` document is `Some(Null)`
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_payload"
    )]
    pub parsed_payload: Option<JsonValue>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Builds a result and applies the output parsing policy
    ///
    /// The payload is only decoded for successful runs with non-empty
    /// output. A decode failure leaves it absent.
    pub fn new(exit_code: i32, stdout: String, stderr: String) -> Self {
        let succeeded = exit_code == 0;
        let parsed_payload = if succeeded {
            parse_payload(&stdout)
        } else {
            None
        };

        Self {
            exit_code,
            stdout,
            stderr,
            succeeded,
            parsed_payload,
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// A present field is a payload, even when it is `null`
fn present_payload<'de, D>(deserializer: D) -> Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

fn parse_payload(stdout: &str) -> Option<JsonValue> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
