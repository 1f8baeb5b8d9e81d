//! Pipeline domain types
//!
//! A pipeline definition is an ordered list of stages, each one a single
//! worker invocation. A run binds a definition to a run id and an input set,
//! and produces a report with one entry per stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::execution::ExecutionResult;

/// One step of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub label: String,
    pub worker: String,
    pub script_path: String,

    /// Arguments with `{run_id}`, `{inputs}`, `{inputs_csv}`, `{input_count}`
    /// and `{shared_data}` placeholders
    #[serde(default)]
    pub arguments_template: Vec<String>,

    /// Feed the previous stage's parsed payload as `--input`; the stage is
    /// skipped when that stage did not succeed
    #[serde(default)]
    pub depends_on_previous_output: bool,

    /// Only run when every earlier stage succeeded
    #[serde(default)]
    pub requires_all_previous: bool,

    /// Static payload handed to the worker, merged with any forwarded output
    #[serde(default)]
    pub input: Option<JsonValue>,

    /// Wrap the forwarded payload under this key instead of passing it as-is
    #[serde(default)]
    pub forward_as: Option<String>,

    /// Also publish the parsed payload to this worker's mailbox
    #[serde(default)]
    pub publish_to: Option<String>,
}

impl PipelineStage {
    pub fn new(
        label: impl Into<String>,
        worker: impl Into<String>,
        script_path: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            worker: worker.into(),
            script_path: script_path.into(),
            arguments_template: Vec::new(),
            depends_on_previous_output: false,
            requires_all_previous: false,
            input: None,
            forward_as: None,
            publish_to: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments_template = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn depends_on_previous(mut self) -> Self {
        self.depends_on_previous_output = true;
        self
    }

    pub fn requires_all_previous(mut self) -> Self {
        self.requires_all_previous = true;
        self
    }

    pub fn with_input(mut self, input: JsonValue) -> Self {
        self.input = Some(input);
        self
    }

    pub fn forward_as(mut self, key: impl Into<String>) -> Self {
        self.forward_as = Some(key.into());
        self
    }

    pub fn publish_to(mut self, worker: impl Into<String>) -> Self {
        self.publish_to = Some(worker.into());
        self
    }
}

/// Ordered sequence of stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<PipelineStage>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, stages: Vec<PipelineStage>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    /// Stage labels in execution order
    pub fn processing_chain(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.label.clone()).collect()
    }
}

/// What happens to later stages once a stage fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep running independent stages, mark the run as failed at the end
    #[default]
    Continue,
    /// Skip every stage after the first failure
    FailFast,
}

/// Lifecycle of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
    Cancelled,
}

impl RunState {
    /// Terminal state for a finished run
    pub fn from_stages(stages: &[StageReport], cancelled: bool) -> Self {
        if cancelled {
            return RunState::Cancelled;
        }
        let succeeded = stages.iter().filter(|s| s.status.is_success()).count();
        if succeeded == stages.len() {
            RunState::Succeeded
        } else if succeeded > 0 {
            RunState::PartiallyFailed
        } else {
            RunState::Failed
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Pending | RunState::Running)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Pending => write!(f, "Pending"),
            RunState::Running => write!(f, "Running"),
            RunState::Succeeded => write!(f, "Succeeded"),
            RunState::PartiallyFailed => write!(f, "PartiallyFailed"),
            RunState::Failed => write!(f, "Failed"),
            RunState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Why a stage failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Worker ran and exited non-zero
    ExitCode,
    BuildFailed,
    LaunchFailed,
    Timeout,
    /// Unknown worker or invalid stage setup
    Configuration,
    /// Filesystem or serialization problem on the orchestrator side
    Internal,
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed { kind: FailureKind, message: String },
    /// Never invoked because a required upstream stage did not succeed
    Skipped { reason: String },
    /// Never completed because the run was cancelled
    Cancelled,
}

impl StageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StageStatus::Succeeded)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed { .. } => "failed",
            StageStatus::Skipped { .. } => "skipped",
            StageStatus::Cancelled => "cancelled",
        }
    }
}

/// Report entry for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub label: String,
    pub worker: String,
    #[serde(flatten)]
    pub status: StageStatus,
    /// Present only when the worker process actually ran
    pub result: Option<ExecutionResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl StageReport {
    /// Entry for a stage that was never invoked
    pub fn not_run(stage: &PipelineStage, status: StageStatus) -> Self {
        Self {
            label: stage.label.clone(),
            worker: stage.worker.clone(),
            status,
            result: None,
            started_at: None,
            duration_ms: 0,
        }
    }

    pub fn parsed_payload(&self) -> Option<&JsonValue> {
        self.result.as_ref().and_then(|r| r.parsed_payload.as_ref())
    }
}

/// Final, persisted summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub pipeline: String,
    pub state: RunState,
    pub succeeded: bool,
    pub inputs: Vec<String>,
    pub total_inputs: usize,
    pub stages: Vec<StageReport>,
    pub processing_chain: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn stage(&self, label: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(label: &str, status: StageStatus) -> StageReport {
        StageReport::not_run(&PipelineStage::new(label, "python", "x.py"), status)
    }

    #[test]
    fn test_only_finished_states_are_terminal() {
        assert!(!RunState::Pending.is_terminal());
        assert!(!RunState::Running.is_terminal());
        for state in [
            RunState::Succeeded,
            RunState::PartiallyFailed,
            RunState::Failed,
            RunState::Cancelled,
        ] {
            assert!(state.is_terminal(), "{}", state);
        }
    }

    #[test]
    fn test_run_state_from_stages() {
        let all_ok = vec![report("a", StageStatus::Succeeded), report("b", StageStatus::Succeeded)];
        assert_eq!(RunState::from_stages(&all_ok, false), RunState::Succeeded);

        let partial = vec![
            report("a", StageStatus::Succeeded),
            report("b", StageStatus::Skipped { reason: "upstream".into() }),
        ];
        assert_eq!(RunState::from_stages(&partial, false), RunState::PartiallyFailed);

        let none = vec![report(
            "a",
            StageStatus::Failed {
                kind: FailureKind::Timeout,
                message: "timed out".into(),
            },
        )];
        assert_eq!(RunState::from_stages(&none, false), RunState::Failed);
        assert_eq!(RunState::from_stages(&all_ok, true), RunState::Cancelled);
    }

    #[test]
    fn test_stage_status_wire_format() {
        let entry = report("resize", StageStatus::Skipped { reason: "upstream failed".into() });
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["reason"], "upstream failed");
        assert_eq!(value["label"], "resize");
    }

    #[test]
    fn test_processing_chain_follows_stage_order() {
        let definition = PipelineDefinition::new(
            "demo",
            vec![
                PipelineStage::new("first", "python", "a.py"),
                PipelineStage::new("second", "ruby", "b.rb").depends_on_previous(),
            ],
        );
        assert_eq!(definition.processing_chain(), vec!["first", "second"]);
        assert!(definition.stages[1].depends_on_previous_output);
    }
}
