//! Pipeline coordinator
//!
//! Executes a pipeline definition stage by stage. Each stage is resolved
//! against the registry, turned into an invocation and handed to the process
//! runner. Parsed payloads are forwarded to dependent stages and optionally
//! published through the mailbox. Every stage ends up in the report, including
//! the ones that were skipped or cancelled. The report is persisted before it
//! is returned; a report that cannot be stored is still returned.

use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use weave_core::domain::execution::ExecutionResult;
use weave_core::domain::message::{Message, MessageKind};
use weave_core::domain::pipeline::{
    FailureKind, FailurePolicy, PipelineDefinition, PipelineReport, PipelineStage, RunState,
    StageReport, StageStatus,
};

use super::template::TemplateContext;
use crate::command::CommandBuilder;
use crate::context::OrchestratorContext;
use crate::error::{Error, Result};
use crate::repository::{FileReportRepository, MailboxRepository, ReportRepository};
use crate::service::{ProcessRunner, TokioProcessRunner};

/// Runs pipelines against one orchestrator context
pub struct PipelineCoordinator {
    context: Arc<OrchestratorContext>,
    builder: CommandBuilder,
    runner: Arc<dyn ProcessRunner>,
    reports: Arc<dyn ReportRepository>,
    mailbox: Arc<dyn MailboxRepository>,
    policy: FailurePolicy,
}

impl PipelineCoordinator {
    /// Creates a coordinator with the process runner, report store and
    /// mailbox derived from the context
    pub fn new(context: Arc<OrchestratorContext>) -> Self {
        let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::from_context(&context));
        let reports: Arc<dyn ReportRepository> =
            Arc::new(FileReportRepository::new(context.shared_data_dir()));
        let mailbox: Arc<dyn MailboxRepository> = Arc::new(context.mailbox());

        Self {
            builder: CommandBuilder::from_context(&context),
            policy: context.config.failure_policy,
            context,
            runner,
            reports,
            mailbox,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_reports(mut self, reports: Arc<dyn ReportRepository>) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_mailbox(mut self, mailbox: Arc<dyn MailboxRepository>) -> Self {
        self.mailbox = mailbox;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Runs a pipeline until every stage has an outcome
    ///
    /// The run is cancelled when the context shuts down.
    pub async fn run(
        &self,
        definition: &PipelineDefinition,
        inputs: &[String],
    ) -> Result<PipelineReport> {
        self.run_with_cancel(definition, inputs, self.context.child_token())
            .await
    }

    /// Runs a pipeline under an explicit cancellation token
    ///
    /// # Arguments
    /// * `definition` - Stages to execute, in order
    /// * `inputs` - Items the run operates on, available to argument templates
    /// * `cancel` - Cancelling it kills the active stage and cancels the rest
    pub async fn run_with_cancel(
        &self,
        definition: &PipelineDefinition,
        inputs: &[String],
        cancel: CancellationToken,
    ) -> Result<PipelineReport> {
        if definition.stages.is_empty() {
            return Err(Error::EmptyPipeline(definition.name.clone()));
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        let state = RunState::Pending;

        info!(
            "Starting pipeline '{}' run {} ({} stage(s), {} input(s))",
            definition.name,
            run_id,
            definition.stages.len(),
            inputs.len()
        );

        let state = advance(&run_id, state, RunState::Running);
        let mut stages: Vec<StageReport> = Vec::with_capacity(definition.stages.len());
        let mut cancelled = false;

        for stage in &definition.stages {
            if cancel.is_cancelled() {
                cancelled = true;
                debug!("Stage '{}' cancelled before start", stage.label);
                stages.push(StageReport::not_run(stage, StageStatus::Cancelled));
                continue;
            }

            if let Some(reason) = self.skip_reason(stage, &stages) {
                warn!("Skipping stage '{}': {}", stage.label, reason);
                stages.push(StageReport::not_run(stage, StageStatus::Skipped { reason }));
                continue;
            }

            let forwarded = if stage.depends_on_previous_output {
                stages.last().and_then(|p| p.parsed_payload()).cloned()
            } else {
                None
            };

            let report = self
                .run_stage(stage, &run_id, inputs, forwarded, &cancel)
                .await;

            if report.status == StageStatus::Cancelled {
                cancelled = true;
            }

            stages.push(report);
        }

        let state = advance(&run_id, state, RunState::from_stages(&stages, cancelled));
        let report = PipelineReport {
            run_id,
            pipeline: definition.name.clone(),
            state,
            succeeded: state == RunState::Succeeded,
            inputs: inputs.to_vec(),
            total_inputs: inputs.len(),
            stages,
            processing_chain: definition.processing_chain(),
            started_at,
            completed_at: Utc::now(),
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        if let Err(e) = self.reports.save_report(&report).await {
            error!("Failed to save report for run {}: {}", report.run_id, e);
        }

        info!(
            "Pipeline '{}' run {} finished: {} in {}ms",
            report.pipeline, report.run_id, report.state, report.duration_ms
        );

        Ok(report)
    }

    /// Reason a stage must not run, given the outcomes so far
    fn skip_reason(&self, stage: &PipelineStage, completed: &[StageReport]) -> Option<String> {
        if stage.depends_on_previous_output {
            if let Some(previous) = completed.last() {
                if !previous.status.is_success() {
                    return Some(format!(
                        "previous stage '{}' {}",
                        previous.label,
                        previous.status.name()
                    ));
                }
            }
        }

        let first_unsuccessful = completed.iter().find(|s| !s.status.is_success());

        if stage.requires_all_previous {
            if let Some(earlier) = first_unsuccessful {
                return Some(format!(
                    "requires all previous stages, '{}' {}",
                    earlier.label,
                    earlier.status.name()
                ));
            }
        }

        if self.policy == FailurePolicy::FailFast {
            if let Some(earlier) = first_unsuccessful {
                return Some(format!("fail-fast after stage '{}'", earlier.label));
            }
        }

        None
    }

    /// Invokes one stage and turns the outcome into a report entry
    async fn run_stage(
        &self,
        stage: &PipelineStage,
        run_id: &str,
        inputs: &[String],
        forwarded: Option<JsonValue>,
        cancel: &CancellationToken,
    ) -> StageReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        info!("Running stage '{}' on {}", stage.label, stage.worker);

        let (status, result) = match self
            .invoke(stage, run_id, inputs, forwarded, cancel)
            .await
        {
            Ok(result) if result.succeeded => (StageStatus::Succeeded, Some(result)),
            Ok(result) => {
                let message = exit_message(&stage.worker, &result);
                error!("Stage '{}' failed: {}", stage.label, message);
                (
                    StageStatus::Failed {
                        kind: FailureKind::ExitCode,
                        message,
                    },
                    Some(result),
                )
            }
            Err(Error::Cancelled) => {
                info!("Stage '{}' cancelled", stage.label);
                (StageStatus::Cancelled, None)
            }
            Err(e) => {
                error!("Stage '{}' failed: {}", stage.label, e);
                (
                    StageStatus::Failed {
                        kind: e.failure_kind(),
                        message: e.to_string(),
                    },
                    None,
                )
            }
        };

        if let (Some(target), Some(result)) = (&stage.publish_to, &result) {
            if status.is_success() {
                self.publish(stage, target, result).await;
            }
        }

        StageReport {
            label: stage.label.clone(),
            worker: stage.worker.clone(),
            status,
            result,
            started_at: Some(started_at),
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn invoke(
        &self,
        stage: &PipelineStage,
        run_id: &str,
        inputs: &[String],
        forwarded: Option<JsonValue>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let descriptor = self.context.registry.resolve(&stage.worker)?;

        let shared_data = self.context.shared_data_dir();
        let templates = TemplateContext {
            run_id,
            shared_data: &shared_data,
            inputs,
        };
        let arguments = templates.render(&stage.arguments_template);
        let static_input = stage.input.as_ref().map(|v| templates.render_value(v));

        let payload = compose_input(stage, static_input, forwarded);

        let spec = self
            .builder
            .build(descriptor, &stage.script_path, arguments, payload, run_id)
            .await?;

        self.runner.run(spec, cancel.clone()).await
    }

    async fn publish(&self, stage: &PipelineStage, target: &str, result: &ExecutionResult) {
        let Some(payload) = &result.parsed_payload else {
            warn!(
                "Stage '{}' produced no JSON payload to publish to {}",
                stage.label, target
            );
            return;
        };

        let message = Message::new(&stage.worker, target, MessageKind::Data, payload.clone());
        match self.mailbox.send(&message).await {
            Ok(path) => debug!("Published stage '{}' output to {}", stage.label, path.display()),
            Err(e) => warn!("Failed to publish stage '{}' output: {}", stage.label, e),
        }
    }
}

/// Merges a stage's static input with the forwarded upstream payload
fn compose_input(
    stage: &PipelineStage,
    static_input: Option<JsonValue>,
    forwarded: Option<JsonValue>,
) -> Option<JsonValue> {
    let forwarded = forwarded.map(|payload| match &stage.forward_as {
        Some(key) => {
            let mut wrapped = serde_json::Map::new();
            wrapped.insert(key.clone(), payload);
            JsonValue::Object(wrapped)
        }
        None => payload,
    });

    match (static_input, forwarded) {
        (None, None) => None,
        (Some(input), None) => Some(input),
        (None, Some(forwarded)) => Some(forwarded),
        (Some(JsonValue::Object(mut base)), Some(JsonValue::Object(extra))) => {
            base.extend(extra);
            Some(JsonValue::Object(base))
        }
        (Some(_), Some(forwarded)) => {
            debug!(
                "Stage '{}' has non-object input, forwarding upstream payload only",
                stage.label
            );
            Some(forwarded)
        }
    }
}

/// Moves a run to its next state
fn advance(run_id: &str, from: RunState, to: RunState) -> RunState {
    if to.is_terminal() {
        debug!("Run {}: {} -> {} (final)", run_id, from, to);
    } else {
        debug!("Run {}: {} -> {}", run_id, from, to);
    }
    to
}

fn exit_message(worker: &str, result: &ExecutionResult) -> String {
    let detail = result
        .stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| format!(": {}", line.trim()))
        .unwrap_or_default();
    format!("{} exited with code {}{}", worker, result.exit_code, detail)
}
