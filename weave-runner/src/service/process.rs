//! Process runner
//!
//! Launches worker processes asynchronously:
//! - Bounds the number of simultaneously running processes with a semaphore
//! - Runs the build step of compiled workers before the run step
//! - Races process exit against the invocation deadline and cancellation
//! - Kills the whole process group on timeout or cancellation
//!
//! Worker-side failures are reported in the `ExecutionResult`; only
//! launch problems, build failures, timeouts and cancellation are errors.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use std::process::ExitStatus;
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weave_core::domain::execution::ExecutionResult;

use crate::command::InvocationSpec;
use crate::context::{OrchestratorContext, ProcessTracker};
use crate::error::{Error, Result};

/// Service trait for executing worker invocations
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Executes an invocation to completion
    ///
    /// # Arguments
    /// * `spec` - The invocation; consumed, which releases its input file
    /// * `cancel` - Cancelling it kills the running process
    async fn run(&self, spec: InvocationSpec, cancel: CancellationToken) -> Result<ExecutionResult>;
}

/// Removes a build artifact however the invocation ends
struct ArtifactCleanup(PathBuf);

impl Drop for ArtifactCleanup {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove {}: {}", self.0.display(), e);
            }
        }
    }
}

/// Captured output of one finished process
struct RawOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Tokio-based implementation of ProcessRunner
pub struct TokioProcessRunner {
    semaphore: Arc<Semaphore>,
    tracker: Arc<ProcessTracker>,
    max_concurrent: usize,
}

impl TokioProcessRunner {
    /// Creates a runner allowing at most `max_concurrent` live processes
    pub fn new(max_concurrent: usize, tracker: Arc<ProcessTracker>) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            tracker,
            max_concurrent,
        }
    }

    pub fn from_context(context: &OrchestratorContext) -> Self {
        Self::new(
            context.config.max_concurrent_processes,
            Arc::clone(&context.processes),
        )
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Spawns one command and waits for it under the deadline
    async fn execute(
        &self,
        spec: &InvocationSpec,
        program: &str,
        args: &[String],
        working_directory: &Path,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<RawOutput> {
        debug!("Launching {} {:?} in {}", program, args, working_directory.display());

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so the whole tree can be signalled at once
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| Error::LaunchFailed {
            program: program.to_string(),
            source: e,
        })?;

        let pid = child.id();
        let _guard = self.tracker.register(
            &spec.worker,
            &spec.script_path.to_string_lossy(),
            pid,
        );

        let stdout_task = child.stdout.take().map(|pipe| tokio::spawn(read_all(pipe)));
        let stderr_task = child.stderr.take().map(|pipe| tokio::spawn(read_all(pipe)));

        let outcome = tokio::select! {
            status = wait_exited(&mut child, pid) => Outcome::Exited(status),
            _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Exited(status) => {
                let status = status.map_err(|e| Error::io(working_directory, e))?;
                let stdout = join_output(stdout_task).await;
                let stderr = join_output(stderr_task).await;

                Ok(RawOutput {
                    exit_code: exit_code(status),
                    stdout,
                    stderr,
                })
            }
            Outcome::TimedOut => {
                warn!(
                    "{} exceeded its {:?} deadline, killing process group",
                    spec.worker, spec.timeout
                );
                terminate(&mut child, pid).await;
                abort_output(stdout_task, stderr_task);
                Err(Error::Timeout(spec.timeout))
            }
            Outcome::Cancelled => {
                info!("Cancelling {} ({})", spec.worker, program);
                terminate(&mut child, pid).await;
                abort_output(stdout_task, stderr_task);
                Err(Error::Cancelled)
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: InvocationSpec, cancel: CancellationToken) -> Result<ExecutionResult> {
        // Queue until a slot frees up
        let _permit = tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| Error::Cancelled)?
            }
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let started = Instant::now();
        let deadline = started + spec.timeout;

        let _artifact = spec.build.as_ref().map(|build| ArtifactCleanup(build.artifact.clone()));
        if let Some(build) = &spec.build {
            debug!("Building {} -> {}", spec.worker, build.artifact.display());
            let output = self
                .execute(
                    &spec,
                    &build.program,
                    &build.args,
                    &spec.working_directory,
                    deadline,
                    &cancel,
                )
                .await?;

            if output.exit_code != 0 {
                warn!("Build of {} failed", spec.script_path.display());
                return Err(Error::BuildFailed {
                    stderr: output.stderr,
                });
            }
        }

        let output = self
            .execute(
                &spec,
                &spec.program,
                &spec.args,
                &spec.working_directory,
                deadline,
                &cancel,
            )
            .await?;

        let elapsed = started.elapsed();
        let result = ExecutionResult::new(output.exit_code, output.stdout, output.stderr)
            .with_duration_ms(duration_ms(elapsed));

        info!(
            "Worker {} finished: exit_code={}, payload={}, {:?}",
            spec.worker,
            result.exit_code,
            result.parsed_payload.is_some(),
            elapsed
        );

        Ok(result)
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buffer).await {
        debug!("Output stream ended with error: {}", e);
    }
    buffer
}

async fn join_output(task: Option<tokio::task::JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(task) => task
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
            .unwrap_or_default(),
        None => String::new(),
    }
}

fn abort_output(
    stdout: Option<tokio::task::JoinHandle<Vec<u8>>>,
    stderr: Option<tokio::task::JoinHandle<Vec<u8>>>,
) {
    for task in [stdout, stderr].into_iter().flatten() {
        task.abort();
    }
}

/// Waits for the group leader to exit, then kills its leftover descendants
///
/// The leader is left unreaped while the group is signalled, so its pid
/// still names this group.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
async fn wait_exited(child: &mut Child, pid: Option<u32>) -> std::io::Result<ExitStatus> {
    if let Some(pid) = pid {
        tokio::task::spawn_blocking(move || wait_unreaped(pid))
            .await
            .map_err(std::io::Error::other)??;
        // Stray descendants would keep the pipes open
        kill_group(Some(pid));
    }
    child.wait().await
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn wait_unreaped(pid: u32) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::wait::{Id, WaitPidFlag, waitid};
    use nix::unistd::Pid;

    loop {
        match waitid(
            Id::Pid(Pid::from_raw(pid as i32)),
            WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT,
        ) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Waits for the child; without a non-reaping wait the group is left alone
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
async fn wait_exited(child: &mut Child, _pid: Option<u32>) -> std::io::Result<ExitStatus> {
    child.wait().await
}

/// Kills the process group and reaps the direct child
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(e) = child.start_kill() {
        debug!("start_kill: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap killed worker: {}", e);
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        // ESRCH just means the group is already gone
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            128 + status.signal().unwrap_or(0)
        }
        #[cfg(not(unix))]
        {
            -1
        }
    })
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
