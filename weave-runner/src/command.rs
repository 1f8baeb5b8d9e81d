//! Command construction
//!
//! Turns a worker descriptor, a script and its arguments into an
//! `InvocationSpec` the process runner can execute. Build-then-run workers get
//! a separate build step whose artifact path is derived from the script name
//! and the run id, so concurrent runs of the same script never collide.

use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;
use weave_core::domain::worker::{ExecutionModel, WorkerDescriptor};

use crate::context::OrchestratorContext;
use crate::error::{Error, Result};
use crate::repository::ensure_dir;

/// Flag workers accept for the input payload file
pub const INPUT_FLAG: &str = "--input";

/// Compile step of a build-then-run worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub program: String,
    pub args: Vec<String>,
    /// Binary produced by the build and executed by the run step
    pub artifact: PathBuf,
}

impl BuildStep {
    pub fn command(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// A fully resolved worker invocation
///
/// Owns the temporary input file (if any); the file is removed when the
/// spec is dropped, whatever way the invocation ended.
#[derive(Debug)]
pub struct InvocationSpec {
    pub worker: String,
    pub script_path: PathBuf,
    /// Worker arguments, `--input <path>` included when a payload was given
    pub arguments: Vec<String>,
    pub input_payload: Option<JsonValue>,
    pub working_directory: PathBuf,
    pub timeout: Duration,

    /// Run step executable
    pub program: String,
    /// Run step arguments
    pub args: Vec<String>,
    pub build: Option<BuildStep>,

    input_artifact: Option<NamedTempFile>,
}

impl InvocationSpec {
    /// The first command that will be launched (the build step when present)
    pub fn command(&self) -> Vec<String> {
        match &self.build {
            Some(build) => build.command(),
            None => self.run_command(),
        }
    }

    pub fn run_command(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Path of the serialized input payload
    pub fn input_path(&self) -> Option<&Path> {
        self.input_artifact.as_ref().map(|f| f.path())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Builds invocations for registered workers
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    workers_dir: PathBuf,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl CommandBuilder {
    /// # Arguments
    /// * `workers_dir` - Base for relative script paths
    /// * `temp_dir` - Where input payloads and compiled binaries are written
    /// * `timeout` - Default deadline of each invocation
    pub fn new(workers_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workers_dir: workers_dir.into(),
            temp_dir: temp_dir.into(),
            timeout,
        }
    }

    pub fn from_context(context: &OrchestratorContext) -> Self {
        Self::new(
            context.workers_dir(),
            context.temp_dir(),
            context.config.communication_timeout,
        )
    }

    /// Builds an invocation
    ///
    /// # Arguments
    /// * `descriptor` - The worker to launch
    /// * `script_path` - Script or source file, relative to the workers directory
    /// * `arguments` - Worker arguments
    /// * `input_payload` - Value written to a temp file and passed as `--input`
    /// * `run_id` - Identifier of the owning run, used for build artifacts
    pub async fn build(
        &self,
        descriptor: &WorkerDescriptor,
        script_path: &str,
        mut arguments: Vec<String>,
        input_payload: Option<JsonValue>,
        run_id: &str,
    ) -> Result<InvocationSpec> {
        let (script, working_directory) = self.resolve_script(script_path);

        let input_artifact = match &input_payload {
            Some(payload) => {
                let artifact = self.write_input(&descriptor.name, payload).await?;
                arguments.push(INPUT_FLAG.to_string());
                arguments.push(artifact.path().to_string_lossy().to_string());
                Some(artifact)
            }
            None => None,
        };

        let script_arg = script.to_string_lossy().to_string();

        let (program, args, build) = match &descriptor.execution {
            ExecutionModel::Interpreted => {
                let args: Vec<String> = std::iter::once(script_arg)
                    .chain(arguments.iter().cloned())
                    .collect();
                (descriptor.launch_command.clone(), args, None)
            }
            ExecutionModel::CargoProject => {
                let manifest = working_directory.join("Cargo.toml");
                let args: Vec<String> = [
                    "run".to_string(),
                    "--quiet".to_string(),
                    "--manifest-path".to_string(),
                    manifest.to_string_lossy().to_string(),
                    "--".to_string(),
                ]
                .into_iter()
                .chain(arguments.iter().cloned())
                .collect();
                (descriptor.launch_command.clone(), args, None)
            }
            ExecutionModel::Compiled { flags } => {
                ensure_dir(&self.temp_dir).await?;
                let artifact = self.artifact_path(&script, run_id);
                let build_args: Vec<String> = flags
                    .iter()
                    .cloned()
                    .chain([
                        script_arg,
                        "-o".to_string(),
                        artifact.to_string_lossy().to_string(),
                    ])
                    .collect();
                let build = BuildStep {
                    program: descriptor.launch_command.clone(),
                    args: build_args,
                    artifact: artifact.clone(),
                };
                (
                    artifact.to_string_lossy().to_string(),
                    arguments.clone(),
                    Some(build),
                )
            }
        };

        let spec = InvocationSpec {
            worker: descriptor.name.clone(),
            script_path: script,
            arguments,
            input_payload,
            working_directory,
            timeout: self.timeout,
            program,
            args,
            build,
            input_artifact,
        };

        debug!("Built invocation for {}: {:?}", spec.worker, spec.command());
        Ok(spec)
    }

    /// Deterministic binary path for a compiled worker
    pub fn artifact_path(&self, script: &Path, run_id: &str) -> PathBuf {
        let stem = script
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "worker".to_string());
        self.temp_dir.join(format!("compiled_{}_{}", stem, run_id))
    }

    /// Resolves a script path and the directory the worker runs in
    ///
    /// Interpreter flags such as `-c` are passed through untouched.
    fn resolve_script(&self, script_path: &str) -> (PathBuf, PathBuf) {
        if script_path.starts_with('-') {
            return (PathBuf::from(script_path), self.workers_dir.clone());
        }

        let path = Path::new(script_path);
        let script = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workers_dir.join(path)
        };

        let working_directory = script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.workers_dir.clone());

        (script, working_directory)
    }

    async fn write_input(&self, worker: &str, payload: &JsonValue) -> Result<NamedTempFile> {
        ensure_dir(&self.temp_dir).await?;

        let artifact = tempfile::Builder::new()
            .prefix(&format!("input_{}_", worker))
            .suffix(".json")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| Error::io(&self.temp_dir, e))?;

        let body = serde_json::to_vec(payload)?;
        tokio::fs::write(artifact.path(), body)
            .await
            .map_err(|e| Error::io(artifact.path(), e))?;

        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WorkerRegistry;

    fn builder(dir: &Path) -> CommandBuilder {
        CommandBuilder::new(dir.join("workers"), dir.join("temp"), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_every_worker_starts_with_launch_command() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(dir.path());
        let registry = WorkerRegistry::builtin();

        for descriptor in registry.list() {
            let spec = builder
                .build(
                    descriptor,
                    "tools/job.src",
                    vec!["--fast".to_string(), "a b".to_string()],
                    None,
                    "run1",
                )
                .await
                .unwrap();

            assert_eq!(spec.command()[0], descriptor.launch_command, "{}", descriptor.name);
            assert_eq!(spec.timeout, Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn test_interpreted_command() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(dir.path());
        let ruby = WorkerDescriptor::new("ruby", "ruby");

        let spec = builder
            .build(&ruby, "color_engine.rb", vec!["--extract".to_string()], None, "r")
            .await
            .unwrap();

        let script = dir.path().join("workers/color_engine.rb");
        assert_eq!(
            spec.command(),
            vec![
                "ruby".to_string(),
                script.to_string_lossy().to_string(),
                "--extract".to_string()
            ]
        );
        assert_eq!(spec.working_directory, dir.path().join("workers"));
        assert!(spec.build.is_none());
        assert!(spec.input_path().is_none());
    }

    #[tokio::test]
    async fn test_compiled_command_has_build_step() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(dir.path());
        let registry = WorkerRegistry::builtin();
        let cpp = registry.resolve("cpp").unwrap();

        let spec = builder
            .build(cpp, "optimizer.cpp", vec!["--optimize".to_string()], None, "abc")
            .await
            .unwrap();

        let build = spec.build.as_ref().unwrap();
        let artifact = dir.path().join("temp/compiled_optimizer_abc");
        assert_eq!(build.program, "g++");
        assert_eq!(build.args[0], "-std=c++17");
        assert_eq!(build.args.last().unwrap(), &artifact.to_string_lossy().to_string());
        assert_eq!(
            spec.run_command(),
            vec![artifact.to_string_lossy().to_string(), "--optimize".to_string()]
        );
    }

    #[tokio::test]
    async fn test_artifact_path_is_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(dir.path());
        let script = Path::new("/src/optimizer.cpp");

        assert_eq!(
            builder.artifact_path(script, "run-a"),
            builder.artifact_path(script, "run-a")
        );
        assert_ne!(
            builder.artifact_path(script, "run-a"),
            builder.artifact_path(script, "run-b")
        );
    }

    #[tokio::test]
    async fn test_cargo_command() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(dir.path());
        let registry = WorkerRegistry::builtin();

        let spec = builder
            .build(
                registry.resolve("rust").unwrap(),
                "utils/src/main.rs",
                vec!["--optimize-colors".to_string()],
                None,
                "r",
            )
            .await
            .unwrap();

        let command = spec.command();
        assert_eq!(&command[..4], &["cargo", "run", "--quiet", "--manifest-path"]);
        assert!(command[4].ends_with("utils/src/Cargo.toml"));
        assert_eq!(&command[5..], &["--", "--optimize-colors"]);
    }

    #[tokio::test]
    async fn test_input_payload_is_scoped_to_spec() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(dir.path());
        let python = WorkerDescriptor::new("python", "python3");
        let payload = serde_json::json!({"pipeline_id": "p1", "mode": "analyze"});

        let spec = builder
            .build(&python, "analyze.py", vec![], Some(payload.clone()), "p1")
            .await
            .unwrap();

        let input = spec.input_path().unwrap().to_path_buf();
        let n = spec.arguments.len();
        assert_eq!(spec.arguments[n - 2], INPUT_FLAG);
        assert_eq!(spec.arguments[n - 1], input.to_string_lossy());
        assert_eq!(spec.args.last().unwrap(), &input.to_string_lossy().to_string());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&input).unwrap()).unwrap();
        assert_eq!(written, payload);

        drop(spec);
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn test_interpreter_flags_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let builder = builder(dir.path());
        let python = WorkerDescriptor::new("python", "python3");

        let spec = builder
            .build(&python, "-c", vec!["print(1)".to_string()], None, "t")
            .await
            .unwrap();

        assert_eq!(spec.command(), vec!["python3", "-c", "print(1)"]);
        assert_eq!(spec.working_directory, dir.path().join("workers"));
    }
}
