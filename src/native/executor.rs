use std::{
    os::unix::process::{CommandExt, ExitStatusExt},
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use nix::sys::{
    prctl,
    resource::{Resource, setrlimit},
};
use tokio::process::Command;

use crate::{
    constants::{COLLECT_FAILED_MSG, PREPARE_FAILED_MSG, SPAWN_FAILED_MSG},
    core::{domain::ExecutionOutcome, traits::executor::Executor},
    native::{
        artifact::SourceArtifact,
        process::{ProcessError, ProcessExit, ProcessHandle},
    },
};

const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Runs submissions with a local interpreter.
///
/// The child gets a cleared environment, no stdin, its own process group and
/// rlimits on CPU time, core dumps and (optionally) address space. It is a
/// child subreaper, so descendants that leave its group are still swept.
#[derive(Clone, Debug)]
pub struct NativeExecutor {
    dir: PathBuf,
    interpreter: PathBuf,
    memory_limit_bytes: Option<u64>,
    capture_limit_bytes: usize,
}

impl NativeExecutor {
    pub fn new<T, U>(dir: T, interpreter: U) -> Self
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        NativeExecutor {
            dir: dir.as_ref().into(),
            interpreter: interpreter.as_ref().into(),
            memory_limit_bytes: None,
            capture_limit_bytes: 64 * 1024,
        }
    }

    pub fn with_memory_limit(mut self, bytes: Option<u64>) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit_bytes = bytes;
        self
    }

    fn command(&self, source: &Path, timeout: Duration) -> Command {
        let path_env = std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string());

        let mut cmd = std::process::Command::new(&self.interpreter);
        cmd.arg(source)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .env("PATH", path_env)
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .process_group(0);

        // CPU time is a backstop behind the wall clock deadline
        let cpu_secs = timeout.as_secs() + 1;
        let memory_limit = self.memory_limit_bytes;
        // SAFETY: the hook only issues prctl and setrlimit syscalls, which are
        // async-signal-safe and touch no memory shared with the parent.
        unsafe {
            cmd.pre_exec(move || {
                // Orphans of the interpreter stay in its tree while it runs
                prctl::set_child_subreaper(true)?;
                setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
                setrlimit(Resource::RLIMIT_CPU, cpu_secs, cpu_secs)?;
                if let Some(bytes) = memory_limit {
                    setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
                }
                Ok(())
            });
        }

        let mut cmd = Command::from(cmd);
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, artifact: &SourceArtifact, timeout: Duration) -> ExecutionOutcome {
        let handle = match ProcessHandle::spawn(
            &mut self.command(artifact.path(), timeout),
            timeout,
            self.capture_limit_bytes,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Failed to start {}: {}", self.interpreter.display(), e);
                return ExecutionOutcome::failed(SPAWN_FAILED_MSG);
            }
        };
        tracing::debug!("Spawned process {:?}", handle.pid());

        match handle.wait().await {
            Ok(ProcessExit::Exited {
                status,
                stdout,
                stderr,
                elapsed,
            }) => ExecutionOutcome::Completed {
                stdout: String::from_utf8_lossy(&stdout).to_string(),
                stderr: String::from_utf8_lossy(&stderr).to_string(),
                // Death by signal N is reported as -N
                return_code: status.code().or_else(|| status.signal().map(|sig| -sig)),
                elapsed,
            },
            Ok(ProcessExit::DeadlineExceeded { elapsed }) => {
                tracing::info!("Process killed after {:?} (limit {:?})", elapsed, timeout);
                ExecutionOutcome::TimedOut { elapsed: timeout }
            }
            Err(e @ (ProcessError::Wait(_) | ProcessError::Collect { .. })) => {
                tracing::error!("Execution failed: {}", e);
                ExecutionOutcome::failed(COLLECT_FAILED_MSG)
            }
            Err(e @ ProcessError::Spawn(_)) => {
                tracing::error!("Execution failed: {}", e);
                ExecutionOutcome::failed(SPAWN_FAILED_MSG)
            }
        }
    }
}

#[async_trait::async_trait]
impl Executor for NativeExecutor {
    #[tracing::instrument(skip(self, code))]
    async fn execute(&self, code: &str, timeout: Duration) -> ExecutionOutcome {
        let artifact = match SourceArtifact::create(&self.dir, code).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!("Failed to write source to {}: {}", self.dir.display(), e);
                return ExecutionOutcome::failed(PREPARE_FAILED_MSG);
            }
        };

        // The artifact is dropped, and so removed, on every path out of here
        self.run(&artifact, timeout).await
    }
}
