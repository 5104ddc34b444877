use std::{
    io,
    process::ExitStatus,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    task::JoinHandle,
    time::Instant,
};

use crate::native::reaper;

const READ_CHUNK_SIZE: usize = 8 * 1024;
// How long the output readers may lag behind the exit of the process tree
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed to wait for process: {0}")]
    Wait(#[source] io::Error),
    #[error("failed to collect process output: {msg}")]
    Collect { msg: String },
}

#[derive(Debug)]
pub enum ProcessExit {
    Exited {
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        elapsed: Duration,
    },
    DeadlineExceeded {
        elapsed: Duration,
    },
}

/// One spawned child and everything needed to bound, observe and reap it.
///
/// The child is expected to lead its own process group. Once it is gone the
/// group is killed and descendants that left the group are swept. Dropping
/// a handle before that happens does the same in the background.
#[derive(Debug)]
pub struct ProcessHandle {
    // None once reaped
    child: Option<Child>,
    pid: Option<u32>,
    started_at: Instant,
    deadline: Instant,
    stdout: Capture,
    stderr: Capture,
    released: bool,
}

impl ProcessHandle {
    /// Spawns `command`, which must pipe stdout and stderr. Each stream keeps
    /// at most `capture_limit` bytes but is drained to the end.
    pub fn spawn(
        command: &mut Command,
        timeout: Duration,
        capture_limit: usize,
    ) -> Result<Self, ProcessError> {
        let started_at = Instant::now();
        let mut child = reaper::spawn_leader(command).map_err(ProcessError::Spawn)?;
        let pid = child.id();

        let stdout = Capture::spawn(child.stdout.take(), capture_limit);
        let stderr = Capture::spawn(child.stderr.take(), capture_limit);

        Ok(Self {
            child: Some(child),
            pid,
            started_at,
            deadline: started_at + timeout,
            stdout,
            stderr,
            released: false,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub async fn wait(mut self) -> Result<ProcessExit, ProcessError> {
        let Some(child) = self.child.as_mut() else {
            return Err(ProcessError::Wait(io::Error::other("process already reaped")));
        };

        let waited = tokio::time::timeout_at(self.deadline, child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                let elapsed = self.started_at.elapsed();
                self.child = None;
                // Leftover descendants would keep the pipes open
                self.release_tree().await;

                let stdout = self.stdout.join().await?;
                let stderr = self.stderr.join().await?;

                Ok(ProcessExit::Exited {
                    status,
                    stdout,
                    stderr,
                    elapsed,
                })
            }
            Ok(Err(e)) => Err(ProcessError::Wait(e)),
            Err(_) => {
                self.terminate().await;
                Ok(ProcessExit::DeadlineExceeded {
                    elapsed: self.started_at.elapsed(),
                })
            }
        }
    }

    async fn terminate(&mut self) {
        self.kill_group();
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill process {:?}: {}", self.pid, e);
            }
        }
        self.child = None;
        self.release_tree().await;
        self.stdout.abort();
        self.stderr.abort();
    }

    /// Kills what is left of the tree of a reaped leader.
    async fn release_tree(&mut self) {
        self.kill_group();
        if let Some(pid) = self.pid {
            reaper::release_leader(pid);
        }
        reaper::sweep().await;
        self.released = true;
    }

    fn kill_group(&self) {
        let Some(pid) = self.pid else {
            return;
        };

        match signal::killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!("Failed to kill process group {}: {}", pid, e),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stdout.abort();
        self.stderr.abort();
        if self.released {
            return;
        }

        self.kill_group();
        let child = self.child.take();
        let pid = self.pid;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Some(mut child) = child {
                        if let Err(e) = child.kill().await {
                            tracing::warn!("Failed to kill process {:?}: {}", pid, e);
                        }
                    }
                    if let Some(pid) = pid {
                        reaper::release_leader(pid);
                    }
                    reaper::sweep().await;
                });
            }
            // The leader itself goes down through kill_on_drop
            Err(_) => {
                if let Some(pid) = pid {
                    reaper::release_leader(pid);
                }
            }
        }
    }
}

/// Output of one stream, kept in a buffer shared with its reader task so a
/// stream that never closes still yields what was read.
#[derive(Debug)]
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<io::Result<()>>,
}

impl Capture {
    fn spawn<R>(stream: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&buffer);

        let reader = tokio::spawn(async move {
            let Some(mut stream) = stream else {
                return Ok(());
            };

            let mut chunk = vec![0u8; READ_CHUNK_SIZE];
            loop {
                let read = stream.read(&mut chunk).await?;
                if read == 0 {
                    break;
                }
                let mut captured = captured.lock().unwrap_or_else(PoisonError::into_inner);
                let room = limit.saturating_sub(captured.len());
                captured.extend_from_slice(&chunk[..read.min(room)]);
            }

            Ok(())
        });

        Self { buffer, reader }
    }

    async fn join(&mut self) -> Result<Vec<u8>, ProcessError> {
        match tokio::time::timeout(DRAIN_GRACE, &mut self.reader).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => return Err(ProcessError::Collect { msg: e.to_string() }),
            Ok(Err(e)) => return Err(ProcessError::Collect { msg: e.to_string() }),
            Err(_) => {
                self.reader.abort();
                tracing::warn!("Output stream still open after process exit, keeping what was read");
            }
        }

        Ok(self.take())
    }

    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn abort(&self) {
        self.reader.abort();
    }
}
