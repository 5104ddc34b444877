use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf, time::Duration};

use clap::Parser;
use tokio::sync::Semaphore;

use crate::{
    constants::{DEFAULT_MAX_OUTPUT_CHARS, DEFAULT_TIMEOUT_SECS, SERVICE_NAME},
    core::domain::ExecutionLimits,
};

const BYTES_PER_MB: u64 = 1024 * 1024;
const MAX_MEMORY_LIMIT_MB: u64 = u64::MAX / BYTES_PER_MB;

fn parse_admission_limit(value: &str) -> Result<NonZeroUsize, String> {
    let limit: NonZeroUsize = value
        .parse()
        .map_err(|e| format!("expected a positive integer: {}", e))?;
    if limit.get() > Semaphore::MAX_PERMITS {
        return Err(format!("must not exceed {}", Semaphore::MAX_PERMITS));
    }
    Ok(limit)
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = "HTTP service that runs untrusted Python snippets")]
pub struct Config {
    #[arg(long, env = "PYRUNNER_BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind_addr: SocketAddr,

    /// Interpreter invoked with the submitted source file as its only argument
    #[arg(long, env = "PYRUNNER_INTERPRETER", default_value = "python3")]
    pub interpreter: PathBuf,

    #[arg(long, env = "PYRUNNER_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    #[arg(long, env = "PYRUNNER_MAX_OUTPUT_CHARS", default_value_t = DEFAULT_MAX_OUTPUT_CHARS)]
    pub max_output_chars: usize,

    /// Where source files are materialized; defaults to a directory under the system temp dir
    #[arg(long, env = "PYRUNNER_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Cap on simultaneous executions; unlimited when unset
    #[arg(
        long,
        env = "PYRUNNER_MAX_CONCURRENT_EXECUTIONS",
        value_parser = parse_admission_limit
    )]
    pub max_concurrent_executions: Option<NonZeroUsize>,

    /// Address space limit for each child process
    #[arg(
        long,
        env = "PYRUNNER_MEMORY_LIMIT_MB",
        value_parser = clap::value_parser!(u64).range(1..=MAX_MEMORY_LIMIT_MB)
    )]
    pub memory_limit_mb: Option<u64>,

    /// Directory served for paths outside of /api
    #[arg(long, env = "PYRUNNER_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time: Duration::from_secs(self.timeout_secs),
            output_chars: self.max_output_chars,
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(SERVICE_NAME))
    }

    pub fn memory_limit_bytes(&self) -> Option<u64> {
        self.memory_limit_mb
            .and_then(|mb| mb.checked_mul(BYTES_PER_MB))
    }

    /// Bytes kept per stream while reading child output. A char is at most
    /// four bytes, so this never cuts below the character limit.
    pub fn capture_limit_bytes(&self) -> usize {
        self.max_output_chars.saturating_mul(4).saturating_add(4)
    }
}
