use std::time::Duration;

use crate::core::domain::ExecutionOutcome;

/// Owns the whole lifecycle of one untrusted run: materialize the source,
/// spawn, bound the wait by `timeout`, collect output and clean up.
///
/// Implementations never return an error; every internal fault is reported
/// as [`ExecutionOutcome::Failed`].
#[mockall::automock]
#[async_trait::async_trait]
pub trait Executor: std::fmt::Debug + Send + Sync {
    async fn execute(&self, code: &str, timeout: Duration) -> ExecutionOutcome;
}
