use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::core::{domain::ExecutionOutcome, traits::executor::Executor};

/// Returns a fixed outcome after a fixed delay and records how many
/// executions overlapped.
#[derive(Debug, Clone)]
pub struct ExecutorStub {
    outcome: ExecutionOutcome,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ExecutorStub {
    pub fn new(outcome: ExecutionOutcome, delay: Duration) -> Self {
        Self {
            outcome,
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Executor for ExecutorStub {
    #[tracing::instrument(skip(self))]
    async fn execute(&self, code: &str, timeout: Duration) -> ExecutionOutcome {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        tracing::debug!("Execution outcome: {:?}", self.outcome);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
