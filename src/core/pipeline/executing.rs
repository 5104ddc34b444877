use std::{num::NonZeroUsize, sync::Arc};

use tokio::sync::Semaphore;

use crate::{
    constants::ADMISSION_CLOSED_MSG,
    core::{
        domain::{
            ClientInputError, ExecutionLimits, ExecutionOutcome, ExecutionRequest,
            ExecutionResult,
        },
        formatter,
        traits::executor::Executor,
        validator,
    },
};

/// Validator, executor and formatter composed for one request at a time.
///
/// The only state shared between requests is the optional admission
/// semaphore; without it any number of executions may run at once.
#[derive(Debug, Clone)]
pub struct Pipeline {
    executor: Arc<dyn Executor>,
    limits: ExecutionLimits,
    admission: Option<Arc<Semaphore>>,
}

impl Pipeline {
    pub fn new(executor: Arc<dyn Executor>, limits: ExecutionLimits) -> Self {
        Self {
            executor,
            limits,
            admission: None,
        }
    }

    pub fn with_admission_limit(mut self, max_concurrent: Option<NonZeroUsize>) -> Self {
        self.admission = max_concurrent.map(|permits| {
            Arc::new(Semaphore::new(permits.get().min(Semaphore::MAX_PERMITS)))
        });
        self
    }

    #[tracing::instrument(skip_all, fields(request_id = %request.id))]
    pub async fn run(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult, ClientInputError> {
        let verdict = validator::validate(&request.code);
        if !verdict.allowed {
            let pattern = verdict.violated_pattern.unwrap_or_default();
            tracing::info!(pattern, "Submission rejected by denylist");
            return Err(ClientInputError::Disallowed { pattern });
        }

        let _permit = match &self.admission {
            Some(admission) => match admission.acquire().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::error!("Admission semaphore closed");
                    let outcome = ExecutionOutcome::failed(ADMISSION_CLOSED_MSG);
                    return Ok(formatter::format(outcome, self.limits.output_chars));
                }
            },
            None => None,
        };

        tracing::debug!(received_at = %request.received_at, "Start execution");
        let outcome = self.executor.execute(&request.code, self.limits.time).await;
        tracing::debug!("Execution outcome: {:?}", outcome);

        Ok(formatter::format(outcome, self.limits.output_chars))
    }
}
