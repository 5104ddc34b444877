use crate::{
    core::domain::ExecutionResult,
    http::models::{ErrorResponse, ExecuteResponse},
};

impl From<ExecutionResult> for ExecuteResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            success: result.success,
            stdout: result.stdout,
            stderr: result.stderr,
            execution_time: result.execution_time_secs,
            return_code: result.return_code,
            error: result.error,
        }
    }
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
