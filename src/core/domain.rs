use std::time::Duration;

use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    pub id: Uuid,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub code: String,
}

impl ExecutionRequest {
    /// Builds a request from the raw `code` field of an inbound call.
    ///
    /// The stored code is trimmed; blank submissions are rejected here so
    /// nothing downstream ever sees them.
    pub fn from_code(code: Option<String>) -> Result<Self, ClientInputError> {
        let code = code.ok_or(ClientInputError::MissingCode)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(ClientInputError::EmptyCode);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            received_at: chrono::Utc::now(),
            code: code.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientInputError {
    #[error("code is required")]
    MissingCode,
    #[error("code must not be empty")]
    EmptyCode,
    #[error("disallowed operation: {pattern}")]
    Disallowed { pattern: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub allowed: bool,
    pub violated_pattern: Option<&'static str>,
}

impl ValidationVerdict {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            violated_pattern: None,
        }
    }

    pub fn rejected(pattern: &'static str) -> Self {
        Self {
            allowed: false,
            violated_pattern: Some(pattern),
        }
    }
}

/// Fixed for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub time: Duration,
    pub output_chars: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionOutcome {
    Completed {
        stdout: String,
        stderr: String,
        return_code: Option<i32>,
        elapsed: Duration,
    },
    TimedOut {
        elapsed: Duration,
    },
    Failed {
        reason: String,
    },
}

impl ExecutionOutcome {
    pub fn failed(reason: &str) -> Self {
        ExecutionOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_secs: f64,
    pub return_code: Option<i32>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_code_rejected() {
        assert_eq!(
            ExecutionRequest::from_code(None).unwrap_err(),
            ClientInputError::MissingCode
        );
    }

    #[test]
    fn test_blank_code_rejected() {
        for code in ["", "   ", "\n\t  \n"] {
            assert_eq!(
                ExecutionRequest::from_code(Some(code.to_string())).unwrap_err(),
                ClientInputError::EmptyCode
            );
        }
    }

    #[test]
    fn test_code_is_trimmed() {
        let request = ExecutionRequest::from_code(Some("  print('hi')\n\n".to_string())).unwrap();
        assert_eq!(request.code, "print('hi')");
    }

    #[test]
    fn test_requests_get_distinct_ids() {
        let a = ExecutionRequest::from_code(Some("print(1)".to_string())).unwrap();
        let b = ExecutionRequest::from_code(Some("print(1)".to_string())).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ClientInputError::Disallowed {
                pattern: "import os"
            }
            .to_string(),
            "disallowed operation: import os"
        );
        assert_eq!(ClientInputError::EmptyCode.to_string(), "code must not be empty");
    }
}
