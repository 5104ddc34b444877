use std::time::Duration;

use crate::{
    constants::TRUNCATION_MARKER,
    core::domain::{ExecutionOutcome, ExecutionResult},
};

pub fn format(outcome: ExecutionOutcome, output_chars: usize) -> ExecutionResult {
    match outcome {
        ExecutionOutcome::Completed {
            stdout,
            stderr,
            return_code,
            elapsed,
        } => ExecutionResult {
            success: true,
            stdout: truncate(stdout, output_chars),
            stderr: truncate(stderr, output_chars),
            execution_time_secs: round_millis(elapsed),
            return_code,
            error: None,
        },
        ExecutionOutcome::TimedOut { elapsed } => ExecutionResult {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            execution_time_secs: round_millis(elapsed),
            return_code: None,
            error: Some(format!(
                "execution exceeded time limit of {}s",
                elapsed.as_secs_f64()
            )),
        },
        ExecutionOutcome::Failed { reason } => ExecutionResult {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            execution_time_secs: 0.0,
            return_code: None,
            error: Some(reason),
        },
    }
}

/// Cuts `text` to `max_chars` characters and appends the truncation marker.
/// Text that already fits is returned untouched.
pub fn truncate(mut text: String, max_chars: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        text.truncate(cut);
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}
