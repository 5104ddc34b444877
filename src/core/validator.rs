//! Static denylist check applied before anything is spawned.
//!
//! A substring match is trivially evaded (string concatenation, attribute
//! access, encodings), so this is only a fast-path rejection. Isolation of
//! the child process is the executor's job.

use crate::core::domain::ValidationVerdict;

/// Checked in this order; the first hit is reported.
pub const DENYLIST: &[&str] = &[
    "import os",
    "import sys",
    "import subprocess",
    "open(",
    "file(",
    "exec(",
    "eval(",
    "__import__",
    "globals(",
    "locals(",
    "input(",
    "raw_input(",
];

pub fn validate(code: &str) -> ValidationVerdict {
    let code = code.to_lowercase();

    match DENYLIST.iter().copied().find(|pattern| code.contains(pattern)) {
        Some(pattern) => ValidationVerdict::rejected(pattern),
        None => ValidationVerdict::allowed(),
    }
}
