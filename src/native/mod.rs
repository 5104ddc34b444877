/// Native module contains implementations of core traits
/// that run the interpreter as a plain child process,
/// isolated with process groups, subreaping and rlimits set through syscalls.
pub mod artifact;
pub mod executor;
pub mod process;
pub mod reaper;
