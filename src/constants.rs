pub const SERVICE_NAME: &str = "pyrunner";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 5000;

pub const TRUNCATION_MARKER: &str = "\n[output truncated...]";

pub const SOURCE_FILE_EXTENSION: &str = "py";

pub const PREPARE_FAILED_MSG: &str = "could not prepare execution environment";
pub const SPAWN_FAILED_MSG: &str = "could not start interpreter";
pub const COLLECT_FAILED_MSG: &str = "could not collect process output";
pub const ADMISSION_CLOSED_MSG: &str = "execution service is shutting down";
