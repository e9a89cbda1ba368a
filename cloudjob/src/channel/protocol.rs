//! Files exchanged with the driver script inside the per-job remote directory.

use crate::error::{Error, Result};
use crate::types::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PAYLOAD_FILE: &str = "payload.blob";
pub const DRIVER_FILE: &str = "run";
pub const RESULT_FILE: &str = "result.blob";
pub const ERROR_FILE: &str = "error.blob";
pub const STDOUT_FILE: &str = "stdout.log";
pub const STDERR_FILE: &str = "stderr.log";

pub fn remote_dir(remote_root: &str, job_id: JobId) -> String {
    format!("{}/cloudjob-{}", remote_root.trim_end_matches('/'), job_id)
}

pub fn remote_path(dir: &str, file: &str) -> String {
    format!("{}/{}", dir, file)
}

/// Single-quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// The driver's output is written to files in the job directory, not to the SSH channel.
pub fn run_command(dir: &str, interpreter: &str) -> String {
    format!(
        "cd {} && {} {} >{} 2>{}",
        shell_quote(dir),
        interpreter,
        DRIVER_FILE,
        STDOUT_FILE,
        STDERR_FILE
    )
}

/// Contents of `error.blob`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub message: String,
    #[serde(default)]
    pub traceback: Option<String>,
}

/// What the driver reported, read back from the two well-known files.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteOutcome {
    Success(Value),
    Failure(RemoteFailure),
}

impl RemoteOutcome {
    pub fn into_result(self) -> Result<Value> {
        match self {
            RemoteOutcome::Success(value) => Ok(value),
            RemoteOutcome::Failure(RemoteFailure { message, traceback }) => {
                Err(Error::RemoteExecution { message, traceback })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn paths_are_scoped_to_the_job() {
        let job_id = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        let dir = remote_dir("/tmp/", job_id);
        assert_eq!(dir, "/tmp/cloudjob-0f8fad5b-d9cb-469f-a165-70867728950e");
        assert_eq!(
            remote_path(&dir, RESULT_FILE),
            "/tmp/cloudjob-0f8fad5b-d9cb-469f-a165-70867728950e/result.blob"
        );
        assert_eq!(
            run_command(&dir, "python3"),
            "cd '/tmp/cloudjob-0f8fad5b-d9cb-469f-a165-70867728950e' && python3 run >stdout.log 2>stderr.log"
        );
    }

    #[test]
    fn awkward_remote_roots_stay_one_word() {
        let job_id = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        let dir = remote_dir("/mnt/scratch space", job_id);
        assert_eq!(
            run_command(&dir, "python3"),
            "cd '/mnt/scratch space/cloudjob-0f8fad5b-d9cb-469f-a165-70867728950e' && python3 run >stdout.log 2>stderr.log"
        );
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME; rm -rf /"), "'$HOME; rm -rf /'");
    }

    #[test]
    fn failure_without_traceback_decodes() {
        let failure: RemoteFailure = serde_json::from_str(r#"{"message": "boom"}"#).unwrap();
        assert_eq!(failure.traceback, None);
        match RemoteOutcome::Failure(failure).into_result() {
            Err(Error::RemoteExecution { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
