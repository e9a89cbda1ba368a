use crate::types::{InstanceId, JobId};
use std::{io, result, time::Duration};
use thiserror;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("authentication with provider `{provider}` failed: {reason}")]
    Authentication { provider: String, reason: String },
    #[error("unsupported provider `{0}`")]
    UnsupportedProvider(String),
    #[error("provider `{provider}` does not support {operation}")]
    NotSupported {
        provider: String,
        operation: &'static str,
    },
    #[error("failed to provision instance: {0}")]
    Provisioning(String),
    #[error("provider request failed: {0}")]
    Provider(String),
    #[error("instance {instance_id} entered state `{state}`")]
    InstanceFailed {
        instance_id: InstanceId,
        state: String,
    },
    #[error("instance {instance_id} not ready after {timeout:?} (last observed: {last_observed})")]
    ReadinessTimeout {
        instance_id: InstanceId,
        timeout: Duration,
        last_observed: String,
    },
    #[error("ssh connection failed: {0}")]
    Connectivity(String),
    #[error("remote execution failed: {message}")]
    RemoteExecution {
        message: String,
        traceback: Option<String>,
    },
    #[error("no such job {0}")]
    UnknownJob(JobId),
    #[error("job failed: {0}")]
    JobFailed(String),
    #[error("job was cancelled")]
    Cancelled,
    #[error("job coordinator exited")]
    CoordinatorExited,
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Text stored on a failed job record. Remote tracebacks are kept verbatim after the message.
    pub fn to_record_message(&self) -> String {
        match self {
            Error::RemoteExecution {
                traceback: Some(traceback),
                ..
            } => format!("{}\n{}", self, traceback),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
