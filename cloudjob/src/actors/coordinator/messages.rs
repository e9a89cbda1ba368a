use crate::config::JobConfig;
use crate::error;
use crate::events::JobStatus;
use crate::gateway::{ProviderGateway, SshConnectionConfig};
use crate::payload::Payload;
use crate::registry::{JobRecord, TransitionError};
use crate::types::{InstanceId, JobId, ProviderName};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Instance the canceller must delete, with the gateway to delete it through.
pub struct Teardown {
    pub gateway: ProviderGateway,
    pub instance_id: InstanceId,
}

pub enum CoordinatorMessage {
    Submit {
        provider_name: ProviderName,
        gateway: ProviderGateway,
        payload: Payload,
        config: JobConfig,
        /// handed to the workflow so it can report back
        coordinator: mpsc::Sender<CoordinatorMessage>,
        response: oneshot::Sender<JobId>,
    },
    GetStatus {
        job_id: JobId,
        response: oneshot::Sender<Option<JobStatus>>,
    },
    GetJob {
        job_id: JobId,
        response: oneshot::Sender<Option<JobRecord>>,
    },
    ListJobs {
        response: oneshot::Sender<Vec<JobRecord>>,
    },
    Cancel {
        job_id: JobId,
        response: oneshot::Sender<error::Result<Option<Teardown>>>,
    },
    Transition {
        job_id: JobId,
        to: JobStatus,
        response: oneshot::Sender<Result<JobStatus, TransitionError>>,
    },
    RecordInstance {
        job_id: JobId,
        instance_id: InstanceId,
        response: oneshot::Sender<Result<JobStatus, TransitionError>>,
    },
    RecordSshConfig {
        job_id: JobId,
        ssh_config: SshConnectionConfig,
        response: oneshot::Sender<Result<JobStatus, TransitionError>>,
    },
    Complete {
        job_id: JobId,
        result: Value,
        response: oneshot::Sender<Result<(), TransitionError>>,
    },
    Fail {
        job_id: JobId,
        error: String,
        response: oneshot::Sender<Result<(), TransitionError>>,
    },
    ClaimCleanup {
        job_id: JobId,
        response: oneshot::Sender<Option<InstanceId>>,
    },
}
