mod actor;
mod messages;

use self::{
    actor::JobCoordinator,
    messages::CoordinatorMessage::{
        self, Cancel, ClaimCleanup, Complete, Fail, GetJob, GetStatus, ListJobs, RecordInstance,
        RecordSshConfig, Submit, Transition,
    },
};
use crate::channel::RemoteExecutionChannel;
use crate::config::JobConfig;
use crate::error::{Error, Result};
use crate::events::JobStatus;
use crate::gateway::{ProviderGateway, SshConnectionConfig};
use crate::payload::Payload;
use crate::providers::ProviderCatalog;
use crate::registry::{JobRecord, TransitionError};
use crate::types::{InstanceId, JobId};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time;

/// Send a request to the coordinator and wait for its reply. `None` once the coordinator is gone.
async fn request<T>(
    sender: &mpsc::Sender<CoordinatorMessage>,
    build: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMessage,
) -> Option<T> {
    let (tx, rx) = oneshot::channel();
    sender.send(build(tx)).await.ok()?;
    rx.await.ok()
}

/// A `JobOrchestrator` which runs submitted payloads on freshly provisioned instances.
///
/// This struct is actually an actor handle, the real bookkeeping is done in the coordinator actor
/// spawned by `JobOrchestrator::spawn`, and each job runs in its own task.
/// The handle can be cloned freely in a multi-thread async context without any `Arc<Mutex>`.
#[derive(Clone)]
pub struct JobOrchestratorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    catalog: Arc<ProviderCatalog>,
}

impl JobOrchestratorHandle {
    /// Spawn a new orchestrator.
    ///
    /// `message_capacity` bounds the coordinator's inbox. This limits the build-up of inbound messages.
    pub fn spawn(
        catalog: ProviderCatalog,
        channel: RemoteExecutionChannel,
        message_capacity: usize,
    ) -> Self {
        Self::start(catalog, channel, message_capacity, None)
    }

    /// Like [`spawn`](Self::spawn), but at most `max_active_jobs` jobs hold an instance at once.
    /// The others stay `Pending` until a running job finishes.
    pub fn spawn_limited(
        catalog: ProviderCatalog,
        channel: RemoteExecutionChannel,
        message_capacity: usize,
        max_active_jobs: usize,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(max_active_jobs));
        Self::start(catalog, channel, message_capacity, Some(slots))
    }

    fn start(
        catalog: ProviderCatalog,
        channel: RemoteExecutionChannel,
        message_capacity: usize,
        slots: Option<Arc<Semaphore>>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(message_capacity);
        JobCoordinator::spawn(receiver, channel, slots);
        Self {
            sender,
            catalog: Arc::new(catalog),
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.catalog.provider_names()
    }

    /// Submit a job and return its id without waiting for any of its stages.
    ///
    /// Fails up front if the provider is unknown or rejects its credentials.
    pub async fn submit(
        &self,
        payload: Payload,
        config: JobConfig,
        provider_name: &str,
    ) -> Result<JobId> {
        let provider = self.catalog.resolve(provider_name).await?;
        let gateway = ProviderGateway::new(provider, config.key_file());
        let coordinator = self.sender.clone();
        request(&self.sender, |response| Submit {
            provider_name: provider_name.to_string(),
            gateway,
            payload,
            config,
            coordinator,
            response,
        })
        .await
        .ok_or(Error::CoordinatorExited)
    }

    /// Current stage of a job, `None` if the id is unknown.
    pub async fn get_status(&self, job_id: JobId) -> Option<JobStatus> {
        request(&self.sender, |response| GetStatus { job_id, response })
            .await
            .flatten()
    }

    /// Snapshot of a job's record, `None` if the id is unknown.
    pub async fn job(&self, job_id: JobId) -> Option<JobRecord> {
        self.fetch(job_id).await.ok().flatten()
    }

    /// Snapshot of every job ever submitted, oldest first.
    pub async fn jobs(&self) -> Vec<JobRecord> {
        request(&self.sender, |response| ListJobs { response })
            .await
            .unwrap_or_default()
    }

    /// Wait until the job finishes and return the value its payload produced.
    pub async fn wait_for_result(&self, job_id: JobId) -> Result<Value> {
        loop {
            let record = self.fetch(job_id).await?.ok_or(Error::UnknownJob(job_id))?;
            match record.status {
                JobStatus::Completed => return Ok(record.result.unwrap_or(Value::Null)),
                JobStatus::Failed => return Err(Error::JobFailed(record.error.unwrap_or_default())),
                JobStatus::Cancelled => return Err(Error::Cancelled),
                _ => time::sleep(record.config.job_poll_interval).await,
            }
        }
    }

    /// Cancel a job that has not finished yet and delete its instance if it has one.
    ///
    /// Cancelling a finished job does nothing. A remote execution already in flight keeps running
    /// until it returns; its outcome is then discarded.
    pub async fn cancel(&self, job_id: JobId) -> Result<()> {
        let teardown = request(&self.sender, |response| Cancel { job_id, response })
            .await
            .ok_or(Error::CoordinatorExited)??;
        tracing::info!(job_id = %job_id, "job cancel requested");
        if let Some(teardown) = teardown {
            match teardown.gateway.delete_instance(&teardown.instance_id).await {
                Ok(deleted) => {
                    tracing::info!(job_id = %job_id, instance_id = %teardown.instance_id, deleted, "instance torn down")
                }
                Err(err) => {
                    tracing::warn!(job_id = %job_id, instance_id = %teardown.instance_id, error = %err, "instance teardown failed")
                }
            }
        }
        Ok(())
    }

    async fn fetch(&self, job_id: JobId) -> Result<Option<JobRecord>> {
        request(&self.sender, |response| GetJob { job_id, response })
            .await
            .ok_or(Error::CoordinatorExited)
    }
}

/// The one capability allowed to change a job's record, held by that job's workflow.
///
/// If the coordinator has gone away every update is treated as rejected.
pub(crate) struct JobRecordWriter {
    job_id: JobId,
    sender: mpsc::Sender<CoordinatorMessage>,
}

impl JobRecordWriter {
    fn new(job_id: JobId, sender: mpsc::Sender<CoordinatorMessage>) -> Self {
        Self { job_id, sender }
    }

    pub async fn transition(&self, to: JobStatus) -> std::result::Result<JobStatus, TransitionError> {
        let job_id = self.job_id;
        request(&self.sender, |response| Transition {
            job_id,
            to,
            response,
        })
        .await
        .unwrap_or(Err(TransitionError::UnknownJob))
    }

    pub async fn record_instance(&self, instance_id: InstanceId) -> Option<JobStatus> {
        let job_id = self.job_id;
        request(&self.sender, |response| RecordInstance {
            job_id,
            instance_id,
            response,
        })
        .await
        .and_then(|outcome| outcome.ok())
    }

    pub async fn record_ssh_config(&self, ssh_config: SshConnectionConfig) -> Option<JobStatus> {
        let job_id = self.job_id;
        request(&self.sender, |response| RecordSshConfig {
            job_id,
            ssh_config,
            response,
        })
        .await
        .and_then(|outcome| outcome.ok())
    }

    /// Returns false if the job was cancelled first.
    pub async fn complete(&self, result: Value) -> bool {
        let job_id = self.job_id;
        matches!(
            request(&self.sender, |response| Complete {
                job_id,
                result,
                response,
            })
            .await,
            Some(Ok(()))
        )
    }

    /// Returns false if the job was cancelled first.
    pub async fn fail(&self, error: String) -> bool {
        let job_id = self.job_id;
        matches!(
            request(&self.sender, |response| Fail {
                job_id,
                error,
                response,
            })
            .await,
            Some(Ok(()))
        )
    }

    pub async fn claim_cleanup(&self) -> Option<InstanceId> {
        let job_id = self.job_id;
        request(&self.sender, |response| ClaimCleanup { job_id, response })
            .await
            .flatten()
    }
}
