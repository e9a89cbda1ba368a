use super::messages::{CoordinatorMessage, Teardown};
use super::JobRecordWriter;
use crate::actors::workflow::WorkflowHandle;
use crate::channel::RemoteExecutionChannel;
use crate::config::JobConfig;
use crate::error::{self, Error};
use crate::events::JobStatus;
use crate::gateway::ProviderGateway;
use crate::payload::Payload;
use crate::registry::{CancelOutcome, JobRecord, JobRegistry, TransitionError};
use crate::types::{JobId, ProviderName};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// Sole owner of the job registry. Every read and write of a job record goes through this actor.
pub struct JobCoordinator {
    inbox: mpsc::Receiver<CoordinatorMessage>,
    registry: JobRegistry,
    workflows: HashMap<JobId, WorkflowHandle>,
    channel: RemoteExecutionChannel,
    slots: Option<Arc<Semaphore>>,
}

impl JobCoordinator {
    pub fn spawn(
        inbox: mpsc::Receiver<CoordinatorMessage>,
        channel: RemoteExecutionChannel,
        slots: Option<Arc<Semaphore>>,
    ) {
        let actor = Self {
            inbox,
            registry: JobRegistry::new(),
            workflows: HashMap::new(),
            channel,
            slots,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use self::CoordinatorMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Submit {
                    provider_name,
                    gateway,
                    payload,
                    config,
                    coordinator,
                    response,
                } => {
                    let job_id = self.submit(provider_name, gateway, payload, config, coordinator);
                    let _ = response.send(job_id);
                }
                GetStatus { job_id, response } => {
                    let _ = response.send(self.registry.status(&job_id));
                }
                GetJob { job_id, response } => {
                    let _ = response.send(self.registry.get(&job_id).cloned());
                }
                ListJobs { response } => {
                    let mut jobs: Vec<JobRecord> = self.registry.records().cloned().collect();
                    jobs.sort_by_key(|record| record.created_at);
                    let _ = response.send(jobs);
                }
                Cancel { job_id, response } => {
                    let _ = response.send(self.cancel(job_id));
                }
                Transition {
                    job_id,
                    to,
                    response,
                } => {
                    let _ = response.send(self.registry.transition(&job_id, to));
                }
                RecordInstance {
                    job_id,
                    instance_id,
                    response,
                } => {
                    let _ = response.send(self.registry.record_instance(&job_id, instance_id));
                }
                RecordSshConfig {
                    job_id,
                    ssh_config,
                    response,
                } => {
                    let _ = response.send(self.registry.record_ssh_config(&job_id, ssh_config));
                }
                Complete {
                    job_id,
                    result,
                    response,
                } => {
                    let outcome = self.registry.complete(&job_id, result);
                    self.forget_finished(&job_id, &outcome);
                    let _ = response.send(outcome);
                }
                Fail {
                    job_id,
                    error,
                    response,
                } => {
                    let outcome = self.registry.fail(&job_id, error);
                    self.forget_finished(&job_id, &outcome);
                    let _ = response.send(outcome);
                }
                ClaimCleanup { job_id, response } => {
                    let _ = response.send(self.registry.claim_cleanup(&job_id));
                }
            }
        }
    }

    fn submit(
        &mut self,
        provider_name: ProviderName,
        gateway: ProviderGateway,
        payload: Payload,
        config: JobConfig,
        coordinator: mpsc::Sender<CoordinatorMessage>,
    ) -> JobId {
        // ids are never reused, even across a v4 collision
        let job_id = loop {
            let candidate = uuid::Uuid::new_v4();
            if !self.registry.contains(&candidate) {
                break candidate;
            }
        };
        self.registry.insert(JobRecord::new(
            job_id,
            provider_name.clone(),
            config.clone(),
        ));
        let writer = JobRecordWriter::new(job_id, coordinator);
        let workflow = WorkflowHandle::spawn(
            job_id,
            gateway,
            self.channel.clone(),
            payload,
            config,
            writer,
            self.slots.clone(),
        );
        self.workflows.insert(job_id, workflow);
        tracing::info!(job_id = %job_id, provider = %provider_name, "job submitted");
        job_id
    }

    fn cancel(&mut self, job_id: JobId) -> error::Result<Option<Teardown>> {
        match self.registry.cancel(&job_id) {
            Err(_) => Err(Error::UnknownJob(job_id)),
            Ok(CancelOutcome::AlreadyFinished(status)) => {
                tracing::debug!(job_id = %job_id, status = %status, "cancel ignored, job already finished");
                Ok(None)
            }
            Ok(CancelOutcome::Cancelled { teardown }) => {
                let workflow = self.workflows.remove(&job_id);
                if let Some(workflow) = &workflow {
                    workflow.cancel();
                }
                Ok(teardown.and_then(|instance_id| {
                    workflow.map(|workflow| Teardown {
                        gateway: workflow.gateway(),
                        instance_id,
                    })
                }))
            }
        }
    }

    /// Terminal jobs no longer need their workflow handle; the record itself stays.
    fn forget_finished(&mut self, job_id: &JobId, outcome: &Result<(), TransitionError>) {
        if outcome.is_ok() {
            self.workflows.remove(job_id);
        } else if self.registry.status(job_id) == Some(JobStatus::Cancelled) {
            tracing::debug!(job_id = %job_id, "late workflow outcome discarded for cancelled job");
        }
    }
}
