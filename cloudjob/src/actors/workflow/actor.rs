use crate::actors::coordinator::JobRecordWriter;
use crate::channel::RemoteExecutionChannel;
use crate::config::JobConfig;
use crate::error::{Error, Result};
use crate::events::JobStatus;
use crate::gateway::ProviderGateway;
use crate::payload::Payload;
use crate::poller::ReadinessPoller;
use crate::types::JobId;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Drives one job through provisioning, readiness, execution and cleanup.
pub struct Workflow {
    job_id: JobId,
    gateway: ProviderGateway,
    channel: RemoteExecutionChannel,
    payload: Payload,
    config: JobConfig,
    writer: JobRecordWriter,
    cancel: CancellationToken,
    slots: Option<Arc<Semaphore>>,
}

impl Workflow {
    pub fn spawn(
        job_id: JobId,
        gateway: ProviderGateway,
        channel: RemoteExecutionChannel,
        payload: Payload,
        config: JobConfig,
        writer: JobRecordWriter,
        cancel: CancellationToken,
        slots: Option<Arc<Semaphore>>,
    ) {
        let workflow = Self {
            job_id,
            gateway,
            channel,
            payload,
            config,
            writer,
            cancel,
            slots,
        };
        tokio::spawn(async move { workflow.run().await });
    }

    async fn run(self) {
        let _slot = match self.wait_for_slot().await {
            Ok(slot) => slot,
            Err(_) => {
                tracing::info!(job_id = %self.job_id, "job cancelled while pending");
                return;
            }
        };
        let outcome = self.execute_stages().await;
        // the instance goes away before the job is reported finished
        self.cleanup().await;

        match outcome {
            Ok(value) => {
                if self.writer.complete(value).await {
                    tracing::info!(job_id = %self.job_id, "job completed");
                } else {
                    tracing::info!(job_id = %self.job_id, "job cancelled before its result arrived");
                }
            }
            Err(Error::Cancelled) => {
                tracing::info!(job_id = %self.job_id, "job workflow stopped after cancel");
            }
            Err(err) => {
                tracing::warn!(job_id = %self.job_id, error = %err, "job failed");
                if !self.writer.fail(err.to_record_message()).await {
                    tracing::debug!(job_id = %self.job_id, "failure not recorded, job already cancelled");
                }
            }
        }
    }

    async fn execute_stages(&self) -> Result<Value> {
        self.advance(JobStatus::Provisioning).await?;
        let name = self.config.instance_name_for(self.job_id);
        let instance = self
            .gateway
            .create_instance(
                &name,
                self.config.instance_type.as_deref(),
                self.config.region.as_deref(),
            )
            .await?;
        let instance_id = instance.instance_id;
        tracing::info!(
            job_id = %self.job_id,
            provider = %self.gateway.provider_name(),
            instance_id = %instance_id,
            "instance provisioned"
        );
        self.writer.record_instance(instance_id.clone()).await;

        self.advance(JobStatus::WaitingForReady).await?;
        let poller = ReadinessPoller::new(
            self.config.instance_startup_timeout,
            self.config.instance_poll_interval,
        );
        let ssh_config = poller
            .wait_until_ready(&self.gateway, &instance_id, &self.cancel)
            .await?;
        self.writer.record_ssh_config(ssh_config.clone()).await;

        self.advance(JobStatus::Executing).await?;
        tracing::info!(job_id = %self.job_id, host = %ssh_config.host, "executing payload");
        self.channel
            .execute(ssh_config, self.payload.clone(), self.job_id, &self.config)
            .await
    }

    /// Held until the job is finished with its instance. `Err` if cancelled while waiting.
    async fn wait_for_slot(&self) -> Result<Option<OwnedSemaphorePermit>> {
        let slots = match &self.slots {
            Some(slots) => slots.clone(),
            None => return Ok(None),
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            permit = slots.acquire_owned() => permit.map(Some).map_err(|_| Error::Cancelled),
        }
    }

    /// Move to the next stage unless the job was cancelled meanwhile.
    async fn advance(&self, to: JobStatus) -> Result<()> {
        match self.writer.transition(to).await {
            Ok(from) => {
                tracing::debug!(job_id = %self.job_id, from = %from, to = %to, "job stage changed");
                Ok(())
            }
            Err(_) => Err(Error::Cancelled),
        }
    }

    async fn cleanup(&self) {
        let cancelled = self.cancel.is_cancelled();
        if !self.config.terminate_on_completion && !cancelled {
            tracing::debug!(job_id = %self.job_id, "leaving instance running");
            return;
        }
        let instance_id = match self.writer.claim_cleanup().await {
            Some(instance_id) => instance_id,
            None => return,
        };
        match self.gateway.delete_instance(&instance_id).await {
            Ok(true) => {
                tracing::info!(job_id = %self.job_id, instance_id = %instance_id, "instance deleted")
            }
            Ok(false) => {
                tracing::warn!(job_id = %self.job_id, instance_id = %instance_id, "provider did not delete instance")
            }
            Err(err) => {
                tracing::warn!(job_id = %self.job_id, instance_id = %instance_id, error = %err, "instance cleanup failed")
            }
        }
    }
}
