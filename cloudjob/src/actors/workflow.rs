mod actor;

use super::coordinator::JobRecordWriter;
use crate::channel::RemoteExecutionChannel;
use crate::config::JobConfig;
use crate::gateway::ProviderGateway;
use crate::payload::Payload;
use crate::types::JobId;
use actor::Workflow;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Handle to the task running one job.
///
/// The coordinator keeps one per unfinished job so that `cancel` can stop the workflow at its
/// next suspension point and reach the job's provider.
pub struct WorkflowHandle {
    gateway: ProviderGateway,
    cancel: CancellationToken,
}

impl WorkflowHandle {
    pub fn spawn(
        job_id: JobId,
        gateway: ProviderGateway,
        channel: RemoteExecutionChannel,
        payload: Payload,
        config: JobConfig,
        writer: JobRecordWriter,
        slots: Option<Arc<Semaphore>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        Workflow::spawn(
            job_id,
            gateway.clone(),
            channel,
            payload,
            config,
            writer,
            cancel.clone(),
            slots,
        );
        Self { gateway, cancel }
    }

    pub fn gateway(&self) -> ProviderGateway {
        self.gateway.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
