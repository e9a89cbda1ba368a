//! Run a payload on a freshly provisioned cloud instance and collect its result.
//!
//! A [`JobOrchestrator`] provisions an instance through a [`CloudProvider`], waits until it
//! accepts SSH, runs the payload there through a driver script and tears the instance down.

mod actors;
pub mod channel;
pub mod config;
pub mod error;
mod events;
pub mod gateway;
pub mod payload;
pub mod poller;
pub mod providers;
pub mod registry;
pub mod types;

// re-export the orchestrator handle as if it is the orchestrator itself.
pub use actors::coordinator::JobOrchestratorHandle as JobOrchestrator;
pub use channel::RemoteExecutionChannel;
pub use config::JobConfig;
pub use error::{Error, Result};
pub use events::JobStatus;
pub use gateway::{CloudProvider, ProviderGateway, SshConnectionConfig};
pub use payload::Payload;
pub use providers::ProviderCatalog;
pub use registry::JobRecord;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn orchestrator() -> JobOrchestrator {
        JobOrchestrator::spawn(
            ProviderCatalog::with_builtin(),
            RemoteExecutionChannel::over_ssh(),
            16,
        )
    }

    #[tokio::test]
    async fn basic() {
        let orchestrator = orchestrator();
        let job_id = Uuid::new_v4();
        assert_eq!(orchestrator.get_status(job_id).await, None);
        assert!(orchestrator.job(job_id).await.is_none());
        assert!(orchestrator.jobs().await.is_empty());
        assert!(matches!(
            orchestrator.wait_for_result(job_id).await,
            Err(Error::UnknownJob(id)) if id == job_id
        ));
        assert!(matches!(
            orchestrator.cancel(job_id).await,
            Err(Error::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn submit_validates_provider() {
        let orchestrator = orchestrator();
        let payload = Payload::new("def main():\n    return 1\n", "main");
        let err = orchestrator
            .submit(payload, JobConfig::default(), "lambda")
            .await
            .expect_err("unknown provider accepted");
        assert!(matches!(err, Error::UnsupportedProvider(name) if name == "lambda"));
        assert!(orchestrator.jobs().await.is_empty());
    }
}
