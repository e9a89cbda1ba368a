use crate::error::{Error, Result};
use crate::gateway::{InstanceState, ProviderGateway, SshConnectionConfig};
use std::future::Future;
use std::time::Duration;
use tokio::select;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Polls an instance until it accepts SSH connections.
#[derive(Clone, Copy, Debug)]
pub struct ReadinessPoller {
    timeout: Duration,
    poll_interval: Duration,
}

impl ReadinessPoller {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Wait for `instance_id` to become ready and return how to connect to it.
    ///
    /// A failed or terminated instance ends the wait immediately. Errors from individual status
    /// queries are tolerated and reported as the last observation if the wait times out. The
    /// wait, provider calls included, never exceeds `timeout + poll_interval`. Cancelling
    /// interrupts both the sleep and any provider call in flight.
    pub async fn wait_until_ready(
        &self,
        gateway: &ProviderGateway,
        instance_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SshConnectionConfig> {
        let started = Instant::now();
        let deadline = started + self.timeout + self.poll_interval;
        loop {
            let queried = bounded(gateway.get_status(instance_id), deadline, cancel).await?;
            let last_observed = match queried {
                Some(Ok(status)) => match status.state() {
                    InstanceState::Ready => {
                        tracing::debug!(instance_id, status = %status, "instance ready");
                        let connection =
                            bounded(gateway.get_connection_config(instance_id), deadline, cancel);
                        return match connection.await? {
                            Some(config) => config,
                            None => Err(self.timed_out(
                                instance_id,
                                format!("{}, connection info query timed out", status),
                            )),
                        };
                    }
                    InstanceState::Fatal => {
                        return Err(Error::InstanceFailed {
                            instance_id: instance_id.to_string(),
                            state: status.to_string(),
                        });
                    }
                    InstanceState::Pending => {
                        tracing::trace!(instance_id, status = %status, "instance not ready");
                        status.to_string()
                    }
                },
                Some(Err(err)) => {
                    tracing::debug!(instance_id, error = %err, "instance status query failed");
                    format!("error: {}", err)
                }
                None => "status query timed out".to_string(),
            };

            if started.elapsed() >= self.timeout {
                return Err(self.timed_out(instance_id, last_observed));
            }

            select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = time::sleep(self.poll_interval) => {}
            }
        }
    }

    fn timed_out(&self, instance_id: &str, last_observed: String) -> Error {
        Error::ReadinessTimeout {
            instance_id: instance_id.to_string(),
            timeout: self.timeout,
            last_observed,
        }
    }
}

/// Run one provider call. `Ok(None)` if it is still running at `deadline`.
async fn bounded<T>(
    call: impl Future<Output = Result<T>>,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<Option<Result<T>>> {
    select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        outcome = time::timeout_at(deadline, call) => Ok(outcome.ok()),
    }
}
