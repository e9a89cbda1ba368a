use cloudjob::{JobConfig, Payload};
use protobuf::{
    remote_jobs_client::RemoteJobsClient, CancelRequest, JobStatus, ListRequest, StatusRequest,
    SubmitRequest, WaitRequest,
};
use std::error;
use std::path::PathBuf;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};
use tonic::{Request, Status};
use uuid::Uuid;

type JobId = Vec<u8>;

/// How to reach the server.
pub struct ConnectOptions {
    pub ca_cert: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

pub struct ClientCli {
    inner: RemoteJobsClient<Channel>,
}

fn status_name(status: i32) -> &'static str {
    match JobStatus::from_i32(status) {
        Some(JobStatus::Pending) => "pending",
        Some(JobStatus::Provisioning) => "provisioning",
        Some(JobStatus::WaitingForReady) => "waiting_for_ready",
        Some(JobStatus::Executing) => "executing",
        Some(JobStatus::Completed) => "completed",
        Some(JobStatus::Failed) => "failed",
        Some(JobStatus::Cancelled) => "cancelled",
        None => "unknown",
    }
}

fn uuid_of(job_id: &[u8]) -> Result<Uuid, Status> {
    Uuid::from_slice(job_id)
        .map_err(|err| Status::internal(format!("server responded with invalid uuid: {}", err)))
}

impl ClientCli {
    pub async fn connect(
        server_addr: &str,
        options: ConnectOptions,
    ) -> Result<Self, Box<dyn error::Error>> {
        let channel = match &options.ca_cert {
            Some(ca_cert) => {
                let mut tls = ClientTlsConfig::new()
                    .ca_certificate(Certificate::from_pem(tokio::fs::read(ca_cert).await?));
                if let (Some(cert), Some(key)) = (&options.cert, &options.key) {
                    let cert = tokio::fs::read(cert).await?;
                    let key = tokio::fs::read(key).await?;
                    tls = tls.identity(Identity::from_pem(cert, key));
                }
                Channel::from_shared(format!("https://{}", server_addr))?
                    .tls_config(tls)?
                    .connect()
                    .await?
            }
            None => {
                Channel::from_shared(format!("http://{}", server_addr))?
                    .connect()
                    .await?
            }
        };
        Ok(Self {
            inner: RemoteJobsClient::new(channel),
        })
    }

    pub async fn submit_job(
        &mut self,
        provider: &str,
        payload: &Payload,
        config: Option<&JobConfig>,
    ) -> Result<JobId, Box<dyn error::Error>> {
        let config_json = match config {
            Some(config) => serde_json::to_string(config)?,
            None => String::new(),
        };
        let request = Request::new(SubmitRequest {
            provider: provider.into(),
            payload_json: serde_json::to_string(payload)?,
            config_json,
        });
        let job_id = self.inner.submit_job(request).await?.into_inner().job_id;
        println!("Submitted job id: {}", uuid_of(&job_id)?);
        Ok(job_id)
    }

    pub async fn query_status(&mut self, job_id: JobId) -> Result<(), Status> {
        let response = self
            .inner
            .query_status(Request::new(StatusRequest { job_id }))
            .await?;
        println!("{}", status_name(response.into_inner().status));
        Ok(())
    }

    pub async fn wait_result(&mut self, job_id: JobId) -> Result<(), Status> {
        let response = self
            .inner
            .wait_result(Request::new(WaitRequest { job_id }))
            .await?;
        println!("{}", response.into_inner().result_json);
        Ok(())
    }

    pub async fn cancel_job(&mut self, job_id: JobId) -> Result<(), Status> {
        let uuid = uuid_of(&job_id)?;
        self.inner
            .cancel_job(Request::new(CancelRequest { job_id }))
            .await?;
        println!("Cancelled job id: {}", uuid);
        Ok(())
    }

    pub async fn list_jobs(&mut self) -> Result<(), Status> {
        let jobs = self
            .inner
            .list_jobs(Request::new(ListRequest {}))
            .await?
            .into_inner()
            .jobs;
        for job in jobs {
            let mut line = format!(
                "{}  {:<10} {:<18} {}",
                uuid_of(&job.job_id)?,
                job.provider,
                status_name(job.status),
                job.created_at
            );
            if !job.instance_id.is_empty() {
                line.push_str(&format!("  instance={}", job.instance_id));
            }
            if !job.error.is_empty() {
                line.push_str(&format!("  error={}", job.error.lines().next().unwrap_or("")));
            }
            println!("{}", line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names() {
        assert_eq!(status_name(JobStatus::WaitingForReady as i32), "waiting_for_ready");
        assert_eq!(status_name(JobStatus::Cancelled as i32), "cancelled");
        assert_eq!(status_name(42), "unknown");
    }
}
