use cloudjob::{Error as JobError, JobConfig, JobOrchestrator, JobRecord, JobStatus, Payload};
use protobuf::remote_jobs_server::RemoteJobs;
use protobuf::JobStatus as ProtoStatus;
use protobuf::{
    CancelRequest, CancelResponse, JobSummary, ListRequest, ListResponse, StatusRequest,
    StatusResponse, SubmitRequest, SubmitResponse, WaitRequest, WaitResponse,
};
use tonic::{Request, Response, Status};
use uuid::Uuid;

pub struct RemoteJobsService {
    orchestrator: JobOrchestrator,
}

impl RemoteJobsService {
    pub fn new(orchestrator: JobOrchestrator) -> Self {
        Self { orchestrator }
    }
}

fn parse_job_id(bytes: &[u8]) -> Result<Uuid, Status> {
    Uuid::from_slice(bytes).map_err(|err| Status::invalid_argument(format!("bad job id: {}", err)))
}

fn to_proto_status(status: JobStatus) -> ProtoStatus {
    match status {
        JobStatus::Pending => ProtoStatus::Pending,
        JobStatus::Provisioning => ProtoStatus::Provisioning,
        JobStatus::WaitingForReady => ProtoStatus::WaitingForReady,
        JobStatus::Executing => ProtoStatus::Executing,
        JobStatus::Completed => ProtoStatus::Completed,
        JobStatus::Failed => ProtoStatus::Failed,
        JobStatus::Cancelled => ProtoStatus::Cancelled,
    }
}

fn to_status(err: JobError) -> Status {
    let message = err.to_string();
    match err {
        JobError::UnknownJob(_) => Status::not_found(message),
        JobError::UnsupportedProvider(_) => Status::invalid_argument(message),
        JobError::Authentication { .. } => Status::unauthenticated(message),
        JobError::JobFailed(_) => Status::aborted(message),
        JobError::Cancelled => Status::cancelled(message),
        _ => Status::internal(message),
    }
}

fn summarize(record: JobRecord) -> JobSummary {
    JobSummary {
        job_id: record.job_id.as_bytes().to_vec(),
        provider: record.provider_name,
        status: to_proto_status(record.status) as i32,
        created_at: record.created_at.to_rfc3339(),
        instance_id: record.instance_id.unwrap_or_default(),
        error: record.error.unwrap_or_default(),
    }
}

#[tonic::async_trait]
impl RemoteJobs for RemoteJobsService {
    async fn submit_job(
        &self,
        request: Request<SubmitRequest>,
    ) -> Result<Response<SubmitResponse>, Status> {
        let SubmitRequest {
            provider,
            payload_json,
            config_json,
        } = request.into_inner();
        let payload: Payload = serde_json::from_str(&payload_json)
            .map_err(|err| Status::invalid_argument(format!("bad payload: {}", err)))?;
        let config = if config_json.trim().is_empty() {
            JobConfig::default()
        } else {
            serde_json::from_str(&config_json)
                .map_err(|err| Status::invalid_argument(format!("bad job config: {}", err)))?
        };

        let job_id = self
            .orchestrator
            .submit(payload, config, &provider)
            .await
            .map_err(to_status)?;
        tracing::info!(job_id = %job_id, provider = %provider, "job submitted over rpc");
        Ok(Response::new(SubmitResponse {
            job_id: job_id.as_bytes().to_vec(),
        }))
    }

    async fn query_status(
        &self,
        request: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let job_id = parse_job_id(&request.into_inner().job_id)?;
        let status = self
            .orchestrator
            .get_status(job_id)
            .await
            .ok_or_else(|| to_status(JobError::UnknownJob(job_id)))?;
        Ok(Response::new(StatusResponse {
            status: to_proto_status(status) as i32,
        }))
    }

    async fn wait_result(
        &self,
        request: Request<WaitRequest>,
    ) -> Result<Response<WaitResponse>, Status> {
        let job_id = parse_job_id(&request.into_inner().job_id)?;
        let value = self
            .orchestrator
            .wait_for_result(job_id)
            .await
            .map_err(to_status)?;
        let result_json =
            serde_json::to_string(&value).map_err(|err| Status::internal(err.to_string()))?;
        Ok(Response::new(WaitResponse { result_json }))
    }

    async fn cancel_job(
        &self,
        request: Request<CancelRequest>,
    ) -> Result<Response<CancelResponse>, Status> {
        let job_id = parse_job_id(&request.into_inner().job_id)?;
        self.orchestrator.cancel(job_id).await.map_err(to_status)?;
        Ok(Response::new(CancelResponse {}))
    }

    async fn list_jobs(
        &self,
        _request: Request<ListRequest>,
    ) -> Result<Response<ListResponse>, Status> {
        let jobs = self
            .orchestrator
            .jobs()
            .await
            .into_iter()
            .map(summarize)
            .collect();
        Ok(Response::new(ListResponse { jobs }))
    }
}
