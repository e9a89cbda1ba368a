use crate::config::JobConfig;
use crate::events::JobStatus;
use crate::gateway::SshConnectionConfig;
use crate::types::{InstanceId, JobId, ProviderName};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Everything known about one job.
#[derive(Clone, Debug)]
pub struct JobRecord {
    pub job_id: JobId,
    pub provider_name: ProviderName,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub instance_id: Option<InstanceId>,
    pub ssh_config: Option<SshConnectionConfig>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub cancelled: bool,
    pub config: JobConfig,
    cleanup_claimed: bool,
}

impl JobRecord {
    pub fn new(job_id: JobId, provider_name: ProviderName, config: JobConfig) -> Self {
        Self {
            job_id,
            provider_name,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            instance_id: None,
            ssh_config: None,
            result: None,
            error: None,
            cancelled: false,
            config,
            cleanup_claimed: false,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no such job")]
    UnknownJob,
    #[error("cannot move job from {from} to {to}")]
    Rejected { from: JobStatus, to: JobStatus },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job is now cancelled. Carries the instance to tear down, if this call claimed it.
    Cancelled { teardown: Option<InstanceId> },
    /// The job had already reached this terminal state; nothing changed.
    AlreadyFinished(JobStatus),
}

/// In-memory store of job records keyed by job id.
///
/// The registry has no interior locking: it is owned by the job coordinator actor, which
/// serializes every read and write. Records are never evicted.
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<JobId, JobRecord>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// Insert a new record. Returns false, leaving the existing record alone, if the id is taken.
    pub fn insert(&mut self, record: JobRecord) -> bool {
        if self.jobs.contains_key(&record.job_id) {
            return false;
        }
        self.jobs.insert(record.job_id, record);
        true
    }

    pub fn get(&self, job_id: &JobId) -> Option<&JobRecord> {
        self.jobs.get(job_id)
    }

    pub fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.jobs.get(job_id).map(|record| record.status)
    }

    pub fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.jobs.values()
    }

    /// Compare-and-set the status. Returns the previous status on success.
    pub fn transition(&mut self, job_id: &JobId, to: JobStatus) -> Result<JobStatus, TransitionError> {
        let record = self.record_mut(job_id)?;
        let from = record.status;
        if !from.can_transition_to(to) {
            return Err(TransitionError::Rejected { from, to });
        }
        record.status = to;
        if to == JobStatus::Cancelled {
            record.cancelled = true;
        }
        Ok(from)
    }

    /// Remember the provisioned instance even when the job was cancelled meanwhile, so that
    /// cleanup can still find it. Returns the current status.
    pub fn record_instance(
        &mut self,
        job_id: &JobId,
        instance_id: InstanceId,
    ) -> Result<JobStatus, TransitionError> {
        let record = self.record_mut(job_id)?;
        record.instance_id = Some(instance_id);
        Ok(record.status)
    }

    pub fn record_ssh_config(
        &mut self,
        job_id: &JobId,
        ssh_config: SshConnectionConfig,
    ) -> Result<JobStatus, TransitionError> {
        let record = self.record_mut(job_id)?;
        record.ssh_config = Some(ssh_config);
        Ok(record.status)
    }

    pub fn complete(&mut self, job_id: &JobId, result: Value) -> Result<(), TransitionError> {
        self.transition(job_id, JobStatus::Completed)?;
        self.record_mut(job_id)?.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, job_id: &JobId, error: String) -> Result<(), TransitionError> {
        self.transition(job_id, JobStatus::Failed)?;
        self.record_mut(job_id)?.error = Some(error);
        Ok(())
    }

    pub fn cancel(&mut self, job_id: &JobId) -> Result<CancelOutcome, TransitionError> {
        match self.transition(job_id, JobStatus::Cancelled) {
            Ok(_) => Ok(CancelOutcome::Cancelled {
                teardown: self.claim_cleanup(job_id),
            }),
            Err(TransitionError::Rejected { from, .. }) => Ok(CancelOutcome::AlreadyFinished(from)),
            Err(err) => Err(err),
        }
    }

    /// Hand out the job's instance for deletion. Succeeds at most once per job.
    pub fn claim_cleanup(&mut self, job_id: &JobId) -> Option<InstanceId> {
        let record = self.jobs.get_mut(job_id)?;
        if record.cleanup_claimed {
            return None;
        }
        let instance_id = record.instance_id.clone()?;
        record.cleanup_claimed = true;
        Some(instance_id)
    }

    fn record_mut(&mut self, job_id: &JobId) -> Result<&mut JobRecord, TransitionError> {
        self.jobs.get_mut(job_id).ok_or(TransitionError::UnknownJob)
    }
}
