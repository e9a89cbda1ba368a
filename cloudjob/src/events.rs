use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle stage of a job.
///
/// Stages advance strictly in declaration order on the success path. `Failed` and `Cancelled`
/// may be entered from any stage that is not yet terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Provisioning,
    WaitingForReady,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// The stage that follows `self` when nothing goes wrong.
    pub fn next(self) -> Option<JobStatus> {
        use JobStatus::*;
        match self {
            Pending => Some(Provisioning),
            Provisioning => Some(WaitingForReady),
            WaitingForReady => Some(Executing),
            Executing => Some(Completed),
            Completed | Failed | Cancelled => None,
        }
    }

    pub fn can_transition_to(self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            JobStatus::Failed | JobStatus::Cancelled => true,
            _ => self.next() == Some(to),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Provisioning => "provisioning",
            JobStatus::WaitingForReady => "waiting_for_ready",
            JobStatus::Executing => "executing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
