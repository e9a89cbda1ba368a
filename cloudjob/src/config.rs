use crate::types::JobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INSTANCE_STARTUP_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_INSTANCE_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_JOB_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_REMOTE_ROOT: &str = "/tmp";

/// Per-job settings.
///
/// Every field has a default, so a config document only needs the keys it overrides.
/// Durations are expressed in seconds on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Provider specific machine type, passed through untouched.
    pub instance_type: Option<String>,
    pub region: Option<String>,
    /// Name given to the provisioned instance. Derived from the job id when absent.
    pub instance_name: Option<String>,
    #[serde(with = "seconds")]
    pub instance_startup_timeout: Duration,
    #[serde(with = "seconds")]
    pub instance_poll_interval: Duration,
    /// Delete the instance once the job finishes, whether it succeeded or not.
    pub terminate_on_completion: bool,
    /// Private key used for SSH. Falls back to `~/.ssh/id_rsa`.
    pub key_file: Option<PathBuf>,
    /// How often `wait_for_result` re-checks the job.
    #[serde(with = "seconds")]
    pub job_poll_interval: Duration,
    /// Program used to run the driver script on the instance.
    pub interpreter: String,
    /// Directory on the instance under which per-job working directories are created.
    pub remote_root: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            instance_type: None,
            region: None,
            instance_name: None,
            instance_startup_timeout: DEFAULT_INSTANCE_STARTUP_TIMEOUT,
            instance_poll_interval: DEFAULT_INSTANCE_POLL_INTERVAL,
            terminate_on_completion: true,
            key_file: None,
            job_poll_interval: DEFAULT_JOB_POLL_INTERVAL,
            interpreter: DEFAULT_INTERPRETER.to_string(),
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
        }
    }
}

impl JobConfig {
    pub fn instance_name_for(&self, job_id: JobId) -> String {
        match &self.instance_name {
            Some(name) => name.clone(),
            None => {
                let id = job_id.to_simple().to_string();
                format!("cloudjob-{}", &id[..8])
            }
        }
    }

    pub fn key_file(&self) -> PathBuf {
        match &self.key_file {
            Some(path) => path.clone(),
            None => {
                let mut path = std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("~"));
                path.push(".ssh");
                path.push("id_rsa");
                path
            }
        }
    }
}

/// (De)serialize a `Duration` as a number of seconds.
mod seconds {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
