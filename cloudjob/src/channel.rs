pub mod driver;
pub mod protocol;
mod ssh;

use crate::config::JobConfig;
use crate::error::{Error, Result};
use crate::gateway::SshConnectionConfig;
use crate::payload::Payload;
use crate::types::JobId;
use protocol::{RemoteFailure, RemoteOutcome};
use serde_json::Value;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use tokio::task;

const STDERR_TAIL_LINES: usize = 20;

pub use ssh::SshConnector;

/// Opens sessions to remote instances.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &SshConnectionConfig) -> Result<Box<dyn RemoteSession>>;
}

/// A blocking command + file transfer session with one instance.
pub trait RemoteSession {
    fn create_dir(&mut self, path: &str) -> Result<()>;
    fn upload(&mut self, local: &Path, remote: &str) -> Result<()>;
    fn write_file(&mut self, remote: &str, contents: &[u8]) -> Result<()>;
    /// `Ok(None)` when the file does not exist.
    fn read_file(&mut self, remote: &str) -> Result<Option<Vec<u8>>>;
    fn exec(&mut self, command: &str) -> Result<ExecOutput>;
    fn close(&mut self);
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Closes the session when dropped, whichever way execution ends.
struct SessionGuard(Box<dyn RemoteSession>);

impl Deref for SessionGuard {
    type Target = dyn RemoteSession;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.0
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Runs a payload on a ready instance and brings back its result.
///
/// Each call uses its own session and its own remote directory, so calls for different jobs
/// never share state.
#[derive(Clone)]
pub struct RemoteExecutionChannel {
    connector: Arc<dyn Connector>,
}

impl RemoteExecutionChannel {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    pub fn over_ssh() -> Self {
        Self::new(Arc::new(SshConnector::default()))
    }

    /// Run the payload on a blocking thread. The remote call cannot be interrupted once started.
    pub async fn execute(
        &self,
        ssh_config: SshConnectionConfig,
        payload: Payload,
        job_id: JobId,
        config: &JobConfig,
    ) -> Result<Value> {
        let channel = self.clone();
        let interpreter = config.interpreter.clone();
        let remote_root = config.remote_root.clone();
        task::spawn_blocking(move || {
            channel.execute_blocking(&ssh_config, &payload, job_id, &interpreter, &remote_root)
        })
        .await
        .map_err(|err| Error::RemoteExecution {
            message: format!("execution task did not finish: {}", err),
            traceback: None,
        })?
    }

    pub fn execute_blocking(
        &self,
        ssh_config: &SshConnectionConfig,
        payload: &Payload,
        job_id: JobId,
        interpreter: &str,
        remote_root: &str,
    ) -> Result<Value> {
        let mut session = SessionGuard(self.connector.connect(ssh_config)?);
        let dir = protocol::remote_dir(remote_root, job_id);
        session.create_dir(&dir)?;
        upload_payload(&mut session, &dir, payload)?;
        session.write_file(
            &protocol::remote_path(&dir, protocol::DRIVER_FILE),
            driver::render().as_bytes(),
        )?;

        let output = session.exec(&protocol::run_command(&dir, interpreter))?;
        tracing::debug!(
            job_id = %job_id,
            host = %ssh_config.host,
            exit_status = output.exit_status,
            "driver finished"
        );
        collect_outcome(&mut session, &dir, &output)?.into_result()
    }
}

/// Stage the payload in a local temp file and upload it. The temp file is removed on drop.
fn upload_payload(session: &mut SessionGuard, dir: &str, payload: &Payload) -> Result<()> {
    let mut staged = tempfile::NamedTempFile::new()?;
    staged.write_all(&payload.to_blob()?)?;
    staged.flush()?;
    session.upload(
        staged.path(),
        &protocol::remote_path(dir, protocol::PAYLOAD_FILE),
    )
}

fn collect_outcome(
    session: &mut SessionGuard,
    dir: &str,
    output: &ExecOutput,
) -> Result<RemoteOutcome> {
    if output.exit_status != 0 {
        let reported = session
            .read_file(&protocol::remote_path(dir, protocol::ERROR_FILE))
            .ok()
            .flatten()
            .and_then(|blob| serde_json::from_slice::<RemoteFailure>(&blob).ok());
        let failure = reported.unwrap_or_else(|| RemoteFailure {
            message: crash_message(session, dir, output),
            traceback: None,
        });
        return Ok(RemoteOutcome::Failure(failure));
    }

    let blob = session
        .read_file(&protocol::remote_path(dir, protocol::RESULT_FILE))?
        .ok_or_else(|| Error::RemoteExecution {
            message: format!("driver exited cleanly but left no {}", protocol::RESULT_FILE),
            traceback: None,
        })?;
    let value = serde_json::from_slice(&blob).map_err(|err| Error::RemoteExecution {
        message: format!("could not decode {}: {}", protocol::RESULT_FILE, err),
        traceback: None,
    })?;
    Ok(RemoteOutcome::Success(value))
}

/// Output from the instance is not guaranteed to be UTF-8.
pub(crate) fn decode_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Last lines of whatever the driver wrote to stderr, or the bare exit status.
fn crash_message(session: &mut SessionGuard, dir: &str, output: &ExecOutput) -> String {
    let logged = session
        .read_file(&protocol::remote_path(dir, protocol::STDERR_FILE))
        .ok()
        .flatten()
        .map(|bytes| decode_output(&bytes))
        .unwrap_or_default();
    let stderr = match output.stderr.trim() {
        "" => logged.trim(),
        shell => shell,
    };
    if stderr.is_empty() {
        return format!("driver exited with status {}", output.exit_status);
    }
    let lines: Vec<&str> = stderr.lines().collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}
