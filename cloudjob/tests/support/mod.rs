#![allow(dead_code)]

use async_trait::async_trait;
use cloudjob::channel::protocol::{self, RemoteFailure};
use cloudjob::channel::{Connector, ExecOutput, RemoteSession};
use cloudjob::error::{Error, Result};
use cloudjob::gateway::{
    ClusterConfig, CloudProvider, InstanceDescriptor, InstanceRequest, InstanceStatus,
};
use cloudjob::{
    JobConfig, JobOrchestrator, Payload, ProviderCatalog, RemoteExecutionChannel,
    SshConnectionConfig,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider whose instance walks through a scripted list of statuses, one per query.
/// The last status repeats forever.
pub struct FakeProvider {
    name: String,
    host: String,
    statuses: Mutex<VecDeque<String>>,
    accept_credentials: bool,
    create_error: Option<String>,
    create_delay: Duration,
    status_delay: Duration,
    pub creates: AtomicUsize,
    pub status_queries: AtomicUsize,
    pub deletes: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(name: &str, statuses: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            host: format!("{}.example.internal", name),
            statuses: Mutex::new(statuses.iter().map(|s| s.to_string()).collect()),
            accept_credentials: true,
            create_error: None,
            create_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            creates: AtomicUsize::new(0),
            status_queries: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// Reports `pending` for `polls` queries, then `running`.
    pub fn ready_after(name: &str, polls: usize) -> Self {
        let mut statuses = vec!["pending"; polls];
        statuses.push("running");
        Self::new(name, &statuses)
    }

    pub fn never_ready(name: &str) -> Self {
        Self::new(name, &["pending"])
    }

    pub fn rejecting_credentials(mut self) -> Self {
        self.accept_credentials = false;
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Every status query takes `delay` before answering.
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self) -> Result<bool> {
        Ok(self.accept_credentials)
    }

    async fn create_instance(&self, request: &InstanceRequest) -> Result<InstanceDescriptor> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        match &self.create_error {
            Some(message) => Err(Error::Provider(message.clone())),
            None => Ok(InstanceDescriptor::new(format!("{}-{}", self.name, request.name))),
        }
    }

    async fn get_instance_status(&self, _instance_id: &str) -> Result<InstanceStatus> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses.front().cloned().unwrap_or_else(|| "pending".to_string())
        };
        Ok(InstanceStatus::new(status))
    }

    async fn get_connection_info(&self, _instance_id: &str) -> Result<ClusterConfig> {
        Ok(ClusterConfig {
            cluster_host: self.host.clone(),
            username: "ubuntu".to_string(),
            cluster_port: 22,
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.deleted.lock().unwrap().push(instance_id.to_string());
        Ok(true)
    }
}

/// Provider that only implements the mandatory calls.
pub struct ReadOnlyProvider;

#[async_trait]
impl CloudProvider for ReadOnlyProvider {
    fn name(&self) -> &str {
        "read-only"
    }

    async fn authenticate(&self) -> Result<bool> {
        Ok(true)
    }

    async fn get_instance_status(&self, _instance_id: &str) -> Result<InstanceStatus> {
        Ok(InstanceStatus::new("running"))
    }

    async fn get_connection_info(&self, _instance_id: &str) -> Result<ClusterConfig> {
        Err(Error::Provider("no instances".to_string()))
    }

    async fn delete_instance(&self, _instance_id: &str) -> Result<bool> {
        Ok(false)
    }
}

/// What the emulated driver does with a payload.
#[derive(Clone, Debug)]
pub enum RemoteRun {
    Return(Value),
    Raise { message: String, traceback: String },
    Crash { exit_status: i32, stderr: Vec<u8> },
    /// exits cleanly without writing a result
    Silent,
}

type Behavior = Arc<dyn Fn(&SshConnectionConfig, &Payload) -> RemoteRun + Send + Sync>;

/// Everything the fake instance side observed.
#[derive(Default)]
pub struct RemoteState {
    pub files: HashMap<String, Vec<u8>>,
    pub dirs: Vec<String>,
    pub commands: Vec<String>,
    pub uploaded_from: Vec<PathBuf>,
    pub connects: usize,
    pub closes: usize,
}

/// Connector that emulates an instance running the driver script.
#[derive(Clone)]
pub struct FakeConnector {
    pub state: Arc<Mutex<RemoteState>>,
    behavior: Behavior,
    exec_delay: Duration,
    refuse_connections: bool,
    fail_uploads: bool,
}

impl FakeConnector {
    pub fn new<F>(behavior: F) -> Self
    where
        F: Fn(&SshConnectionConfig, &Payload) -> RemoteRun + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(RemoteState::default())),
            behavior: Arc::new(behavior),
            exec_delay: Duration::ZERO,
            refuse_connections: false,
            fail_uploads: false,
        }
    }

    /// Returns the first positional argument back.
    pub fn echo() -> Self {
        Self::new(|_, payload| RemoteRun::Return(payload.args.first().cloned().unwrap_or(Value::Null)))
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn channel(&self) -> RemoteExecutionChannel {
        RemoteExecutionChannel::new(Arc::new(self.clone()))
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, config: &SshConnectionConfig) -> Result<Box<dyn RemoteSession>> {
        if self.refuse_connections {
            return Err(Error::Connectivity(format!("connection to {} refused", config.host)));
        }
        self.state.lock().unwrap().connects += 1;
        Ok(Box::new(FakeSession {
            connector: self.clone(),
            config: config.clone(),
        }))
    }
}

struct FakeSession {
    connector: FakeConnector,
    config: SshConnectionConfig,
}

impl FakeSession {
    fn put(&self, path: String, contents: Vec<u8>) {
        self.connector.state.lock().unwrap().files.insert(path, contents);
    }
}

impl RemoteSession for FakeSession {
    fn create_dir(&mut self, path: &str) -> Result<()> {
        self.connector.state.lock().unwrap().dirs.push(path.to_string());
        Ok(())
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<()> {
        if self.connector.fail_uploads {
            self.connector
                .state
                .lock()
                .unwrap()
                .uploaded_from
                .push(local.to_path_buf());
            return Err(Error::Connectivity("sftp write failed".to_string()));
        }
        let contents = std::fs::read(local)?;
        let mut state = self.connector.state.lock().unwrap();
        state.uploaded_from.push(local.to_path_buf());
        state.files.insert(remote.to_string(), contents);
        Ok(())
    }

    fn write_file(&mut self, remote: &str, contents: &[u8]) -> Result<()> {
        self.put(remote.to_string(), contents.to_vec());
        Ok(())
    }

    fn read_file(&mut self, remote: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.connector.file(remote))
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput> {
        self.connector
            .state
            .lock()
            .unwrap()
            .commands
            .push(command.to_string());
        let dir = command
            .strip_prefix("cd '")
            .and_then(|rest| rest.split("' && ").next())
            .ok_or_else(|| Error::Connectivity(format!("unexpected command {}", command)))?
            .replace(r"'\''", "'");
        let stderr_log = protocol::remote_path(&dir, protocol::STDERR_FILE);
        if self
            .connector
            .file(&protocol::remote_path(&dir, protocol::DRIVER_FILE))
            .is_none()
        {
            self.put(stderr_log, b"can't open file 'run'\n".to_vec());
            return Ok(ExecOutput {
                exit_status: 2,
                ..Default::default()
            });
        }
        let blob = self
            .connector
            .file(&protocol::remote_path(&dir, protocol::PAYLOAD_FILE))
            .ok_or_else(|| Error::Connectivity("payload missing".to_string()))?;
        let payload = Payload::from_blob(&blob)?;
        if !self.connector.exec_delay.is_zero() {
            std::thread::sleep(self.connector.exec_delay);
        }

        match (self.connector.behavior)(&self.config, &payload) {
            RemoteRun::Return(value) => {
                self.put(
                    protocol::remote_path(&dir, protocol::RESULT_FILE),
                    serde_json::to_vec(&value)?,
                );
                Ok(ExecOutput::default())
            }
            RemoteRun::Raise { message, traceback } => {
                let failure = RemoteFailure {
                    message: message.clone(),
                    traceback: Some(traceback),
                };
                self.put(
                    protocol::remote_path(&dir, protocol::ERROR_FILE),
                    serde_json::to_vec(&failure)?,
                );
                self.put(stderr_log, format!("{}\n", message).into_bytes());
                Ok(ExecOutput {
                    exit_status: 1,
                    ..Default::default()
                })
            }
            RemoteRun::Crash {
                exit_status,
                stderr,
            } => {
                self.put(stderr_log, stderr);
                Ok(ExecOutput {
                    exit_status,
                    ..Default::default()
                })
            }
            RemoteRun::Silent => Ok(ExecOutput::default()),
        }
    }

    fn close(&mut self) {
        self.connector.state.lock().unwrap().closes += 1;
    }
}

pub fn ssh_config(host: &str) -> SshConnectionConfig {
    SshConnectionConfig {
        host: host.to_string(),
        username: "ubuntu".to_string(),
        port: 22,
        key_file: PathBuf::from("/keys/test"),
    }
}

pub fn identity_payload() -> Payload {
    Payload::new("def identity(x):\n    return x\n", "identity")
}

/// Short intervals so workflows finish quickly.
pub fn fast_config() -> JobConfig {
    JobConfig {
        instance_startup_timeout: Duration::from_secs(5),
        instance_poll_interval: Duration::from_millis(20),
        job_poll_interval: Duration::from_millis(10),
        key_file: Some(PathBuf::from("/keys/test")),
        ..Default::default()
    }
}

/// Catalog serving the given providers under their own names.
pub fn catalog(providers: &[Arc<FakeProvider>]) -> ProviderCatalog {
    let mut catalog = ProviderCatalog::new();
    for provider in providers {
        let provider = provider.clone();
        let name = provider.name().to_string();
        catalog.register(name, move |_| Ok(provider.clone() as Arc<dyn CloudProvider>));
    }
    catalog
}

pub fn orchestrator(providers: &[Arc<FakeProvider>], connector: &FakeConnector) -> JobOrchestrator {
    JobOrchestrator::spawn(catalog(providers), connector.channel(), 64)
}

/// Orchestrator that lets only `max_active_jobs` jobs hold an instance at once.
pub fn limited_orchestrator(
    providers: &[Arc<FakeProvider>],
    connector: &FakeConnector,
    max_active_jobs: usize,
) -> JobOrchestrator {
    JobOrchestrator::spawn_limited(catalog(providers), connector.channel(), 64, max_active_jobs)
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F: FnMut() -> bool>(within: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
