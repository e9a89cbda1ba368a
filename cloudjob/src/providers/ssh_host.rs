use crate::error::{Error, Result};
use crate::gateway::{
    ClusterConfig, CloudProvider, InstanceDescriptor, InstanceRequest, InstanceStatus,
};
use crate::types::{Credentials, InstanceId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

pub const PROVIDER_NAME: &str = "ssh";
const DEFAULT_PORT: u16 = 22;

/// A provider backed by a single machine that already exists and accepts SSH.
///
/// "Creating" an instance hands out a lease on that machine and deleting it drops the lease.
/// Credentials: `host`, `username` and optionally `port`.
pub struct SshHostProvider {
    host: String,
    username: String,
    port: u16,
    leases: Mutex<HashSet<InstanceId>>,
}

impl SshHostProvider {
    pub fn new(host: impl Into<String>, username: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            port,
            leases: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let field = |key: &str| {
            credentials
                .get(key)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let port = match credentials.get("port") {
            Some(port) => port.trim().parse().map_err(|_| Error::Authentication {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("invalid port `{}`", port),
            })?,
            None => DEFAULT_PORT,
        };
        Ok(Self::new(field("host"), field("username"), port))
    }

    fn is_leased(&self, instance_id: &str) -> bool {
        self.leases
            .lock()
            .map(|leases| leases.contains(instance_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl CloudProvider for SshHostProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn authenticate(&self) -> Result<bool> {
        Ok(!self.host.is_empty() && !self.username.is_empty() && self.port != 0)
    }

    async fn create_instance(&self, request: &InstanceRequest) -> Result<InstanceDescriptor> {
        let instance_id = format!("{}-{}", request.name, Uuid::new_v4().to_simple());
        self.leases
            .lock()
            .map_err(|_| Error::Provisioning("lease table poisoned".to_string()))?
            .insert(instance_id.clone());
        let mut descriptor = InstanceDescriptor::new(instance_id);
        descriptor
            .details
            .insert("host".to_string(), self.host.clone());
        Ok(descriptor)
    }

    async fn get_instance_status(&self, instance_id: &str) -> Result<InstanceStatus> {
        if self.is_leased(instance_id) {
            Ok(InstanceStatus::new("running"))
        } else {
            Ok(InstanceStatus::new("terminated"))
        }
    }

    async fn get_connection_info(&self, instance_id: &str) -> Result<ClusterConfig> {
        if !self.is_leased(instance_id) {
            return Err(Error::Provider(format!("unknown instance {}", instance_id)));
        }
        Ok(ClusterConfig {
            cluster_host: self.host.clone(),
            username: self.username.clone(),
            cluster_port: self.port,
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<bool> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| Error::Provider("lease table poisoned".to_string()))?;
        Ok(leases.remove(instance_id))
    }

    async fn list_instances(&self) -> Result<Vec<InstanceDescriptor>> {
        let leases = self
            .leases
            .lock()
            .map_err(|_| Error::Provider("lease table poisoned".to_string()))?;
        let mut instances: Vec<InstanceDescriptor> =
            leases.iter().cloned().map(InstanceDescriptor::new).collect();
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Ok(instances)
    }

    async fn estimate_cost(&self, _request: &InstanceRequest) -> Result<f64> {
        Ok(0.0)
    }
}
