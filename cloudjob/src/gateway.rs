use crate::error::{Error, Result};
use crate::types::InstanceId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where and how to reach an instance over SSH.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConnectionConfig {
    pub host: String,
    pub username: String,
    pub port: u16,
    pub key_file: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceRequest {
    pub name: String,
    pub instance_type: Option<String>,
    pub region: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub instance_id: InstanceId,
    /// Anything else the provider reports about the new instance.
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl InstanceDescriptor {
    pub fn new(instance_id: impl Into<InstanceId>) -> Self {
        Self {
            instance_id: instance_id.into(),
            details: HashMap::new(),
        }
    }
}

/// Raw status as reported by a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl InstanceStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: None,
        }
    }

    pub fn state(&self) -> InstanceState {
        InstanceState::classify(&self.status)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} ({})", self.status, message),
            None => f.write_str(&self.status),
        }
    }
}

/// Provider status strings folded into what the readiness poller cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Ready,
    Fatal,
}

impl InstanceState {
    pub fn classify(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "active" | "running" | "ready" => InstanceState::Ready,
            "failed" | "terminated" | "terminating" | "error" | "deleted" => InstanceState::Fatal,
            _ => InstanceState::Pending,
        }
    }
}

/// Connection details as reported by a provider, before the job's key file is attached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub cluster_host: String,
    pub username: String,
    pub cluster_port: u16,
}

/// One cloud vendor.
///
/// Implementations are built from a set of credentials by a factory registered in the
/// [`ProviderCatalog`](crate::providers::ProviderCatalog). Optional capabilities default to
/// [`Error::NotSupported`].
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Check the credentials the provider was built with.
    async fn authenticate(&self) -> Result<bool>;

    async fn create_instance(&self, _request: &InstanceRequest) -> Result<InstanceDescriptor> {
        Err(self.not_supported("create_instance"))
    }

    async fn get_instance_status(&self, instance_id: &str) -> Result<InstanceStatus>;

    async fn get_connection_info(&self, instance_id: &str) -> Result<ClusterConfig>;

    async fn delete_instance(&self, instance_id: &str) -> Result<bool>;

    async fn list_instances(&self) -> Result<Vec<InstanceDescriptor>> {
        Err(self.not_supported("list_instances"))
    }

    /// Hourly cost in USD.
    async fn estimate_cost(&self, _request: &InstanceRequest) -> Result<f64> {
        Err(self.not_supported("estimate_cost"))
    }

    async fn available_instance_types(&self) -> Result<Vec<String>> {
        Err(self.not_supported("available_instance_types"))
    }

    async fn available_regions(&self) -> Result<Vec<String>> {
        Err(self.not_supported("available_regions"))
    }

    fn not_supported(&self, operation: &'static str) -> Error {
        Error::NotSupported {
            provider: self.name().to_string(),
            operation,
        }
    }
}

/// Typed access to one authenticated provider on behalf of a single job.
#[derive(Clone)]
pub struct ProviderGateway {
    provider: Arc<dyn CloudProvider>,
    key_file: PathBuf,
}

impl ProviderGateway {
    pub fn new(provider: Arc<dyn CloudProvider>, key_file: PathBuf) -> Self {
        Self { provider, key_file }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn create_instance(
        &self,
        name: &str,
        instance_type: Option<&str>,
        region: Option<&str>,
    ) -> Result<InstanceDescriptor> {
        let request = InstanceRequest {
            name: name.to_string(),
            instance_type: instance_type.map(str::to_string),
            region: region.map(str::to_string),
        };
        self.provider
            .create_instance(&request)
            .await
            .map_err(|err| match err {
                Error::NotSupported { .. } | Error::Authentication { .. } | Error::Provisioning(_) => {
                    err
                }
                other => Error::Provisioning(other.to_string()),
            })
    }

    pub async fn get_status(&self, instance_id: &str) -> Result<InstanceStatus> {
        self.provider.get_instance_status(instance_id).await
    }

    pub async fn get_connection_config(&self, instance_id: &str) -> Result<SshConnectionConfig> {
        let info = self.provider.get_connection_info(instance_id).await?;
        Ok(SshConnectionConfig {
            host: info.cluster_host,
            username: info.username,
            port: info.cluster_port,
            key_file: self.key_file.clone(),
        })
    }

    pub async fn delete_instance(&self, instance_id: &str) -> Result<bool> {
        self.provider.delete_instance(instance_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_provider_states() {
        for ready in ["active", "RUNNING", " ready "] {
            assert_eq!(InstanceState::classify(ready), InstanceState::Ready);
        }
        for fatal in ["failed", "Terminated", "terminating", "error", "deleted"] {
            assert_eq!(InstanceState::classify(fatal), InstanceState::Fatal);
        }
        for pending in ["pending", "booting", "unhealthy", ""] {
            assert_eq!(InstanceState::classify(pending), InstanceState::Pending);
        }
    }

    #[test]
    fn status_display_includes_message() {
        let mut status = InstanceStatus::new("booting");
        assert_eq!(status.to_string(), "booting");
        status.message = Some("waiting for capacity".into());
        assert_eq!(status.to_string(), "booting (waiting for capacity)");
    }
}
