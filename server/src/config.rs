use clap::Parser;
use cloudjob::providers::ProviderCatalog;
use cloudjob::types::Credentials;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::{fs, io};
use tonic::transport::{Certificate, Identity, ServerTlsConfig};

/// Serve cloudjob over gRPC
#[derive(Debug, Parser)]
#[clap(name = "cloudjob-server", version)]
pub struct ServerArgs {
    /// Address to listen on
    #[clap(long, env = "CLOUDJOB_LISTEN", default_value = "[::1]:50051")]
    pub listen: SocketAddr,

    /// JSON file mapping each provider name to its credentials
    #[clap(long, env = "CLOUDJOB_PROVIDERS")]
    pub providers: Option<PathBuf>,

    /// Capacity of the job coordinator's inbox
    #[clap(long, default_value = "1024")]
    pub message_capacity: usize,

    /// Most jobs allowed to hold an instance at once. Others wait as pending. Unlimited if unset
    #[clap(long, env = "CLOUDJOB_MAX_ACTIVE_JOBS")]
    pub max_active_jobs: Option<usize>,

    /// Server certificate (PEM). Enables TLS together with --tls-key
    #[clap(long)]
    pub tls_cert: Option<PathBuf>,

    /// Server private key (PEM)
    #[clap(long)]
    pub tls_key: Option<PathBuf>,

    /// CA certificate (PEM) used to require and verify client certificates
    #[clap(long)]
    pub client_ca: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid providers file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("--tls-cert and --tls-key must be given together")]
    IncompleteTls,
    #[error("--client-ca requires --tls-cert and --tls-key")]
    ClientCaWithoutTls,
    #[error("--{0} must be at least 1")]
    Zero(&'static str),
}

impl ServerArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.message_capacity == 0 {
            return Err(ConfigError::Zero("message-capacity"));
        }
        if self.max_active_jobs == Some(0) {
            return Err(ConfigError::Zero("max-active-jobs"));
        }
        Ok(())
    }

    pub fn provider_catalog(&self) -> Result<ProviderCatalog, ConfigError> {
        let credentials = match &self.providers {
            Some(path) => load_credentials(path)?,
            None => HashMap::new(),
        };
        Ok(build_catalog(credentials))
    }

    pub fn tls_config(&self) -> Result<Option<ServerTlsConfig>, ConfigError> {
        let (cert, key) = match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => (read(cert)?, read(key)?),
            (None, None) if self.client_ca.is_some() => return Err(ConfigError::ClientCaWithoutTls),
            (None, None) => return Ok(None),
            _ => return Err(ConfigError::IncompleteTls),
        };
        let mut tls = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));
        if let Some(ca) = &self.client_ca {
            tls = tls.client_ca_root(Certificate::from_pem(read(ca)?));
        }
        Ok(Some(tls))
    }
}

fn read(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_credentials(path: &Path) -> Result<HashMap<String, Credentials>, ConfigError> {
    let contents = read(path)?;
    serde_json::from_slice(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn build_catalog(credentials: HashMap<String, Credentials>) -> ProviderCatalog {
    let mut catalog = ProviderCatalog::with_builtin();
    let known: Vec<String> = catalog
        .provider_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    for (name, creds) in credentials {
        if !known.contains(&name) {
            tracing::warn!(provider = %name, "credentials given for a provider that is not available");
        }
        catalog.set_credentials(name, creds);
    }
    catalog
}
