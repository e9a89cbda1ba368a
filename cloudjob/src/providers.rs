pub mod ssh_host;

use crate::error::{Error, Result};
use crate::gateway::CloudProvider;
use crate::types::Credentials;
use std::collections::HashMap;
use std::sync::Arc;

pub use ssh_host::SshHostProvider;

type ProviderFactory = Arc<dyn Fn(&Credentials) -> Result<Arc<dyn CloudProvider>> + Send + Sync>;

/// Known providers by name, each with a factory and the credentials to build it from.
#[derive(Clone, Default)]
pub struct ProviderCatalog {
    factories: HashMap<String, ProviderFactory>,
    credentials: HashMap<String, Credentials>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with the providers shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(ssh_host::PROVIDER_NAME, |credentials| {
            let provider = SshHostProvider::from_credentials(credentials)?;
            Ok(Arc::new(provider) as Arc<dyn CloudProvider>)
        });
        catalog
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Credentials) -> Result<Arc<dyn CloudProvider>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn set_credentials(&mut self, name: impl Into<String>, credentials: Credentials) {
        self.credentials.insert(name.into(), credentials);
    }

    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a fresh provider for `name` and authenticate it.
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn CloudProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnsupportedProvider(name.to_string()))?;
        let credentials = self.credentials.get(name).cloned().unwrap_or_default();
        let provider = factory(&credentials)?;
        match provider.authenticate().await {
            Ok(true) => Ok(provider),
            Ok(false) => Err(Error::Authentication {
                provider: name.to_string(),
                reason: "credentials rejected".to_string(),
            }),
            Err(err @ Error::Authentication { .. }) => Err(err),
            Err(err) => Err(Error::Authentication {
                provider: name.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh_credentials() -> Credentials {
        Credentials::from([
            ("host".to_string(), "build-box.internal".to_string()),
            ("username".to_string(), "runner".to_string()),
        ])
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let catalog = ProviderCatalog::with_builtin();
        match catalog.resolve("aws").await {
            Err(Error::UnsupportedProvider(name)) => assert_eq!(name, "aws"),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("resolved a provider that was never registered"),
        }
    }

    #[tokio::test]
    async fn missing_credentials_fail_authentication() {
        let catalog = ProviderCatalog::with_builtin();
        assert!(matches!(
            catalog.resolve("ssh").await,
            Err(Error::Authentication { .. })
        ));
    }

    #[tokio::test]
    async fn builtin_ssh_provider_resolves() {
        let mut catalog = ProviderCatalog::with_builtin();
        catalog.set_credentials("ssh", ssh_credentials());
        let provider = catalog.resolve("ssh").await.expect("resolve ssh provider");
        assert_eq!(provider.name(), "ssh");
        assert_eq!(catalog.provider_names(), vec!["ssh"]);
    }
}
