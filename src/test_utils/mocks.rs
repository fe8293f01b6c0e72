//! Mock collaborators for testing.

use crate::endpoint::{Endpoint, EndpointSource};
use crate::error::{ResolveError, SecretError};
use crate::secrets::{Secret, SecretStore};
use async_trait::async_trait;
use std::collections::HashMap;

/// Endpoint source that hands out a fixed descriptor.
pub struct StaticEndpointSource {
    endpoint: Endpoint,
}

impl StaticEndpointSource {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Anonymous endpoint pointing at `url`.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self::new(Endpoint {
            server_url: url.into(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl EndpointSource for StaticEndpointSource {
    async fn endpoint(&self) -> Result<Endpoint, ResolveError> {
        Ok(self.endpoint.clone())
    }
}

/// In-memory secret store keyed by (name, namespace).
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: HashMap<(String, String), Secret>,
}

impl MemorySecretStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_secret(name: &str, namespace: &str, secret: Secret) -> Self {
        let mut store = Self::default();
        store.insert(name, namespace, secret);
        store
    }

    pub fn insert(&mut self, name: &str, namespace: &str, secret: Secret) {
        self.secrets
            .insert((name.to_string(), namespace.to_string()), secret);
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<Secret, SecretError> {
        self.secrets
            .get(&(name.to_string(), namespace.to_string()))
            .cloned()
            .ok_or_else(|| SecretError::not_found(name, namespace))
    }
}

/// Builds a [`Secret`] from string entries.
pub fn secret_from_entries(entries: &[(&str, &str)]) -> Secret {
    let data: HashMap<String, Vec<u8>> = entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.as_bytes().to_vec()))
        .collect();
    Secret { data }
}
