//! Scrape endpoint resolution.
//!
//! An [`Endpoint`] describes where to reach the exporter and how to prove
//! who we are. It is resolved fresh for every request because the backing
//! credentials may rotate between polling cycles; nothing here is cached.

use crate::error::ResolveError;
use crate::secrets::{ObjectRef, Secret, SecretStore};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// In-cluster API server address used when no endpoint reference is
/// configured.
pub const AMBIENT_SERVER_URL: &str = "https://kubernetes.default.svc";

/// Well-known path of the ambient service account token.
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Well-known path of the ambient service account trust bundle.
pub const SERVICE_ACCOUNT_CA_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Credentials for canonical request signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub service: String,
}

/// Resolved connection descriptor for one scrape target.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    pub server_url: String,
    pub token: Option<String>,
    pub ca_certificate: Option<Vec<u8>>,
    pub insecure_skip_verify: bool,
    pub aws: Option<AwsCredentials>,
}

/// The single authentication strategy active for an endpoint.
///
/// Signing credentials win over a bearer token when a secret carries both,
/// so exactly one strategy applies to any given request.
#[derive(Debug)]
pub enum AuthStrategy<'a> {
    Aws(&'a AwsCredentials),
    Bearer(&'a str),
    Anonymous,
}

impl Endpoint {
    pub fn has_aws_auth(&self) -> bool {
        self.aws.is_some()
    }

    pub fn auth(&self) -> AuthStrategy<'_> {
        if let Some(aws) = &self.aws {
            AuthStrategy::Aws(aws)
        } else if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            AuthStrategy::Bearer(token)
        } else {
            AuthStrategy::Anonymous
        }
    }
}

/// Produces a fresh [`Endpoint`] on demand.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    async fn endpoint(&self) -> Result<Endpoint, ResolveError>;
}

/// Resolves an endpoint either from a referenced secret or, when no
/// reference is configured, from the ambient service account identity.
pub struct Resolver {
    store: Arc<dyn SecretStore>,
    reference: Option<ObjectRef>,
}

impl Resolver {
    pub fn new(store: Arc<dyn SecretStore>, reference: Option<ObjectRef>) -> Self {
        Self { store, reference }
    }
}

#[async_trait]
impl EndpointSource for Resolver {
    async fn endpoint(&self) -> Result<Endpoint, ResolveError> {
        match &self.reference {
            None => ambient_endpoint(),
            Some(reference) => {
                let secret = self
                    .store
                    .get(&reference.name, &reference.namespace)
                    .await?;
                endpoint_from_secret(&secret)
            }
        }
    }
}

fn ambient_endpoint() -> Result<Endpoint, ResolveError> {
    ambient_endpoint_from(
        Path::new(SERVICE_ACCOUNT_TOKEN_PATH),
        Path::new(SERVICE_ACCOUNT_CA_PATH),
    )
}

fn ambient_endpoint_from(token_path: &Path, ca_path: &Path) -> Result<Endpoint, ResolveError> {
    let token = std::fs::read_to_string(token_path)?;
    let ca_certificate = std::fs::read(ca_path)?;
    Ok(Endpoint {
        server_url: AMBIENT_SERVER_URL.to_string(),
        token: Some(token.trim().to_string()),
        ca_certificate: Some(ca_certificate),
        // Ambient identity is implicitly trusted within its own platform.
        insecure_skip_verify: true,
        aws: None,
    })
}

fn endpoint_from_secret(secret: &Secret) -> Result<Endpoint, ResolveError> {
    let server_url = secret
        .string_value("server-url")
        .ok_or_else(|| ResolveError::MissingKey("server-url".to_string()))?;

    let aws = match (
        secret.string_value("aws-access-key-id"),
        secret.string_value("aws-secret-access-key"),
        secret.string_value("aws-region"),
        secret.string_value("aws-service"),
    ) {
        (Some(access_key), Some(secret_key), Some(region), Some(service)) => {
            Some(AwsCredentials {
                access_key,
                secret_key,
                region,
                service,
            })
        }
        _ => None,
    };

    Ok(Endpoint {
        server_url,
        token: secret.string_value("token"),
        ca_certificate: secret.data.get("certificate-authority-data").cloned(),
        insecure_skip_verify: secret
            .string_value("insecure")
            .map(|v| v.trim() == "true")
            .unwrap_or(false),
        aws,
    })
}
