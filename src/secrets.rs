//! Secret store access.
//!
//! Credentials (exporter endpoints, database passwords) live in the
//! platform's secret store and may rotate at any time, so lookups are
//! performed fresh on every cycle and nothing is cached here.

use crate::endpoint::SERVICE_ACCOUNT_TOKEN_PATH;
use crate::error::SecretError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_derive::Deserialize;
use std::collections::HashMap;

/// Reference to a named secret in a namespace.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub name: String,
    pub namespace: String,
}

/// Reference to a single entry inside a named secret.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SecretKeyRef {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

/// A fetched secret with its entries already base64-decoded.
#[derive(Debug, Clone, Default)]
pub struct Secret {
    pub data: HashMap<String, Vec<u8>>,
}

impl Secret {
    /// Returns an entry decoded as a UTF-8 string, if present.
    pub fn string_value(&self, key: &str) -> Option<String> {
        self.data
            .get(key)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}

/// Lookup interface for the platform secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str, namespace: &str) -> Result<Secret, SecretError>;
}

/// Secret store backed by the platform API server, authenticated with the
/// ambient service account identity.
pub struct ApiServerSecretStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

/// Wire shape of a secret as served by the API server. Entry values are
/// base64-encoded.
#[derive(Deserialize)]
struct SecretPayload {
    #[serde(default)]
    data: HashMap<String, String>,
}

impl ApiServerSecretStore {
    /// Creates a store talking to `base_url` with the given bearer token.
    ///
    /// The in-cluster API server is addressed by its service DNS name and
    /// trusted implicitly, matching the ambient endpoint descriptor.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, SecretError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    /// Creates a store from the ambient service account identity.
    pub fn from_ambient() -> Result<Self> {
        let token = std::fs::read_to_string(SERVICE_ACCOUNT_TOKEN_PATH)
            .with_context(|| format!("failed to read {}", SERVICE_ACCOUNT_TOKEN_PATH))?;
        Self::new(crate::endpoint::AMBIENT_SERVER_URL, token.trim())
            .context("failed to build secret store client")
    }
}

#[async_trait]
impl SecretStore for ApiServerSecretStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<Secret, SecretError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/secrets/{}",
            self.base_url.trim_end_matches('/'),
            namespace,
            name
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let code = response.status().as_u16();
        match code {
            404 => return Err(SecretError::not_found(name, namespace)),
            401 | 403 => return Err(SecretError::access_denied(name, namespace)),
            200..=299 => {}
            _ => {
                let message = response.text().await.unwrap_or_default();
                return Err(SecretError::Upstream { code, message });
            }
        }

        let body = response.text().await?;
        let payload: SecretPayload =
            serde_json::from_str(&body).map_err(|err| SecretError::decode(err))?;

        let mut data = HashMap::with_capacity(payload.data.len());
        for (key, value) in payload.data {
            let decoded = STANDARD
                .decode(value)
                .map_err(|err| SecretError::decode(err))?;
            data.insert(key, decoded);
        }
        Ok(Secret { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> ApiServerSecretStore {
        ApiServerSecretStore::new(server.uri(), "test-token").unwrap()
    }

    mod succeeds {
        use super::*;

        #[tokio::test]
        async fn test_get_decodes_entries() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/namespaces/monitoring/secrets/db-credentials"))
                .and(header("authorization", "Bearer test-token"))
                .respond_with(ResponseTemplate::new(200).set_body_string(
                    r#"{"kind":"Secret","data":{"password":"cGFzc3dvcmQ=","username":"c2NyYXBlcg=="}}"#,
                ))
                .expect(1)
                .mount(&server)
                .await;

            let store = store_for(&server);
            let secret = store.get("db-credentials", "monitoring").await.unwrap();

            assert_eq!(secret.data.get("password").unwrap(), b"password");
            assert_eq!(secret.string_value("username").as_deref(), Some("scraper"));
        }

        #[tokio::test]
        async fn test_get_empty_data() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/namespaces/monitoring/secrets/empty"))
                .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"kind":"Secret"}"#))
                .mount(&server)
                .await;

            let store = store_for(&server);
            let secret = store.get("empty", "monitoring").await.unwrap();
            assert!(secret.data.is_empty());
        }
    }

    mod fails {
        use super::*;

        #[tokio::test]
        async fn test_get_not_found() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/namespaces/monitoring/secrets/missing"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            let store = store_for(&server);
            let err = store.get("missing", "monitoring").await.unwrap_err();
            assert!(matches!(err, SecretError::NotFound { .. }));
        }

        #[tokio::test]
        async fn test_get_access_denied() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/namespaces/monitoring/secrets/forbidden"))
                .respond_with(ResponseTemplate::new(403))
                .mount(&server)
                .await;

            let store = store_for(&server);
            let err = store.get("forbidden", "monitoring").await.unwrap_err();
            assert!(matches!(err, SecretError::AccessDenied { .. }));
        }

        #[tokio::test]
        async fn test_get_upstream_error() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/namespaces/monitoring/secrets/broken"))
                .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
                .mount(&server)
                .await;

            let store = store_for(&server);
            let err = store.get("broken", "monitoring").await.unwrap_err();
            match err {
                SecretError::Upstream { code, message } => {
                    assert_eq!(code, 500);
                    assert_eq!(message, "boom");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_get_invalid_base64() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/namespaces/monitoring/secrets/garbled"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(r#"{"data":{"password":"%%%not-base64%%%"}}"#),
                )
                .mount(&server)
                .await;

            let store = store_for(&server);
            let err = store.get("garbled", "monitoring").await.unwrap_err();
            assert!(matches!(err, SecretError::Decode(_)));
        }

        #[tokio::test]
        async fn test_get_invalid_json() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/namespaces/monitoring/secrets/notjson"))
                .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
                .mount(&server)
                .await;

            let store = store_for(&server);
            let err = store.get("notjson", "monitoring").await.unwrap_err();
            assert!(matches!(err, SecretError::Decode(_)));
        }
    }
}
