//! Error types for the Prometheus to webservice forwarder.
//!
//! This module defines typed errors for the different components of the
//! application, providing better error categorization and enabling specific
//! error handling strategies.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable parsing failed
    #[error("failed to parse environment variables: {0}")]
    EnvParse(String),

    /// Scrape configuration file could not be read
    #[error("failed to read configuration file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// Scrape configuration file is not valid YAML
    #[error("failed to parse configuration file '{path}': {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
}

/// Errors while resolving a scrape endpoint descriptor.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Ambient service account material could not be read
    #[error("failed to read service account file: {0}")]
    Io(#[from] std::io::Error),

    /// The referenced endpoint secret could not be fetched
    #[error(transparent)]
    Store(#[from] SecretError),

    /// The endpoint secret exists but lacks a required entry
    #[error("endpoint secret is missing required key '{0}'")]
    MissingKey(String),
}

/// Errors reported by the secret store.
#[derive(Error, Debug)]
pub enum SecretError {
    /// The secret does not exist
    #[error("secret {namespace}/{name} not found")]
    NotFound { name: String, namespace: String },

    /// The ambient identity may not read the secret
    #[error("access denied reading secret {namespace}/{name}")]
    AccessDenied { name: String, namespace: String },

    /// The store returned an unexpected status
    #[error("secret store returned status {code}: {message}")]
    Upstream { code: u16, message: String },

    /// The request to the store failed at the transport level
    #[error("secret store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The secret payload could not be decoded
    #[error("failed to decode secret payload: {0}")]
    Decode(String),
}

/// Errors while turning a scraped payload into metric records.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Payload is not valid UTF-8 text
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Payload is not a well-formed metrics exposition
    #[error("failed to parse metrics exposition: {0}")]
    Parse(#[from] std::io::Error),
}

/// Errors while uploading records to the webservice sink.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The upload request failed at the transport level
    #[error("upload request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The sink rejected the batch
    #[error("upload rejected with status {code}: {message}")]
    Rejected { code: u16, message: String },
}

impl ConfigError {
    /// Creates a new environment parse error.
    pub fn env_parse(err: impl std::fmt::Display) -> Self {
        Self::EnvParse(err.to_string())
    }
}

impl SecretError {
    /// Creates a not-found error for a secret reference.
    pub fn not_found(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Creates an access-denied error for a secret reference.
    pub fn access_denied(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::AccessDenied {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}
