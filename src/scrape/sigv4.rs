//! Canonical request signing (AWS Signature Version 4).
//!
//! Some exporter endpoints sit behind managed services that require signed
//! requests instead of a bearer token. The signature covers the method,
//! path, query string, header set and payload, so header normalization and
//! ordering here must be deterministic.

use crate::endpoint::AwsCredentials;
use chrono::{DateTime, Utc};
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Produces the full signed header set for one request: the signing
/// headers (`host`, `x-amz-date`, `x-amz-content-sha256`), the normalized
/// caller headers, and the resulting `authorization` header.
///
/// Keys are lower-cased and values trimmed before they enter the canonical
/// request, and the canonical form orders headers by key, so the same
/// inputs always yield the same signature.
pub fn sign_request(
    credentials: &AwsCredentials,
    method: &str,
    url: &Url,
    extra_headers: &[(String, String)],
    payload: &[u8],
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let payload_hash = hex::encode(Sha256::digest(payload));

    let host = match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
        None => url.host_str().unwrap_or_default().to_string(),
    };

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    headers.insert("host".to_string(), host);
    headers.insert("x-amz-date".to_string(), amz_date.clone());
    headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
    for (key, value) in extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let canonical_headers: String = headers
        .iter()
        .map(|(key, value)| format!("{key}:{value}\n"))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical_uri = if url.path().is_empty() { "/" } else { url.path() };
    let canonical_request = [
        method,
        canonical_uri,
        &canonical_query_string(url),
        &canonical_headers,
        &signed_headers,
        &payload_hash,
    ]
    .join("\n");

    let scope = format!(
        "{}/{}/{}/aws4_request",
        date, credentials.region, credentials.service
    );
    let string_to_sign = [
        ALGORITHM,
        amz_date.as_str(),
        scope.as_str(),
        &hex::encode(Sha256::digest(canonical_request.as_bytes())),
    ]
    .join("\n");

    let mut key = hmac_sha256(
        format!("AWS4{}", credentials.secret_key).as_bytes(),
        date.as_bytes(),
    );
    key = hmac_sha256(&key, credentials.region.as_bytes());
    key = hmac_sha256(&key, credentials.service.as_bytes());
    key = hmac_sha256(&key, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key, scope, signed_headers, signature
    );

    let mut out: Vec<(String, String)> = headers.into_iter().collect();
    out.push(("authorization".to_string(), authorization));
    out
}

fn canonical_query_string(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", uri_encode(key), uri_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

// Unreserved characters per the signing specification: alphanumerics plus
// "-", "_", ".", "~". Everything else is percent-encoded, uppercase hex.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    const BLOCK_SIZE: usize = 64;

    let mut block = [0u8; BLOCK_SIZE];
    if key.len() > BLOCK_SIZE {
        let digest = Sha256::digest(key);
        block[..digest.len()].copy_from_slice(&digest);
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha256::new();
    inner.update(block.map(|b| b ^ 0x36));
    inner.update(data);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(block.map(|b| b ^ 0x5c));
    outer.update(inner_hash);
    outer.finalize().into()
}
