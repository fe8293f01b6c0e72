//! Authenticated request execution.
//!
//! [`Executor::execute`] issues one call against a resolved endpoint,
//! applies the signing strategy the descriptor asks for, retries transient
//! transport failures with capped backoff, and folds the outcome into an
//! [`OperationStatus`]. Success bodies are streamed to a caller-supplied
//! consumer; failure bodies are captured only up to a diagnostic limit.

use crate::config::ApiConfig;
use crate::endpoint::{AuthStrategy, Endpoint};
use crate::scrape::sigv4;
use crate::scrape::status::{FailureBody, OperationStatus};
use backoff::backoff::Backoff;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Method, Url};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Maximum bytes of a failure response body kept for diagnostics.
pub const MAX_UNSTRUCTURED_RESPONSE_TEXT_BYTES: usize = 2048;

/// Fixed header carrying the trace correlation id on every outbound call.
pub const TRACE_ID_HEADER: &str = "x-forwarder-trace-id";

static TRACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Trace id for the current execution context: the active tracing span when
/// one exists, a process-unique counter otherwise.
fn trace_id() -> String {
    match tracing::Span::current().id() {
        Some(id) => format!("{:016x}", id.into_u64()),
        None => format!("{:016x}", TRACE_COUNTER.fetch_add(1, Ordering::Relaxed)),
    }
}

/// One call to issue against an endpoint. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub path: String,
    pub verb: String,
    /// Extra request headers as "key: value" strings.
    pub headers: Vec<String>,
    pub payload: Option<String>,
}

impl From<&ApiConfig> for RequestSpec {
    fn from(api: &ApiConfig) -> Self {
        Self {
            path: api.path.clone(),
            verb: api.verb.clone(),
            headers: api.headers.clone(),
            payload: api.payload.clone(),
        }
    }
}

/// Bounded retry behavior for transient transport failures.
///
/// The attempt cap keeps this layer from retrying forever; waiting out a
/// persistently unavailable upstream is the poller's job, not the
/// executor's.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Consumer for a successful response body, fed chunk by chunk.
pub type BodyConsumer<'a> = &'a mut (dyn FnMut(&[u8]) -> anyhow::Result<()> + Send);

/// Issues authenticated calls against resolved endpoints.
pub struct Executor {
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Executes one call and classifies the outcome.
    ///
    /// A supplied `consumer` receives the body of a 2xx response; its error
    /// aborts the call with an internal-error status. Without a consumer a
    /// 2xx response maps to a no-content status.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        spec: &RequestSpec,
        consumer: Option<BodyConsumer<'_>>,
    ) -> OperationStatus {
        let target = {
            let base = endpoint.server_url.trim_end_matches('/');
            if spec.path.is_empty() {
                base.to_string()
            } else {
                format!("{}/{}", base, spec.path.trim_start_matches('/'))
            }
        };
        let url = match Url::parse(&target) {
            Ok(url) => url,
            Err(err) => {
                return OperationStatus::new(
                    500,
                    None,
                    Some(format!("invalid target URL '{target}': {err}")),
                )
            }
        };

        let method = match Method::from_bytes(spec.verb.as_bytes()) {
            Ok(method) => method,
            Err(err) => {
                return OperationStatus::new(
                    500,
                    None,
                    Some(format!("invalid request verb '{}': {err}", spec.verb)),
                )
            }
        };

        let client = match self.client_for(endpoint) {
            Ok(client) => client,
            Err(err) => {
                return OperationStatus::new(
                    500,
                    None,
                    Some(format!("unable to create HTTP client for endpoint: {err}")),
                )
            }
        };

        let payload = spec.payload.clone().filter(|p| !p.is_empty());
        let bearer = match endpoint.auth() {
            AuthStrategy::Bearer(token) => Some(token.to_string()),
            _ => None,
        };

        // The signed header set is computed once; retries resend the exact
        // same request.
        let headers = match endpoint.auth() {
            AuthStrategy::Aws(credentials) => {
                let mut pairs = split_header_pairs(&spec.headers);
                pairs.push((TRACE_ID_HEADER.to_string(), trace_id()));
                let signed = sigv4::sign_request(
                    credentials,
                    method.as_str(),
                    &url,
                    &pairs,
                    payload.as_deref().unwrap_or("").as_bytes(),
                    Utc::now(),
                );
                let lines: Vec<String> = signed
                    .iter()
                    .map(|(key, value)| format!("{key}:{value}"))
                    .collect();

                let mut map = HeaderMap::new();
                apply_header_lines(&mut map, &normalize_header_lines(&lines));
                map
            }
            _ => {
                let mut map = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&trace_id()) {
                    map.insert(HeaderName::from_static(TRACE_ID_HEADER), value);
                }
                apply_header_lines(&mut map, &spec.headers);
                map
            }
        };

        let mut backoff = backoff::ExponentialBackoff {
            initial_interval: self.policy.initial_backoff,
            current_interval: self.policy.initial_backoff,
            max_interval: self.policy.max_backoff,
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut attempt = 0u32;

        let response = loop {
            attempt += 1;

            let mut request = client
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(token) = &bearer {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &payload {
                request = request.body(body.clone());
            }

            match request.send().await {
                Ok(response)
                    if response.status().is_server_error()
                        && attempt < self.policy.max_attempts =>
                {
                    let delay = backoff.next_backoff().unwrap_or(self.policy.max_backoff);
                    tracing::warn!(
                        "received status {} from {}, retrying in {:?} (attempt {}/{})",
                        response.status(),
                        url,
                        delay,
                        attempt,
                        self.policy.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => break response,
                Err(err) if is_transient(&err) && attempt < self.policy.max_attempts => {
                    let delay = backoff.next_backoff().unwrap_or(self.policy.max_backoff);
                    tracing::warn!(
                        "request to {} failed: {}, retrying in {:?} (attempt {}/{})",
                        url,
                        err,
                        delay,
                        attempt,
                        self.policy.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return OperationStatus::new(500, None, Some(err.to_string())),
            }
        };

        let code = response.status().as_u16();
        let response_headers = collect_headers(response.headers());

        if !(200..300).contains(&code) {
            let raw = match read_limited(response, MAX_UNSTRUCTURED_RESPONSE_TEXT_BYTES).await {
                Ok(raw) => raw,
                Err(err) => return OperationStatus::new(500, None, Some(err.to_string())),
            };
            return FailureBody::parse(code, raw).into_status(Some(response_headers));
        }

        match consumer {
            Some(consumer) => {
                let mut response = response;
                loop {
                    match response.chunk().await {
                        Ok(Some(chunk)) => {
                            if let Err(err) = consumer(&chunk) {
                                return OperationStatus::new(500, None, Some(err.to_string()));
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            return OperationStatus::new(500, None, Some(err.to_string()))
                        }
                    }
                }
                OperationStatus::new(200, Some(response_headers), None)
            }
            None => OperationStatus::new(204, Some(response_headers), None),
        }
    }

    /// Builds the client for one endpoint. Trust material travels with the
    /// descriptor, so the client is rebuilt whenever resolution changes it.
    fn client_for(&self, endpoint: &Endpoint) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder().timeout(self.policy.request_timeout);
        if let Some(ca) = &endpoint.ca_certificate {
            builder = builder.add_root_certificate(Certificate::from_pem(ca)?);
        }
        if endpoint.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder.build()
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Lower-cases keys, trims keys and values, drops malformed entries and
/// sorts by the full "key:value" string. Applying this twice yields the
/// same list.
pub(crate) fn normalize_header_lines(headers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = headers
        .iter()
        .filter_map(|line| {
            let idx = line.find(':')?;
            if idx == 0 {
                return None;
            }
            Some(format!(
                "{}:{}",
                line[..idx].trim().to_ascii_lowercase(),
                line[idx + 1..].trim()
            ))
        })
        .collect();
    out.sort();
    out
}

fn split_header_pairs(headers: &[String]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|line| {
            let idx = line.find(':')?;
            if idx == 0 {
                return None;
            }
            Some((
                line[..idx].trim().to_string(),
                line[idx + 1..].trim().to_string(),
            ))
        })
        .collect()
}

fn apply_header_lines(map: &mut HeaderMap, lines: &[String]) {
    for line in lines {
        let Some(idx) = line.find(':') else { continue };
        if idx == 0 {
            continue;
        }
        let key = line[..idx].trim();
        let value = line[idx + 1..].trim();
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(name, value);
        }
    }
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(key, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (key.as_str().to_string(), v.to_string()))
        })
        .collect()
}

async fn read_limited(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, reqwest::Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = limit - buf.len();
        if chunk.len() >= remaining {
            buf.extend_from_slice(&chunk[..remaining]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
