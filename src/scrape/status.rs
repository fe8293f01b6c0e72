//! Uniform result envelope for authenticated calls.
//!
//! Every request against an exporter endpoint resolves to an
//! [`OperationStatus`], whether the call produced a response or died on the
//! way. The coarse kind and the specific reason are derived from the numeric
//! code alone so the mapping stays deterministic.

use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StatusKind {
    Success,
    Failure,
    #[default]
    #[serde(other)]
    Unknown,
}

impl StatusKind {
    fn is_unknown(&self) -> bool {
        matches!(self, StatusKind::Unknown)
    }
}

/// Machine-readable clarification of a failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StatusReason {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    NotAcceptable,
    MethodNotAllowed,
    Conflict,
    Gone,
    RequestEntityTooLarge,
    UnsupportedMediaType,
    UnprocessableEntity,
    InternalError,
    Invalid,
    ServiceUnavailable,
    #[default]
    #[serde(other)]
    Unknown,
}

impl StatusReason {
    fn is_unknown(&self) -> bool {
        matches!(self, StatusReason::Unknown)
    }
}

/// Status is a return value for calls that don't return other objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Coarse status of the operation, one of Success or Failure.
    #[serde(default, skip_serializing_if = "StatusKind::is_unknown")]
    pub status: StatusKind,
    /// A human-readable description of the status of this operation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// A reason clarifies the HTTP status code but does not override it.
    #[serde(default, skip_serializing_if = "StatusReason::is_unknown")]
    pub reason: StatusReason,
    /// Suggested HTTP return code for this status, 0 if not set.
    #[serde(default)]
    pub code: u16,
    /// Response headers, preserved for codes without a failure mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

fn default_kind() -> String {
    "Status".to_string()
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl OperationStatus {
    /// Builds a status from an HTTP code. Kind and reason follow the code;
    /// the header set is preserved only for codes without a failure mapping.
    pub fn new(
        code: u16,
        headers: Option<HashMap<String, String>>,
        message: Option<String>,
    ) -> Self {
        let mut status = Self {
            kind: default_kind(),
            api_version: default_api_version(),
            status: StatusKind::Failure,
            message: message.unwrap_or_default(),
            reason: StatusReason::Unknown,
            code,
            headers: None,
        };

        status.reason = match code {
            400 => StatusReason::BadRequest,
            401 => StatusReason::Unauthorized,
            403 => StatusReason::Forbidden,
            404 => StatusReason::NotFound,
            405 => StatusReason::MethodNotAllowed,
            406 => StatusReason::NotAcceptable,
            409 => StatusReason::Conflict,
            410 => StatusReason::Gone,
            413 => StatusReason::RequestEntityTooLarge,
            415 => StatusReason::UnsupportedMediaType,
            422 => StatusReason::UnprocessableEntity,
            500 => StatusReason::InternalError,
            501 => StatusReason::Invalid,
            503 => StatusReason::ServiceUnavailable,
            _ => {
                status.status = StatusKind::Success;
                status.headers = headers;
                return status;
            }
        };

        status
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusKind::Success
    }
}

/// Outcome of interpreting a non-2xx response body.
///
/// Upstreams that speak the structured status format are trusted verbatim;
/// anything else is synthesized from the observed HTTP code with the raw
/// bytes kept as the message.
#[derive(Debug)]
pub enum FailureBody {
    Decoded(OperationStatus),
    Synthesized { code: u16, raw: Vec<u8> },
}

impl FailureBody {
    pub fn parse(code: u16, raw: Vec<u8>) -> Self {
        match serde_json::from_slice::<OperationStatus>(&raw) {
            Ok(status) => FailureBody::Decoded(status),
            Err(_) => FailureBody::Synthesized { code, raw },
        }
    }

    pub fn into_status(self, headers: Option<HashMap<String, String>>) -> OperationStatus {
        match self {
            FailureBody::Decoded(status) => status,
            FailureBody::Synthesized { code, raw } => OperationStatus::new(
                code,
                headers,
                Some(String::from_utf8_lossy(&raw).into_owned()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_code_mapping() {
        let cases = [
            (400, StatusReason::BadRequest),
            (401, StatusReason::Unauthorized),
            (403, StatusReason::Forbidden),
            (404, StatusReason::NotFound),
            (405, StatusReason::MethodNotAllowed),
            (406, StatusReason::NotAcceptable),
            (409, StatusReason::Conflict),
            (410, StatusReason::Gone),
            (413, StatusReason::RequestEntityTooLarge),
            (415, StatusReason::UnsupportedMediaType),
            (422, StatusReason::UnprocessableEntity),
            (500, StatusReason::InternalError),
            (501, StatusReason::Invalid),
            (503, StatusReason::ServiceUnavailable),
        ];

        for (code, reason) in cases {
            let status = OperationStatus::new(code, None, None);
            assert_eq!(status.status, StatusKind::Failure, "code {code}");
            assert_eq!(status.reason, reason, "code {code}");
            assert_eq!(status.code, code);
        }
    }

    #[test]
    fn test_unmapped_codes_are_success_with_headers() {
        let mut headers = HashMap::new();
        headers.insert("location".to_string(), "/elsewhere".to_string());

        for code in [200u16, 204, 302, 402, 408, 429] {
            let status = OperationStatus::new(code, Some(headers.clone()), None);
            assert_eq!(status.status, StatusKind::Success, "code {code}");
            assert_eq!(status.reason, StatusReason::Unknown, "code {code}");
            assert_eq!(status.headers.as_ref(), Some(&headers), "code {code}");
        }
    }

    #[test]
    fn test_failure_codes_drop_headers() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());

        let status = OperationStatus::new(404, Some(headers), None);
        assert!(status.headers.is_none());
    }

    #[test]
    fn test_kind_and_reason_are_functions_of_code() {
        let a = OperationStatus::new(503, None, Some("first".to_string()));
        let b = OperationStatus::new(503, None, Some("second".to_string()));
        assert_eq!(a.status, b.status);
        assert_eq!(a.reason, b.reason);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let original = OperationStatus::new(404, None, Some("no such resource".to_string()));
        let encoded = serde_json::to_vec(&original).unwrap();

        match FailureBody::parse(404, encoded) {
            FailureBody::Decoded(decoded) => {
                assert_eq!(decoded.code, original.code);
                assert_eq!(decoded.reason, original.reason);
                assert_eq!(decoded.message, original.message);
                assert_eq!(decoded.status, original.status);
            }
            FailureBody::Synthesized { .. } => panic!("structured body must decode"),
        }
    }

    #[test]
    fn test_parse_unstructured_body_synthesizes() {
        let body = FailureBody::parse(404, b"there is nothing here".to_vec());
        assert!(matches!(body, FailureBody::Synthesized { code: 404, .. }));

        let status = body.into_status(None);
        assert_eq!(status.code, 404);
        assert_eq!(status.reason, StatusReason::NotFound);
        assert_eq!(status.status, StatusKind::Failure);
        assert_eq!(status.message, "there is nothing here");
    }

    #[test]
    fn test_parse_structured_body_is_verbatim() {
        let raw = br#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"quota exhausted","reason":"Forbidden","code":403}"#;
        let body = FailureBody::parse(500, raw.to_vec());

        match body {
            FailureBody::Decoded(status) => {
                // The upstream's self-reported code wins over the HTTP code.
                assert_eq!(status.code, 403);
                assert_eq!(status.reason, StatusReason::Forbidden);
                assert_eq!(status.message, "quota exhausted");
            }
            FailureBody::Synthesized { .. } => panic!("structured body must decode"),
        }
    }

    #[test]
    fn test_decode_unknown_reason_string() {
        let raw = br#"{"status":"Failure","reason":"SomethingNovel","code":418}"#;
        match FailureBody::parse(418, raw.to_vec()) {
            FailureBody::Decoded(status) => {
                assert_eq!(status.reason, StatusReason::Unknown);
                assert_eq!(status.code, 418);
            }
            FailureBody::Synthesized { .. } => panic!("structured body must decode"),
        }
    }

    #[test]
    fn test_serialized_reason_uses_table_names() {
        let status = OperationStatus::new(413, None, None);
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["reason"], "RequestEntityTooLarge");
        assert_eq!(value["status"], "Failure");
        assert_eq!(value["kind"], "Status");
        assert_eq!(value["apiVersion"], "v1");
    }
}
