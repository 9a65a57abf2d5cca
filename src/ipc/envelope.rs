//! Request and response envelopes.
//!
//! # Wire Shapes
//! ```text
//! request:  { "requestId", "type": "HTTP", "method", "path", "headers", "body": null }
//! success:  { "requestId", "status", "headers", "data" }   (data = base64 body)
//! failure:  { "requestId", "status", "error" }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use axum::http::{Method, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors produced while encoding, decoding or validating envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Envelope has no requestId")]
    MissingRequestId,

    #[error("Response envelope must carry exactly one of data or error")]
    AmbiguousPayload,

    #[error("Response data is not valid base64: {0}")]
    InvalidData(#[from] base64::DecodeError),

    #[error("Invalid HTTP method: {0:?}")]
    InvalidMethod(String),

    #[error("Envelope path must start with '/': {0:?}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque token correlating a dispatched request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh, globally unique request ID (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One header name may carry a single value or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValues {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValues {
    pub fn as_slice(&self) -> &[String] {
        match self {
            HeaderValues::Single(value) => std::slice::from_ref(value),
            HeaderValues::Multiple(values) => values,
        }
    }

    /// Append another value, promoting a single value to a list.
    pub fn push(&mut self, value: String) {
        match self {
            HeaderValues::Single(first) => {
                let first = std::mem::take(first);
                *self = HeaderValues::Multiple(vec![first, value]);
            }
            HeaderValues::Multiple(values) => values.push(value),
        }
    }
}

/// Lowercase header name → value(s).
pub type Headers = BTreeMap<String, HeaderValues>;

/// Envelope type tag. Only plain HTTP requests exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "HTTP")]
    Http,
}

/// A client request handed from the front process to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub request_id: RequestId,

    #[serde(rename = "type")]
    pub kind: MessageKind,

    pub method: String,

    /// Path including the query string, e.g. `/api/x?y=1`.
    pub path: String,

    #[serde(default)]
    pub headers: Headers,

    /// Always `None`: request bodies are not forwarded to upstreams.
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestEnvelope {
    pub fn new(request_id: RequestId, method: &Method, path: impl Into<String>, headers: Headers) -> Self {
        Self {
            request_id,
            kind: MessageKind::Http,
            method: method.as_str().to_string(),
            path: path.into(),
            headers,
            body: None,
        }
    }

    /// Check the parts serde cannot: method token and path shape.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if !self.path.starts_with('/') {
            return Err(EnvelopeError::InvalidPath(self.path.clone()));
        }
        self.http_method()?;
        Ok(())
    }

    pub fn http_method(&self) -> Result<Method, EnvelopeError> {
        Method::from_bytes(self.method.as_bytes())
            .map_err(|_| EnvelopeError::InvalidMethod(self.method.clone()))
    }
}

/// Result of handling one request inside a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        status: u16,
        headers: Headers,
        data: Vec<u8>,
    },
    Failure {
        status: u16,
        error: String,
    },
}

impl Outcome {
    pub fn failure(status: StatusCode, error: impl Into<String>) -> Self {
        Outcome::Failure {
            status: status.as_u16(),
            error: error.into(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Outcome::Success { status, .. } | Outcome::Failure { status, .. } => *status,
        }
    }
}

/// A worker's answer to exactly one [`RequestEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResponseWire", into = "ResponseWire")]
pub struct ResponseEnvelope {
    pub request_id: RequestId,
    pub outcome: Outcome,
}

impl ResponseEnvelope {
    pub fn new(request_id: RequestId, outcome: Outcome) -> Self {
        Self { request_id, outcome }
    }
}

/// Flat wire representation; exactly one of `data`/`error` is present.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseWire {
    request_id: Option<RequestId>,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<Headers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TryFrom<ResponseWire> for ResponseEnvelope {
    type Error = EnvelopeError;

    fn try_from(wire: ResponseWire) -> Result<Self, Self::Error> {
        let request_id = wire.request_id.ok_or(EnvelopeError::MissingRequestId)?;
        let outcome = match (wire.data, wire.error) {
            (Some(data), None) => Outcome::Success {
                status: wire.status,
                headers: wire.headers.unwrap_or_default(),
                data: STANDARD.decode(data)?,
            },
            (None, Some(error)) => Outcome::Failure {
                status: wire.status,
                error,
            },
            _ => return Err(EnvelopeError::AmbiguousPayload),
        };
        Ok(Self { request_id, outcome })
    }
}

impl From<ResponseEnvelope> for ResponseWire {
    fn from(envelope: ResponseEnvelope) -> Self {
        let request_id = Some(envelope.request_id);
        match envelope.outcome {
            Outcome::Success { status, headers, data } => ResponseWire {
                request_id,
                status,
                headers: Some(headers),
                data: Some(STANDARD.encode(data)),
                error: None,
            },
            Outcome::Failure { status, error } => ResponseWire {
                request_id,
                status,
                headers: None,
                data: None,
                error: Some(error),
            },
        }
    }
}
