//! Envelope and Inner Request/Response shapes (JSON + base64).
//!
//! `Envelope.msg` stays base64 text after decode; the inner payload shape
//! depends on `sub` and is parsed only when asked for.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PathlinkError, Result};
use crate::protocol::frame::encode_frame;

/// Correlation id carried in `request` / `request_id`.
pub type RequestId = i64;

/// Well-known subject codes.
pub mod subject {
    /// Client registration (client -> coordinator).
    pub const REG: &str = "REG";
    /// Registration acknowledgement.
    pub const REG_RESPONSE: &str = "REG_RESPONSE";
    /// Forwarded request for a registered path.
    pub const REQUEST: &str = "REQUEST";
    /// Reply to a `REQUEST`.
    pub const RESPONSE: &str = "RESPONSE";
    /// Failure reply to a `REQUEST`.
    pub const ERROR: &str = "ERROR";
    /// Coordinator notification.
    pub const TASK: &str = "TASK";
}

pub const REGISTER_PATH: &str = "/register";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const APPLICATION_JSON: &str = "application/json";

/// Outer message exchanged on the wire, one per frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Subject/type code (e.g. "REG").
    pub sub: String,
    /// Subject-specific payload, base64 text.
    pub msg: String,
    /// Correlation id.
    pub request: RequestId,
}

impl Envelope {
    /// Build an envelope around raw payload bytes.
    pub fn new(sub: impl Into<String>, payload: &[u8], request: RequestId) -> Self {
        Self {
            sub: sub.into(),
            msg: STANDARD.encode(payload),
            request,
        }
    }

    /// Build an envelope around a JSON-serializable payload.
    pub fn with_json<T: Serialize>(sub: impl Into<String>, payload: &T, request: RequestId) -> Result<Self> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| PathlinkError::Internal(format!("encode payload failed: {e}")))?;
        Ok(Self::new(sub, &bytes, request))
    }

    /// Parse one frame payload. `sub`, `msg` and `request` are all required.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| PathlinkError::MalformedEnvelope(format!("invalid envelope json: {e}")))
    }

    /// Deterministic JSON serialization (field order is declaration order).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| PathlinkError::Internal(format!("encode envelope failed: {e}")))
    }

    /// Serialize and length-prefix.
    pub fn to_frame(&self) -> Result<Bytes> {
        encode_frame(&self.to_bytes()?)
    }

    /// Base64-decode `msg`.
    pub fn msg_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.msg)
            .map_err(|e| PathlinkError::MalformedEnvelope(format!("msg is not base64: {e}")))
    }

    /// Base64-decode `msg` and parse it as JSON of type `T`.
    pub fn msg_json<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = self.msg_bytes()?;
        serde_json::from_slice(&raw)
            .map_err(|e| PathlinkError::MalformedEnvelope(format!("invalid {} payload: {e}", self.sub)))
    }

    /// Inner request carried by `REG` / `REQUEST`.
    pub fn inner_request(&self) -> Result<InnerRequest> {
        self.msg_json()
    }
}

/// HTTP-like request carried inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerRequest {
    pub request_id: RequestId,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base64 text.
    #[serde(default)]
    pub body: String,
}

impl InnerRequest {
    pub fn new(request_id: RequestId, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id,
            method: method.into(),
            path: path.into(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = STANDARD.encode(body);
        self
    }

    /// Wrap as an envelope of subject `sub`, correlated by `request_id`.
    pub fn into_envelope(self, sub: &str) -> Result<Envelope> {
        Envelope::with_json(sub, &self, self.request_id)
    }

    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.body)
            .map_err(|e| PathlinkError::MalformedEnvelope(format!("body is not base64: {e}")))
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = self.body_bytes()?;
        serde_json::from_slice(&raw)
            .map_err(|e| PathlinkError::MalformedEnvelope(format!("invalid request body: {e}")))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Reply payload of a `RESPONSE` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerResponse {
    pub request_id: RequestId,
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base64 text.
    #[serde(default)]
    pub body: String,
}

impl InnerResponse {
    pub fn new(request_id: RequestId, status_code: u16, body: &[u8]) -> Self {
        Self {
            request_id,
            status_code,
            headers: BTreeMap::new(),
            body: STANDARD.encode(body),
        }
    }

    pub fn json<T: Serialize>(request_id: RequestId, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| PathlinkError::Handler(format!("encode response body failed: {e}")))?;
        Ok(Self::new(request_id, 200, &body).with_header(CONTENT_TYPE, APPLICATION_JSON))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.body)
            .map_err(|e| PathlinkError::MalformedEnvelope(format!("body is not base64: {e}")))
    }

    /// Wrap as a `RESPONSE` envelope.
    pub fn into_envelope(self) -> Result<Envelope> {
        Envelope::with_json(subject::RESPONSE, &self, self.request_id)
    }
}

/// Payload of an `ERROR` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub request_id: RequestId,
    pub code: String,
    pub message: String,
}

impl ErrorReply {
    pub fn from_error(request_id: RequestId, err: &PathlinkError) -> Self {
        Self {
            request_id,
            code: err.kind().as_str().to_string(),
            message: err.to_string(),
        }
    }

    pub fn into_envelope(self) -> Result<Envelope> {
        Envelope::with_json(subject::ERROR, &self, self.request_id)
    }
}

/// Body of the registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBody {
    pub client_id: String,
    pub paths: Vec<String>,
}

/// Build the `REG` envelope announcing `paths` for `client_id`.
pub fn build_registration(client_id: &str, paths: &[String], request_id: RequestId) -> Result<Envelope> {
    let body = RegisterBody {
        client_id: client_id.to_string(),
        paths: paths.to_vec(),
    };
    let body = serde_json::to_vec(&body)
        .map_err(|e| PathlinkError::Internal(format!("encode register body failed: {e}")))?;

    InnerRequest::new(request_id, "POST", REGISTER_PATH)
        .with_header(CONTENT_TYPE, APPLICATION_JSON)
        .with_body(&body)
        .into_envelope(subject::REG)
}

/// Monotonic correlation id source, one per session.
#[derive(Debug)]
pub struct RequestIdGen {
    next: AtomicI64,
}

impl Default for RequestIdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdGen {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    pub fn next_id(&self) -> RequestId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
