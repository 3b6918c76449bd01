//! Responses handed back to the host and the snapshots persisted for them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Status used for synthesized "unavailable" answers.
pub const UNAVAILABLE_STATUS: u16 = 503;

/// How the response relates to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Same-origin response with readable body and headers.
    Basic,
    /// Cross-origin response from an allowed origin.
    Cors,
    /// Produced locally rather than received.
    Synthetic,
}

/// Where the host-facing response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Store,
    OfflineFallback,
    Synthesized,
}

/// A response-shaped value returned for an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub kind: ResponseKind,
    pub source: ResponseSource,
}

impl Response {
    /// A response received from the network.
    pub fn network(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>, kind: ResponseKind) -> Self {
        Self { status, headers, body: body.into(), kind, source: ResponseSource::Network }
    }

    /// Synthesized 503 used when neither network nor store can answer.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            status: UNAVAILABLE_STATUS,
            headers: vec![("content-type".into(), "text/plain; charset=utf-8".into())],
            body: Bytes::from(format!("resource unavailable: {reason}")),
            kind: ResponseKind::Synthetic,
            source: ResponseSource::Synthesized,
        }
    }

    /// `true` only for exactly 200, the sole status that gets stored.
    pub fn is_storable(&self) -> bool {
        self.status == 200
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Immutable capture of a response at the moment it was stored.
///
/// There are no mutators: refreshing an entry means writing a new snapshot
/// under the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    kind: ResponseKind,
    stored_at: String,
}

impl ResponseSnapshot {
    pub fn new(
        status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>, kind: ResponseKind, stored_at: String,
    ) -> Self {
        Self { status, headers, body: body.into(), kind, stored_at }
    }

    /// Capture `response` now.
    pub fn capture(response: &Response) -> Self {
        Self::new(
            response.status,
            response.headers.clone(),
            response.body.clone(),
            response.kind,
            chrono::Utc::now().to_rfc3339(),
        )
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn stored_at(&self) -> &str {
        &self.stored_at
    }

    /// Replay the snapshot as a host-facing response.
    pub fn to_response(&self, source: ResponseSource) -> Response {
        Response {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            kind: self.kind,
            source,
        }
    }
}
