//! Downstream transport seam.
//!
//! The cache does not ship an HTTP client. Callers inject anything that can
//! turn an operation into a raw response; the interceptor and normalizer
//! only ever see the completed bytes.

use crate::types::Operation;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A completed HTTP response as the transport produced it.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// A 200 response with the given body.
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    /// A response with the given status and an empty body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to obtain any response at all (DNS, connect, timeout, ...).
/// Non-2xx responses are not transport errors; the client maps those itself.
#[derive(Debug, Clone)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Executes operations against a server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, operation: &Operation) -> Result<RawResponse, TransportError>;
}

/// Canned-response transport for tests and offline use.
///
/// Responses are handed out in push order; sending with an empty queue is a
/// transport error.
#[derive(Default)]
pub struct StaticTransport {
    responses: Mutex<VecDeque<RawResponse>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn push(&self, response: RawResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }

    /// Queue a 200 response with the given body.
    pub fn push_body(&self, body: &str) {
        self.push(RawResponse::ok(body.as_bytes().to_vec()));
    }

    /// Number of responses still queued.
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for StaticTransport {
    async fn send(&self, operation: &Operation) -> Result<RawResponse, TransportError> {
        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());

        match response {
            Some(response) => Ok(response),
            None => Err(TransportError(format!(
                "no canned response for operation '{}'",
                operation.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Selection};

    fn op() -> Operation {
        Operation::query("Ping", "query Ping { ping }", Selection::of([Field::new("ping")]))
    }

    #[tokio::test]
    async fn test_static_transport_hands_out_in_order() {
        let transport = StaticTransport::new();
        transport.push_body(r#"{"data":{"ping":1}}"#);
        transport.push_body(r#"{"data":{"ping":2}}"#);

        let first = transport.send(&op()).await.unwrap();
        let second = transport.send(&op()).await.unwrap();
        assert!(String::from_utf8_lossy(&first.body).contains("1"));
        assert!(String::from_utf8_lossy(&second.body).contains("2"));
    }

    #[tokio::test]
    async fn test_static_transport_empty_queue_errors() {
        let transport = StaticTransport::new();
        assert!(transport.send(&op()).await.is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(RawResponse::ok(Vec::new()).is_success());
        assert!(RawResponse::status(204).is_success());
        assert!(!RawResponse::status(409).is_success());
        assert!(!RawResponse::status(500).is_success());
    }
}
