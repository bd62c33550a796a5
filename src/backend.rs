//! Component C3 — the backend HTTP client.
//!
//! One operation, [`BackendClient::call`], issuing a single HTTP request to
//! a backend URL and reporting status, body, elapsed time, and transport
//! error as one [`BackendResult`]. No retries — a transport failure is
//! surfaced, not masked. Grounded in the teacher's `OpenAIAdapter`
//! (`src/backends/openai.rs`): one shared, long-lived `reqwest::Client`
//! built once and reused for every call.

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{header::HeaderMap, Client, Method};

/// Headers that must not be forwarded verbatim between the inbound request
/// and the outbound backend call, or back again on the response. Forwarding
/// them (as the original Go passthrough does) hands `reqwest` a stale
/// `content-length`/`host` or a `connection` value that no longer describes
/// the new connection — a correctness bug, not a style nit.
const HOP_BY_HOP: &[&str] = &["connection", "content-length", "host", "transfer-encoding"];

/// The outcome of one backend call. Exactly one of `(status_code, body)` or
/// `error` is populated — mirrors `spec.md` §3's "Backend call result".
#[derive(Debug, Clone)]
pub struct BackendResult {
    pub status_code: Option<u16>,
    pub body: Option<Bytes>,
    pub headers: HeaderMap,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl BackendResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Parse the body as JSON, if present and valid. Per `spec.md` §7,
    /// "Malformed backend response body (not JSON) in combined mode" simply
    /// yields `None` here — the status is still reported by the caller.
    pub fn body_as_json(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// Strip hop-by-hop headers from a header map before forwarding it onward.
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Component C3. Wraps one shared [`Client`] with the spec's fixed 30s
/// per-call timeout.
pub struct BackendClient {
    client: Client,
}

impl BackendClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self { client }
    }

    /// Issue one HTTP call to `url`. `headers` and `body` are forwarded
    /// verbatim (minus hop-by-hop headers); elapsed time is measured across
    /// the full call including body read.
    pub async fn call(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> BackendResult {
        let t0 = Instant::now();
        let outbound_headers = strip_hop_by_hop(&headers);

        let result = self
            .client
            .request(method, url)
            .headers(outbound_headers)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let response_headers = strip_hop_by_hop(response.headers());
                match response.bytes().await {
                    Ok(bytes) => BackendResult {
                        status_code: Some(status),
                        body: Some(bytes),
                        headers: response_headers,
                        elapsed: t0.elapsed(),
                        error: None,
                    },
                    Err(e) => BackendResult {
                        status_code: None,
                        body: None,
                        headers: HeaderMap::new(),
                        elapsed: t0.elapsed(),
                        error: Some(e.to_string()),
                    },
                }
            }
            Err(e) => BackendResult {
                status_code: None,
                body: None,
                headers: HeaderMap::new(),
                elapsed: t0.elapsed(),
                error: Some(e.to_string()),
            },
        }
    }
}

impl Default for BackendClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn call_reports_status_body_and_elapsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/transfer-funds"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .mount(&server)
            .await;

        let client = BackendClient::new();
        let result = client
            .call(
                Method::POST,
                &format!("{}/api/transfer-funds", server.uri()),
                HeaderMap::new(),
                br#"{"amount":10}"#.to_vec(),
            )
            .await;

        assert_eq!(result.status_code, Some(200));
        assert!(!result.is_error());
        assert_eq!(result.body_as_json().unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn call_surfaces_transport_error_without_retry() {
        let client = BackendClient::new();
        let result = client
            .call(
                Method::POST,
                "http://127.0.0.1:1/api/transfer-funds",
                HeaderMap::new(),
                vec![],
            )
            .await;

        assert!(result.is_error());
        assert!(result.status_code.is_none());
    }

    #[tokio::test]
    async fn malformed_json_body_parses_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = BackendClient::new();
        let result = client
            .call(Method::POST, &format!("{}/x", server.uri()), HeaderMap::new(), vec![])
            .await;

        assert_eq!(result.status_code, Some(200));
        assert!(result.body_as_json().is_none());
    }
}
