//! Component C5 — the routing decision tree.
//!
//! One engine, shared by both the fixed `/<family>/transfer` route and the
//! dynamic `/<family>/*` passthrough (`api::gateway`), so the decision logic
//! that `original_source/.../handlers/transfer.go` duplicates across
//! `HandleTransfer` and `HandleDynamicTransfer` exists exactly once here.
//!
//! Decision order, per `spec.md` §4.4:
//! 1. Generate a transaction id, inject it into the request body if the body
//!    is a JSON object.
//! 2. Traffic-lock gate: locked + mode in {modern, shadowing} -> 403.
//! 3. Mode dispatch: legacy-only, modern-only, or shadowing.
//! 4. Shadowing short-circuits at weight 0.0 and weight 1.0 to a single call,
//!    still tagged as shadowing.
//! 5. Otherwise: concurrent fan-out to both backends, a Bernoulli(weight)
//!    draw selects which side is "primary" for the synthesized response.
//! 6. Emit one comparison event, always, regardless of outcome.

use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::backend::{BackendClient, BackendResult};
use crate::config::{FamilyTargets, RuntimeConfig};
use crate::error::AppError;
use crate::events::EventEmitter;

/// Everything the engine needs to process one inbound request, already
/// stripped of axum-specific types so the same call works for both routes.
///
/// Owned, not borrowed: [`Engine::route`] moves this onto a detached task so
/// that a request's backend calls and comparison-event emission keep running
/// to completion even if the client disconnects and axum drops the handler
/// future — the same outcome the Go original gets for free, since its
/// handler goroutines are never cancelled by the HTTP server on client
/// disconnect.
pub struct RequestContext {
    pub family: String,
    pub targets: FamilyTargets,
    pub mode: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Appended to the legacy/modern base URL. Empty for the fixed
    /// `/transfer` endpoint; the remaining path + query string for the
    /// dynamic passthrough.
    pub forward_suffix: String,
}

/// The response body the engine hands back to the HTTP layer. Single-call
/// paths (legacy-only, modern-only, and the W=0/W=1 shadowing
/// short-circuits) forward the backend's bytes verbatim — per `spec.md`
/// §4.4 step 3 the body is not assumed to be JSON. The `shadowing` combined
/// response is synthesized by the engine itself and is always a JSON object.
pub enum ResponseBody {
    Raw(Bytes),
    Json(Value),
}

/// One outcome of routing a request: the HTTP status, body, and (for
/// single-call paths only) the backend's own response headers, synthesized
/// per `spec.md` §4.4 step 7. `headers` is empty for the combined
/// `shadowing` response — `spec.md` §4.3 requires backend headers to be
/// propagated only on single-response code paths.
pub struct EngineResponse {
    pub status: u16,
    pub body: ResponseBody,
    pub headers: HeaderMap,
}

/// The event published on the comparison topic for every request that
/// reaches the engine, win or lose. Field names and shapes follow
/// `original_source/.../handlers/transfer.go`'s `kafkaMsg` construction.
#[derive(Serialize)]
struct ComparisonRecord {
    transaction_id: String,
    #[serde(rename = "service_type")]
    family: String,
    mode: String,
    weight: f64,
    legacy_status: u16,
    modern_status: u16,
    legacy_latency_seconds: f64,
    modern_latency_seconds: f64,
    primary_target: String,
    emitted_at: chrono::DateTime<chrono::Utc>,
}

/// Inject `transaction_id` into `body` if it parses as a JSON object;
/// otherwise leave the body untouched. Per `spec.md` §4.4 step 1, a
/// non-object or non-JSON body is not an error — the transaction id simply
/// travels only in the comparison event, not in the forwarded body.
fn inject_transaction_id(body: &[u8], tx_id: &str) -> Vec<u8> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(mut map)) => {
            map.insert("transaction_id".to_string(), json!(tx_id));
            serde_json::to_vec(&Value::Object(map)).unwrap_or_else(|_| body.to_vec())
        }
        _ => body.to_vec(),
    }
}

fn backend_url(base: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        base.to_string()
    } else {
        format!("{}{}", base.trim_end_matches('/'), suffix)
    }
}

/// Build the response returned for a single-backend call (legacy-only,
/// modern-only, or a weight-0/weight-1 shadowing short-circuit): the
/// backend's own response status, bytes, and headers are forwarded
/// verbatim — `spec.md` §4.4 step 3 and §4.3's single-response-path header
/// propagation.
fn single_call_response(result: &BackendResult, dynamic: bool) -> Result<EngineResponse, AppError> {
    match result.status_code {
        Some(status) => Ok(EngineResponse {
            status,
            body: ResponseBody::Raw(result.body.clone().unwrap_or_default()),
            headers: result.headers.clone(),
        }),
        None => Err(AppError::BackendUnavailable { dynamic }),
    }
}

fn side_summary(result: &BackendResult, is_primary: bool) -> Value {
    json!({
        "status": result.status_code.unwrap_or(0),
        "latency_ms": result.elapsed.as_millis() as u64,
        "response": result.body_as_json(),
        "error": result.error,
        "is_primary": is_primary,
    })
}

pub struct Engine {
    backend: Arc<BackendClient>,
    config: Arc<RuntimeConfig>,
    emitter: Arc<EventEmitter>,
}

impl Engine {
    pub fn new(backend: Arc<BackendClient>, config: Arc<RuntimeConfig>, emitter: Arc<EventEmitter>) -> Self {
        Self { backend, config, emitter }
    }

    /// Route one request. The actual work runs on a detached `tokio::spawn`
    /// task, not as a plain `.await` inline in this future: if the HTTP
    /// handler calling this is dropped mid-flight (client disconnect), the
    /// spawned task is unaffected and runs the backend calls and comparison
    /// event emission to completion regardless. See the DESIGN NOTES this
    /// mirrors in `original_source/.../handlers/transfer.go`, where the
    /// goroutines backing a shadow request are never tied to the inbound
    /// connection's lifetime either.
    pub async fn route(&self, ctx: RequestContext) -> Result<EngineResponse, AppError> {
        let backend = Arc::clone(&self.backend);
        let config = Arc::clone(&self.config);
        let emitter = Arc::clone(&self.emitter);

        tokio::spawn(async move { run(backend, config, emitter, ctx).await })
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("routing task panicked: {e}")))?
    }
}

async fn run(
    backend: Arc<BackendClient>,
    config: Arc<RuntimeConfig>,
    emitter: Arc<EventEmitter>,
    ctx: RequestContext,
) -> Result<EngineResponse, AppError> {
    let dynamic = !ctx.forward_suffix.is_empty();
    let mode = if ctx.mode.is_empty() { "shadowing".to_string() } else { ctx.mode };

    let tx_id = Uuid::new_v4().to_string();
    let body = inject_transaction_id(&ctx.body, &tx_id);

    if config.traffic_locked() && (mode == "modern" || mode == "shadowing") {
        return Err(AppError::TrafficLocked { mode });
    }

    let weight = config.weight(&ctx.family).ok_or(AppError::UnknownFamily)?;

    let legacy_url = backend_url(&ctx.targets.legacy_url, &ctx.forward_suffix);
    let modern_url = backend_url(&ctx.targets.modern_url, &ctx.forward_suffix);

    if mode == "legacy" {
        let result = backend
            .call(ctx.method.clone(), &legacy_url, ctx.headers.clone(), body.clone())
            .await;
        emit(&emitter, &tx_id, &ctx.family, "legacy-only", weight, Some(&result), None, "legacy");
        return single_call_response(&result, dynamic);
    }

    if mode == "modern" {
        let result = backend
            .call(ctx.method.clone(), &modern_url, ctx.headers.clone(), body.clone())
            .await;
        emit(&emitter, &tx_id, &ctx.family, "modern-only", weight, None, Some(&result), "modern");
        return single_call_response(&result, dynamic);
    }

    // mode == "shadowing" (or any other unrecognized mode value, which
    // the Go original also falls through to shadowing for).
    if weight <= 0.0 {
        let result = backend
            .call(ctx.method.clone(), &legacy_url, ctx.headers.clone(), body.clone())
            .await;
        emit(&emitter, &tx_id, &ctx.family, "shadowing-legacy-only", weight, Some(&result), None, "legacy");
        return single_call_response(&result, dynamic);
    }

    if weight >= 1.0 {
        let result = backend
            .call(ctx.method.clone(), &modern_url, ctx.headers.clone(), body.clone())
            .await;
        emit(&emitter, &tx_id, &ctx.family, "shadowing-modern-only", weight, None, Some(&result), "modern");
        return single_call_response(&result, dynamic);
    }

    let legacy_call = backend.call(ctx.method.clone(), &legacy_url, ctx.headers.clone(), body.clone());
    let modern_call = backend.call(ctx.method.clone(), &modern_url, ctx.headers.clone(), body.clone());
    let (legacy_result, modern_result) = tokio::join!(legacy_call, modern_call);

    let use_modern = rand::thread_rng().gen_bool(weight);
    let primary = if use_modern { "modern" } else { "legacy" };

    emit(&emitter, &tx_id, &ctx.family, "shadowing", weight, Some(&legacy_result), Some(&modern_result), primary);

    let combined = json!({
        "transaction_id": tx_id,
        "mode": "shadowing",
        "primary_target": primary,
        "legacy": side_summary(&legacy_result, primary == "legacy"),
        "modern": side_summary(&modern_result, primary == "modern"),
    });

    Ok(EngineResponse {
        status: 200,
        body: ResponseBody::Json(combined),
        headers: HeaderMap::new(),
    })
}

#[allow(clippy::too_many_arguments)]
fn emit(
    emitter: &EventEmitter,
    tx_id: &str,
    family: &str,
    tag: &str,
    weight: f64,
    legacy: Option<&BackendResult>,
    modern: Option<&BackendResult>,
    primary: &str,
) {
    let legacy_status = legacy.and_then(|r| r.status_code).unwrap_or(0);
    let modern_status = modern.and_then(|r| r.status_code).unwrap_or(0);
    let legacy_latency_seconds = legacy.map(|r| r.elapsed.as_secs_f64()).unwrap_or(0.0);
    let modern_latency_seconds = modern.map(|r| r.elapsed.as_secs_f64()).unwrap_or(0.0);

    emitter.emit(ComparisonRecord {
        transaction_id: tx_id.to_string(),
        family: family.to_string(),
        mode: tag.to_string(),
        weight,
        legacy_status,
        modern_status,
        legacy_latency_seconds,
        modern_latency_seconds,
        primary_target: primary.to_string(),
        emitted_at: chrono::Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test helper: both `ResponseBody` variants as a `serde_json::Value`,
    /// regardless of whether the engine forwarded raw backend bytes or
    /// synthesized a combined-response object.
    fn body_json(body: &ResponseBody) -> Value {
        match body {
            ResponseBody::Raw(bytes) => serde_json::from_slice(bytes).unwrap(),
            ResponseBody::Json(value) => value.clone(),
        }
    }

    #[test]
    fn transaction_id_is_injected_into_json_objects() {
        let body = inject_transaction_id(br#"{"amount":10}"#, "tx-123");
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["transaction_id"], "tx-123");
        assert_eq!(parsed["amount"], 10);
    }

    #[test]
    fn transaction_id_injection_is_a_no_op_on_non_object_bodies() {
        let body = inject_transaction_id(b"not json", "tx-123");
        assert_eq!(body, b"not json");

        let array_body = inject_transaction_id(b"[1,2,3]", "tx-123");
        assert_eq!(array_body, b"[1,2,3]");
    }

    #[test]
    fn backend_url_appends_suffix_without_double_slash() {
        assert_eq!(backend_url("http://legacy/", "/extra"), "http://legacy/extra");
        assert_eq!(backend_url("http://legacy", ""), "http://legacy");
    }

    #[test]
    fn comparison_record_serializes_service_type_and_both_latencies() {
        let record = ComparisonRecord {
            transaction_id: "tx-1".to_string(),
            family: "php".to_string(),
            mode: "shadowing".to_string(),
            weight: 0.3,
            legacy_status: 200,
            modern_status: 200,
            legacy_latency_seconds: 0.125,
            modern_latency_seconds: 0.07,
            primary_target: "legacy".to_string(),
            emitted_at: chrono::Utc::now(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["service_type"], "php");
        assert!(value.get("family").is_none());
        assert_eq!(value["legacy_latency_seconds"], 0.125);
        assert_eq!(value["modern_latency_seconds"], 0.07);
    }

    // End-to-end scenarios below exercise `run` directly against wiremock
    // backends, mirroring spec.md §8's S1-S5 scenarios.

    use wiremock::matchers::method as http_method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx(family: &str, targets: FamilyTargets, mode: &str, body: &[u8]) -> RequestContext {
        RequestContext {
            family: family.to_string(),
            targets,
            mode: mode.to_string(),
            method: Method::POST,
            headers: HeaderMap::new(),
            body: body.to_vec(),
            forward_suffix: String::new(),
        }
    }

    async fn harness(legacy: &MockServer, modern: &MockServer) -> (Arc<BackendClient>, Arc<RuntimeConfig>, Arc<EventEmitter>, FamilyTargets) {
        let targets = FamilyTargets {
            legacy_url: format!("{}/api/transfer-funds", legacy.uri()),
            modern_url: format!("{}/api/transfer-funds", modern.uri()),
        };
        (
            Arc::new(BackendClient::new()),
            Arc::new(RuntimeConfig::new()),
            Arc::new(EventEmitter::Null),
            targets,
        )
    }

    #[tokio::test]
    async fn s1_locked_baseline_rejects_without_calling_backend() {
        let legacy = MockServer::start().await;
        let modern = MockServer::start().await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&legacy)
            .await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&modern)
            .await;

        let (backend, config, emitter, targets) = harness(&legacy, &modern).await;
        assert!(config.traffic_locked());

        let request = ctx("python", targets, "", br#"{"account_number":"A1","amount":10}"#);
        let err = run(backend, config, emitter, request).await.unwrap_err();
        assert!(matches!(err, AppError::TrafficLocked { mode } if mode == "shadowing"));
    }

    #[tokio::test]
    async fn s2_legacy_only_shadow_short_circuits_at_weight_zero() {
        let legacy = MockServer::start().await;
        let modern = MockServer::start().await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success", "new_balance": 95.0})))
            .expect(1)
            .mount(&legacy)
            .await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&modern)
            .await;

        let (backend, config, emitter, targets) = harness(&legacy, &modern).await;
        config.set_traffic_locked(false);

        let request = ctx("python", targets, "", br#"{"account_number":"A1","amount":10}"#);
        let resp = run(backend, config, emitter, request).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(body_json(&resp.body)["status"], "success");

        legacy.verify().await;
        modern.verify().await;
    }

    #[tokio::test]
    async fn s3_full_shadow_calls_both_and_flags_exactly_one_primary() {
        let legacy = MockServer::start().await;
        let modern = MockServer::start().await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"new_balance": 95})))
            .expect(1)
            .mount(&legacy)
            .await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"new_balance": 95.05})))
            .expect(1)
            .mount(&modern)
            .await;

        let (backend, config, emitter, targets) = harness(&legacy, &modern).await;
        config.set_traffic_locked(false);
        config.set_weight("python", 0.3).unwrap();

        let request = ctx("python", targets, "", br#"{"account_number":"A1","amount":10}"#);
        let resp = run(backend, config, emitter, request).await.unwrap();
        assert_eq!(resp.status, 200);
        let body = body_json(&resp.body);
        assert_eq!(body["mode"], "shadowing");

        let legacy_primary = body["legacy"]["is_primary"].as_bool().unwrap();
        let modern_primary = body["modern"]["is_primary"].as_bool().unwrap();
        assert_ne!(legacy_primary, modern_primary);
        let primary_target = body["primary_target"].as_str().unwrap();
        assert_eq!(primary_target == "modern", modern_primary);

        legacy.verify().await;
        modern.verify().await;
    }

    #[tokio::test]
    async fn s4_modern_transport_error_in_shadow_still_returns_200() {
        let legacy = MockServer::start().await;
        let modern = MockServer::start().await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"new_balance": 95})))
            .mount(&legacy)
            .await;

        let (backend, config, emitter, mut targets) = harness(&legacy, &modern).await;
        // Point "modern" at a dead port so the call fails transport-wise
        // instead of getting a non-2xx HTTP response.
        targets.modern_url = "http://127.0.0.1:1/api/transfer-funds".to_string();
        config.set_traffic_locked(false);
        config.set_weight("python", 0.5).unwrap();

        let request = ctx("python", targets, "", br#"{"account_number":"A1","amount":10}"#);
        let resp = run(backend, config, emitter, request).await.unwrap();
        assert_eq!(resp.status, 200);
        let body = body_json(&resp.body);
        assert_eq!(body["modern"]["status"], 0);
        assert!(body["modern"]["error"].is_string());
        assert!(body["legacy"]["response"].is_object());
    }

    #[tokio::test]
    async fn s5_forced_modern_mode_never_calls_legacy() {
        let legacy = MockServer::start().await;
        let modern = MockServer::start().await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&legacy)
            .await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&modern)
            .await;

        let (backend, config, emitter, targets) = harness(&legacy, &modern).await;
        config.set_traffic_locked(false);

        let request = ctx("python", targets, "modern", br#"{"mode":"modern"}"#);
        let resp = run(backend, config, emitter, request).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(body_json(&resp.body)["status"], "success");

        legacy.verify().await;
        modern.verify().await;
    }

    #[tokio::test]
    async fn transaction_id_reaches_the_forwarded_body_and_is_unique_per_request() {
        let legacy = MockServer::start().await;
        let modern = MockServer::start().await;
        Mock::given(http_method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&legacy)
            .await;

        let (backend, config, emitter, targets) = harness(&legacy, &modern).await;
        config.set_traffic_locked(false);

        for _ in 0..3 {
            let request = ctx("python", targets.clone(), "legacy", br#"{"amount":1}"#);
            run(Arc::clone(&backend), Arc::clone(&config), Arc::clone(&emitter), request)
                .await
                .unwrap();
        }

        let received = legacy.received_requests().await.unwrap();
        assert_eq!(received.len(), 3);
        let ids: Vec<String> = received
            .iter()
            .map(|r| {
                let body: Value = serde_json::from_slice(&r.body).unwrap();
                body["transaction_id"].as_str().unwrap().to_string()
            })
            .collect();
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }
}
