//! Component C6 — the admin surface.
//!
//! Three endpoints, all unauthenticated (per `spec.md` §5 — the admin
//! surface is assumed to sit behind a network boundary, not an app-level
//! one): `GET /admin/status`, `GET|POST /admin/set-weight`, and
//! `GET|POST /admin/traffic-lock`. For `set-weight`, `GET` is a read-only
//! lookup by `?service=`; only `POST` mutates the weight from a JSON body.
//! `traffic-lock` accepts both GET (read) and POST (optionally mutates,
//! from a JSON body) — the same dual surface as
//! `original_source/.../handlers/admin.go`'s `SetWeightHandler` and
//! `TrafficLockHandler`.
//!
//! `/admin/status` additionally answers CORS preflight `OPTIONS` requests
//! and sets `Access-Control-Allow-Origin: *` on its `GET` response, mirroring
//! the Go original's `StatusHandler` — the one admin route meant to be
//! polled directly from a browser-based dashboard.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, on, MethodFilter},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{MigrationStatus, FAMILIES};
use crate::error::AppError;
use crate::router::RouterState;

pub fn router(state: Arc<RouterState>) -> Router {
    Router::new()
        .route("/admin/status", on(MethodFilter::GET.or(MethodFilter::OPTIONS), status))
        .route("/admin/set-weight", get(get_weight).post(set_weight))
        .route("/admin/traffic-lock", get(traffic_lock).post(traffic_lock))
        .with_state(state)
}

/// `GET|OPTIONS /admin/status` — snapshot of every family's weight and
/// derived migration status, plus the global traffic lock. Per `spec.md`
/// §4.5/§8 S6, each family is reported at the top level of the response
/// object (e.g. `status["php"]["migration_status"]`), matching
/// `original_source/.../handlers/admin.go`'s `StatusHandler` — not nested
/// under an intermediate `"services"` key.
async fn status(State(state): State<Arc<RouterState>>, req: axum::http::Request<axum::body::Body>) -> impl IntoResponse {
    if req.method() == axum::http::Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        let headers = resp.headers_mut();
        headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        headers.insert("access-control-allow-methods", HeaderValue::from_static("GET, OPTIONS"));
        headers.insert("access-control-allow-headers", HeaderValue::from_static("Content-Type"));
        return resp;
    }

    let mut body = serde_json::Map::new();
    body.insert(
        "traffic_locked".to_string(),
        json!(state.runtime_config.traffic_locked()),
    );

    for family in FAMILIES.iter() {
        let weight = state.runtime_config.weight(family).unwrap_or(0.0);
        body.insert(
            family.to_string(),
            json!({
                "weight": weight,
                "weight_percent": weight * 100.0,
                "migration_status": MigrationStatus::from_weight(weight),
            }),
        );
    }

    body.insert(
        "uptime_seconds".to_string(),
        json!(state.started_at.elapsed().as_secs()),
    );

    let mut resp = Json(Value::Object(body)).into_response();
    resp.headers_mut()
        .insert("access-control-allow-origin", HeaderValue::from_static("*"));
    resp
}

#[derive(Deserialize, Default)]
pub struct GetWeightParams {
    pub service: Option<String>,
}

/// `GET /admin/set-weight?service=` — read one family's current weight.
/// Read-only: no `weight` is accepted here, only a lookup by `service`.
async fn get_weight(
    State(state): State<Arc<RouterState>>,
    Query(query): Query<GetWeightParams>,
) -> Result<impl IntoResponse, AppError> {
    let service = query.service.ok_or(AppError::UnknownService)?;
    let weight = state
        .runtime_config
        .weight(&service)
        .ok_or(AppError::UnknownService)?;

    Ok(Json(json!({ "service": service, "weight": weight })))
}

#[derive(Deserialize, Default)]
pub struct SetWeightParams {
    pub service: Option<String>,
    pub weight: Option<f64>,
}

/// `POST /admin/set-weight` — set one family's weight from a JSON body.
/// An unrecognized `service` is a 400, per the Go original.
async fn set_weight(
    State(state): State<Arc<RouterState>>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, AppError> {
    let params: SetWeightParams = serde_json::from_slice(&body).map_err(|_| AppError::InvalidJson)?;

    let service = params.service.ok_or(AppError::UnknownService)?;
    let weight = params.weight.ok_or(AppError::InvalidJson)?;

    state.runtime_config.set_weight(&service, weight)?;

    Ok(Json(json!({ "service": service, "weight": weight })))
}

#[derive(Deserialize, Default)]
pub struct TrafficLockParams {
    pub locked: Option<bool>,
}

/// `GET|POST /admin/traffic-lock` — read or flip the global traffic lock.
async fn traffic_lock(
    State(state): State<Arc<RouterState>>,
    Query(query): Query<TrafficLockParams>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, AppError> {
    let params = if body.is_empty() {
        query
    } else {
        serde_json::from_slice(&body).map_err(|_| AppError::InvalidJson)?
    };

    if let Some(locked) = params.locked {
        state.runtime_config.set_traffic_locked(locked);
    }

    Ok(Json(json!({ "locked": state.runtime_config.traffic_locked() })))
}
