//! Component C4 — the gateway's HTTP surface.
//!
//! Two routes per family, both handled by the single [`Engine`]
//! (`src/engine.rs`):
//!
//! - `POST /<family>/transfer` — the fixed endpoint. Mode comes from the
//!   JSON body's `mode` field (default `"shadowing"`).
//! - `/<family>/*rest` — the dynamic passthrough. Mode comes from the
//!   `?mode=` query parameter if present, else the body, else `"shadowing"`.
//!   Any HTTP method and the full remaining path + query string are
//!   forwarded to the backend.
//!
//! `original_source/.../router/router.go` only ever registers the fixed
//! endpoint, for `python` and `php` by name — its `HandleDynamicTransfer`
//! (`handlers/transfer.go`) is fully implemented but never wired to a route.
//! `spec.md` requires the dynamic route, so it is registered here, generic
//! over whatever families are actually configured rather than hardcoded to
//! two names.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::{any, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::engine::{EngineResponse, RequestContext, ResponseBody};
use crate::error::AppError;
use crate::router::RouterState;

pub fn router(state: Arc<RouterState>) -> Router {
    Router::new()
        .route("/{family}/transfer", post(transfer))
        .route("/{family}/{*rest}", any(dynamic))
        .with_state(state)
}

#[derive(Deserialize, Default)]
struct ModeQuery {
    mode: Option<String>,
}

fn mode_from_body(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(body)
        .ok()?
        .get("mode")?
        .as_str()
        .map(str::to_string)
}

/// Render an [`EngineResponse`] to an axum [`Response`]. `Raw` bodies carry
/// the backend's own headers verbatim (single-call paths only, per
/// `spec.md` §4.3); `Json` bodies are the engine-synthesized combined
/// response and carry no backend headers.
fn respond(outcome: EngineResponse) -> Response {
    let status = axum::http::StatusCode::from_u16(outcome.status).unwrap_or(axum::http::StatusCode::OK);
    match outcome.body {
        ResponseBody::Raw(bytes) => {
            let mut response = (status, bytes).into_response();
            *response.headers_mut() = outcome.headers;
            response
        }
        ResponseBody::Json(value) => (status, Json(value)).into_response(),
    }
}

/// `POST /<family>/transfer` — mode is read only from the body.
async fn transfer(
    State(state): State<Arc<RouterState>>,
    Path(family): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let targets = state.family_targets(&family)?.clone();
    let mode = mode_from_body(&body).unwrap_or_default();

    let ctx = RequestContext {
        family,
        targets,
        mode,
        method: Method::POST,
        headers,
        body: body.to_vec(),
        forward_suffix: String::new(),
    };

    let outcome = state.engine.route(ctx).await?;
    Ok(respond(outcome))
}

/// `/<family>/*rest` — mode is read from `?mode=`, falling back to the body.
/// The full remaining path and query string are forwarded verbatim to
/// whichever backend(s) the engine decides to call.
async fn dynamic(
    State(state): State<Arc<RouterState>>,
    Path((family, rest)): Path<(String, String)>,
    Query(query): Query<ModeQuery>,
    method: Method,
    headers: HeaderMap,
    uri: axum::http::Uri,
    body: Bytes,
) -> Result<Response, AppError> {
    let targets = state.family_targets(&family)?.clone();
    let mode = query
        .mode
        .or_else(|| mode_from_body(&body))
        .unwrap_or_default();

    let forward_suffix = match uri.query() {
        Some(q) => format!("/{rest}?{q}"),
        None => format!("/{rest}"),
    };

    let ctx = RequestContext {
        family,
        targets,
        mode,
        method,
        headers,
        body: body.to_vec(),
        forward_suffix,
    };

    let outcome = state.engine.route(ctx).await?;
    Ok(respond(outcome))
}
