use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::info;

mod api;
mod backend;
mod config;
mod engine;
mod error;
mod events;
mod router;

use backend::BackendClient;
use config::{RuntimeConfig, StaticConfig};
use engine::Engine;
use events::EventEmitter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // When invoked as a Docker HEALTHCHECK, hit /healthz and exit immediately.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck().await;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shadow_gateway=info,tower_http=warn".into()),
        )
        .init();

    let static_config = Arc::new(StaticConfig::from_env().context("failed to load configuration")?);
    info!(
        families = ?static_config.families.keys().collect::<Vec<_>>(),
        port = static_config.port,
        "shadow-gateway starting"
    );

    let runtime_config = Arc::new(RuntimeConfig::new());
    let backend_client = Arc::new(BackendClient::new());
    let emitter = Arc::new(EventEmitter::connect(static_config.kafka_bootstrap_servers.as_deref()).await);

    let engine = Arc::new(Engine::new(
        Arc::clone(&backend_client),
        Arc::clone(&runtime_config),
        Arc::clone(&emitter),
    ));

    let state = Arc::new(router::RouterState::new(
        Arc::clone(&static_config),
        Arc::clone(&runtime_config),
        Arc::clone(&engine),
    ));

    let addr: SocketAddr = format!("0.0.0.0:{}", static_config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    let trace_layer = tower_http::trace::TraceLayer::new_for_http()
        .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO));

    // CORS only matters for /admin/status, which sets its own headers, but a
    // permissive GET/OPTIONS layer here keeps the preflight path uniform with
    // how a real browser dashboard would hit it.
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    let app = api::admin::router(Arc::clone(&state))
        .merge(api::gateway::router(Arc::clone(&state)))
        .route("/healthz", axum::routing::get(api::health::healthz))
        .layer(cors)
        .layer(axum::middleware::from_fn(api::request_id::request_id_middleware))
        .layer(trace_layer);

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.context("server error")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    emitter.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Lightweight healthcheck: GET /healthz and exit 0 on 200, 1 otherwise.
/// Invoked via `shadow-gateway --healthcheck` from Docker HEALTHCHECK.
async fn healthcheck() -> anyhow::Result<()> {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8082);

    let url = format!("http://127.0.0.1:{port}/healthz");
    let resp = reqwest::get(&url).await?;

    if resp.status().is_success() {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}
