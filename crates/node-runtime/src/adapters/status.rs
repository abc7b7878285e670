//! # Status Server
//!
//! Read-only HTTP surface for operators and scrapers.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /health` | latest health report; 200 when healthy, 503 otherwise |
//! | `GET /metrics` | Prometheus text format |
//!
//! Every route sits behind the per-client rate limiter. Clients are keyed
//! by `X-Forwarded-For`, then the peer address. `X-Bypass-Token` skips the
//! limiter when it matches the configured token.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bn_06_health_check::HealthCheckApi;
use serde_json::json;
use shared_resilience::RateLimiter;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

pub const BYPASS_HEADER: &str = "x-bypass-token";

#[derive(Clone)]
pub struct StatusState {
    pub health: Arc<dyn HealthCheckApi>,
    pub limiter: Arc<RateLimiter>,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state)
}

/// Serve until `shutdown` flips.
pub async fn serve(
    listener: TcpListener,
    state: StatusState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "[runtime] Status server listening");
    }
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
    })
    .await
}

async fn health(State(state): State<StatusState>) -> Response {
    match state.health.latest() {
        Some(report) => {
            let status = if report.is_healthy() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(report)).into_response()
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "pending" })),
        )
            .into_response(),
    }
}

async fn metrics() -> Response {
    match bonder_telemetry::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "[runtime] Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn rate_limit(State(state): State<StatusState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip());
    let client = client_ip(req.headers(), peer);
    let token = req
        .headers()
        .get(BYPASS_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.limiter.check(client, token) {
        Ok(()) => next.run(req).await,
        Err(exceeded) => {
            let secs = exceeded.retry_after.as_secs_f64().ceil().max(1.0) as u64;
            warn!(%client, retry_after_secs = secs, "[runtime] Status request rate limited");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
                Json(json!({ "error": "rate limited", "retry_after_secs": secs })),
            )
                .into_response()
        }
    }
}

fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or(peer)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
