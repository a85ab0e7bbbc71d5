//! Router assembly and the built-in routes.

use axum::extract::State;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tower::ServiceBuilder;

use super::middleware::{cors_layer, rate_limit, request_id, request_logger};
use super::response::{success, ApiError, SuccessResponse};
use super::state::AppState;
use crate::cache::CacheStats;

/// Router with the built-in routes and no authentication endpoints.
pub fn app(state: AppState) -> Router {
    assemble(state, None)
}

/// Router that also serves `auth_routes` under `/api/auth`.
///
/// Authentication itself is handled by `auth_routes`; this only places the
/// stricter auth limiter in front of them.
pub fn app_with_auth(state: AppState, auth_routes: Router<AppState>) -> Router {
    assemble(state, Some(auth_routes))
}

fn assemble(state: AppState, auth_routes: Option<Router<AppState>>) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health));

    if let Some(auth_routes) = auth_routes {
        let limited = auth_routes.layer(from_fn_with_state(state.auth_limiter.clone(), rate_limit));
        router = router.nest("/api/auth", limited);
    }

    router
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_id))
                .layer(from_fn(request_logger))
                .layer(cors_layer(state.cors_origin.as_deref()))
                .layer(from_fn_with_state(state.global_limiter.clone(), rate_limit)),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_secs: f64,
    pub cache: CacheStats,
    pub rate_limiting: LimiterReport,
}

/// Identifiers currently tracked by each limiter.
#[derive(Debug, Serialize)]
pub struct LimiterReport {
    pub global_clients: usize,
    pub auth_clients: usize,
}

async fn health(State(state): State<AppState>) -> Json<SuccessResponse<HealthReport>> {
    success(HealthReport {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime_secs: state.uptime().as_secs_f64(),
        cache: state.cache.stats(),
        rate_limiting: LimiterReport {
            global_clients: state.global_limiter.len(),
            auth_clients: state.auth_limiter.len(),
        },
    })
}

async fn not_found() -> Response {
    ApiError::NotFound.into_response()
}
