//! Request middleware: ids, request logging, CORS and rate limiting.

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::response::ApiError;
use crate::ratelimit::{client_identifier, RateLimitDecision, RateLimiter};

pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Identifier of the request being served, stored as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Reuse the caller's `X-Request-ID` or mint one, and echo it back.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}

/// Log the start and end of every request inside a span carrying its id.
pub async fn request_logger(req: Request, next: Next) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let span = info_span!("request", request_id = %request_id);
    async move {
        let start = Instant::now();
        info!(method = %method, uri = %uri, "Request started");

        let response = next.run(req).await;

        info!(
            method = %method,
            uri = %uri,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }
    .instrument(span)
    .await
}

/// Count the request against `limiter` and reject it with 429 when over quota.
///
/// Quota headers are set on allowed and rejected responses alike. When
/// limiters are stacked, headers from the innermost one are kept.
pub async fn rate_limit(State(limiter): State<Arc<RateLimiter>>, req: Request, next: Next) -> Response {
    let identifier = client_identifier(req.headers());
    let decision = limiter.check(&identifier);

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        ApiError::RateLimitExceeded.into_response()
    };

    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    if headers.contains_key(&RATE_LIMIT_LIMIT) {
        return;
    }

    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    if let Ok(value) = HeaderValue::from_str(&decision.reset_at_rfc3339()) {
        headers.insert(RATE_LIMIT_RESET, value);
    }
}

/// CORS policy; any origin unless `origin` names one.
pub fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, REQUEST_ID])
        .expose_headers([REQUEST_ID, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING])
        .max_age(Duration::from_secs(86_400));

    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        // Credentials are only valid alongside an exact origin.
        Some(origin) => layer
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true),
        None => layer.allow_origin(AllowOrigin::any()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn decision(remaining: u32) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            remaining,
            reset_at: DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap(),
            limit: 10,
        }
    }

    #[test]
    fn test_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&mut headers, &decision(7));

        assert_eq!(headers[&RATE_LIMIT_LIMIT], "10");
        assert_eq!(headers[&RATE_LIMIT_REMAINING], "7");
        assert_eq!(headers[&RATE_LIMIT_RESET], "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_inner_limiter_headers_are_kept() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&mut headers, &decision(2));
        apply_rate_limit_headers(&mut headers, &decision(9));

        assert_eq!(headers[&RATE_LIMIT_REMAINING], "2");
    }
}
