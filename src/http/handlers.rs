//! Capability handlers.
//!
//! # Responsibilities
//! - Liveness: answer without touching any origin
//! - Health: probe one origin, or all of them
//! - Query / query_range: forward to the origin through the response cache
//! - Full proxy: stream the origin response back unchanged
//!
//! # Design Decisions
//! - Only successful query responses are cached
//! - `Cache-Control: no-cache` bypasses the cache unless the origin ignores it
//! - Upstream errors map to 502/504 and never expose internal details

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::{cache_key, Cache};
use crate::config::OriginConfig;
use crate::http::server::AppState;
use crate::http::upstream::UpstreamError;
use crate::observability::metrics;
use crate::routing::{Resolution, Target};

/// Response header reporting cache use for query capabilities.
pub const X_CACHE: &str = "x-cache";

/// Largest request or origin response body buffered by the query handlers.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Serialized form of a cached origin response.
#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    content_type: Option<String>,
    body: String,
}

impl CachedResponse {
    fn into_response(self, cache_status: &'static str) -> Option<Response<Body>> {
        let body = BASE64_STANDARD.decode(self.body).ok()?;
        let status = StatusCode::from_u16(self.status).ok()?;
        Some(buffered_response(status, self.content_type.as_deref(), body.into(), cache_status))
    }
}

/// `GET /ping`.
pub fn ping() -> Response<Body> {
    (StatusCode::OK, "pong").into_response()
}

/// Health check for a single origin or for all origins.
pub async fn health(state: &AppState, target: &Target) -> Response<Body> {
    match target {
        Target::Origin(moniker) => match state.config.origin(moniker) {
            Some(origin) => origin_health(state, moniker, origin).await,
            None => unknown_origin(moniker),
        },
        Target::AllOrigins => all_origins_health(state).await,
        Target::None => (StatusCode::NOT_FOUND, "no origin to check").into_response(),
    }
}

async fn origin_health(state: &AppState, moniker: &str, origin: &OriginConfig) -> Response<Body> {
    match probe(state, origin).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => upstream_failure(moniker, &e),
    }
}

async fn all_origins_health(state: &AppState) -> Response<Body> {
    let mut report = serde_json::Map::new();
    let mut healthy = true;

    for (moniker, origin) in &state.config.origins {
        let entry = match probe(state, origin).await {
            Ok(response) => {
                healthy &= response.status().is_success();
                json!({ "status": response.status().as_u16() })
            }
            Err(e) => {
                healthy = false;
                metrics::record_upstream_failure(moniker, e.kind());
                tracing::warn!(origin = %moniker, detail = %e, "Origin health check failed");
                json!({ "error": e.kind() })
            }
        };
        report.insert(moniker.clone(), entry);
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, axum::Json(json!({ "origins": report }))).into_response()
}

async fn probe(
    state: &AppState,
    origin: &OriginConfig,
) -> Result<Response<hyper::body::Incoming>, UpstreamError> {
    state
        .client
        .send(
            origin,
            axum::http::Method::GET,
            &origin.health_path(),
            &HeaderMap::new(),
            Body::empty(),
        )
        .await
}

/// Instant and range queries, served through the cache.
pub async fn query(
    state: &AppState,
    moniker: &str,
    origin: &OriginConfig,
    resolution: &Resolution,
    request: Request<Body>,
) -> Response<Body> {
    let capability = resolution.capability.as_str();
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response(),
    };

    let path_and_query = with_query(resolution.upstream_path(origin), parts.uri.query());
    let key = cache_key(moniker, capability, parts.method.as_str(), &path_and_query, &body);
    let bypass = !origin.ignore_no_cache_header && requests_no_cache(&parts.headers);

    let cached = if bypass {
        None
    } else {
        cache_lookup(&state.cache, &key)
            .await
            .and_then(|hit| hit.into_response("hit"))
    };
    if let Some(response) = cached {
        metrics::record_cache_lookup(moniker, capability, "hit");
        tracing::debug!(origin = %moniker, cache_key = %key, "Cache hit");
        return response;
    }
    // Unreadable entries count as misses.
    let cache_status = if bypass { "bypass" } else { "miss" };
    metrics::record_cache_lookup(moniker, capability, cache_status);

    let mut headers = parts.headers;
    headers.remove(header::ACCEPT_ENCODING);

    let upstream = match state
        .client
        .send(origin, parts.method, &path_and_query, &headers, Body::from(body))
        .await
    {
        Ok(response) => response,
        Err(e) => return upstream_failure(moniker, &e),
    };

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let payload = match to_bytes(Body::new(upstream.into_body()), MAX_BODY_BYTES).await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(origin = %moniker, detail = %e, "Failed to read origin response");
            metrics::record_upstream_failure(moniker, "body");
            return (StatusCode::BAD_GATEWAY, "origin response failed").into_response();
        }
    };

    if status == StatusCode::OK && !bypass {
        let entry = CachedResponse {
            status: status.as_u16(),
            content_type: content_type.clone(),
            body: BASE64_STANDARD.encode(&payload),
        };
        let ttl = Duration::from_secs(state.config.caching.record_ttl_secs);
        cache_store(&state.cache, key, &entry, ttl).await;
    }

    buffered_response(status, content_type.as_deref(), payload, cache_status)
}

/// Forward any other API or catch-all path verbatim.
pub async fn full_proxy(
    state: &AppState,
    moniker: &str,
    origin: &OriginConfig,
    resolution: &Resolution,
    request: Request<Body>,
) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let path_and_query = with_query(resolution.upstream_path(origin), parts.uri.query());

    match state
        .client
        .send(origin, parts.method, &path_and_query, &parts.headers, body)
        .await
    {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => upstream_failure(moniker, &e),
    }
}

/// Response for a moniker that has no configuration.
pub fn unknown_origin(moniker: &str) -> Response<Body> {
    tracing::warn!(origin = %moniker, "Resolved origin is not configured");
    (StatusCode::NOT_FOUND, "unknown origin").into_response()
}

fn upstream_failure(moniker: &str, error: &UpstreamError) -> Response<Body> {
    tracing::warn!(origin = %moniker, detail = %error, "Origin request failed");
    metrics::record_upstream_failure(moniker, error.kind());
    let message = match error {
        UpstreamError::Timeout(_) => "origin timed out",
        _ => "origin request failed",
    };
    (error.status(), message).into_response()
}

fn with_query(path: String, query: Option<&str>) -> String {
    match query {
        Some(query) => format!("{path}?{query}"),
        None => path,
    }
}

fn requests_no_cache(headers: &HeaderMap) -> bool {
    let has_no_cache = |name| {
        headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains("no-cache"))
    };
    has_no_cache(header::CACHE_CONTROL) || has_no_cache(header::PRAGMA)
}

fn buffered_response(
    status: StatusCode,
    content_type: Option<&str>,
    body: Bytes,
    cache_status: &'static str,
) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(X_CACHE, HeaderValue::from_static(cache_status));
    response
}

async fn cache_lookup(cache: &Arc<dyn Cache>, key: &str) -> Option<CachedResponse> {
    let cache = Arc::clone(cache);
    let lookup_key = key.to_string();
    let bytes = match tokio::task::spawn_blocking(move || cache.retrieve(&lookup_key)).await {
        Ok(Ok(bytes)) => bytes?,
        Ok(Err(e)) => {
            tracing::warn!(cache_key = %key, detail = %e, "Cache retrieve failed");
            return None;
        }
        Err(e) => {
            tracing::warn!(cache_key = %key, detail = %e, "Cache retrieve task failed");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(cache_key = %key, detail = %e, "Discarding unreadable cache entry");
            None
        }
    }
}

async fn cache_store(cache: &Arc<dyn Cache>, key: String, entry: &CachedResponse, ttl: Duration) {
    let data = match serde_json::to_vec(entry) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(cache_key = %key, detail = %e, "Failed to encode cache entry");
            return;
        }
    };

    let cache = Arc::clone(cache);
    let result = tokio::task::spawn_blocking(move || {
        let stored = cache.store(&key, &data, ttl);
        (key, stored)
    })
    .await;

    match result {
        Ok((_, Ok(()))) => {}
        Ok((key, Err(e))) => tracing::warn!(cache_key = %key, detail = %e, "Cache store failed"),
        Err(e) => tracing::warn!(detail = %e, "Cache store task failed"),
    }
}
