//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with a single dispatch entry point
//! - Wire up middleware (request ID, tracing, compression)
//! - Resolve every request through the origin router
//! - Hand resolved requests to the capability handlers
//! - Record per-request metrics and spans

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use opentelemetry::trace::Span as _;
use opentelemetry::KeyValue;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::cache::Cache;
use crate::config::Config;
use crate::http::handlers;
use crate::http::upstream::UpstreamClient;
use crate::observability::metrics;
use crate::observability::tracing::TracingContext;
use crate::routing::{Capability, OriginRouter, Resolution, Target};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<OriginRouter>,
    pub cache: Arc<dyn Cache>,
    pub tracing: TracingContext,
    pub client: UpstreamClient,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        router: Arc<OriginRouter>,
        cache: Arc<dyn Cache>,
        tracing: TracingContext,
    ) -> Self {
        Self {
            config,
            router,
            cache,
            tracing,
            client: UpstreamClient::new(),
        }
    }
}

/// HTTP server for the caching proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new().fallback(dispatch).with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CompressionLayer::new()),
        )
    }

    /// The configured router, for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "proxy http endpoint starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Entry point for every request.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let path = request.uri().path().to_string();

    let Some(resolution) = state.router.resolve(request.method(), &path) else {
        tracing::debug!(method = %request.method(), path = %path, "No route matched");
        metrics::record_request("none", "unmatched", 404, start);
        return (StatusCode::NOT_FOUND, "no matching route").into_response();
    };

    let capability = resolution.capability;
    let origin_label = match &resolution.target {
        Target::Origin(moniker) => moniker.clone(),
        Target::AllOrigins => "all".to_string(),
        Target::None => "none".to_string(),
    };

    tracing::debug!(
        rule = resolution.rule,
        origin = %origin_label,
        capability = %capability,
        path = %path,
        "Request resolved"
    );

    let mut span = state.tracing.start_span(capability.as_str());
    span.set_attribute(KeyValue::new("trickster.origin", origin_label.clone()));
    span.set_attribute(KeyValue::new("http.path", path));

    let response = match capability {
        Capability::Liveness => handlers::ping(),
        Capability::Health => handlers::health(&state, &resolution.target).await,
        Capability::Query | Capability::QueryRange | Capability::FullProxy => {
            forward(&state, &resolution, request).await
        }
    };

    let status = response.status().as_u16();
    span.set_attribute(KeyValue::new("http.status_code", i64::from(status)));
    span.end();

    metrics::record_request(&origin_label, capability.as_str(), status, start);
    response
}

async fn forward(state: &AppState, resolution: &Resolution, request: Request<Body>) -> Response<Body> {
    let Some(moniker) = resolution.target.origin() else {
        return (StatusCode::NOT_FOUND, "no matching route").into_response();
    };
    let Some(origin) = state.config.origin(moniker) else {
        return handlers::unknown_origin(moniker);
    };

    match resolution.capability {
        Capability::Query | Capability::QueryRange => {
            handlers::query(state, moniker, origin, resolution, request).await
        }
        _ => handlers::full_proxy(state, moniker, origin, resolution, request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{cache_key, MemoryCache};
    use crate::config::OriginConfig;
    use crate::http::handlers::X_CACHE;
    use crate::observability::tracing::bootstrap;
    use axum::body::to_bytes;
    use axum::http::Method;
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    /// Origin that echoes the request path and query back as the body.
    async fn echo_origin() -> String {
        let app = Router::new().fallback(|request: Request<Body>| async move {
            let target = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_default();
            ([("content-type", "text/plain")], target)
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn server_for(origins: &[(&str, String)], default_origin: &str) -> HttpServer {
        let cache = Arc::new(MemoryCache::new());
        cache.connect().unwrap();
        server_with_cache(origins, default_origin, cache)
    }

    fn server_with_cache(
        origins: &[(&str, String)],
        default_origin: &str,
        cache: Arc<dyn Cache>,
    ) -> HttpServer {
        let mut config = Config::default();
        config.origins = origins
            .iter()
            .map(|(name, url)| {
                let origin = OriginConfig {
                    origin_url: url.clone(),
                    ..OriginConfig::default()
                };
                (name.to_string(), origin)
            })
            .collect::<BTreeMap<_, _>>();
        config.main.default_origin = Some(default_origin.to_string());

        let tracing = bootstrap(&config.tracing).unwrap();
        let router = Arc::new(OriginRouter::from_config(&config));
        HttpServer::new(AppState::new(Arc::new(config), router, cache, tracing.context))
    }

    async fn send(server: &HttpServer, method: Method, uri: &str) -> (StatusCode, String, Option<String>) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        let status = response.status();
        let cache = response
            .headers()
            .get(X_CACHE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), cache)
    }

    #[tokio::test]
    async fn test_ping() {
        let server = server_for(&[("default", "http://127.0.0.1:1".into())], "default");
        let (status, body, _) = send(&server, Method::GET, "/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn test_unmatched_is_404() {
        let server = server_for(&[("default", "http://127.0.0.1:1".into())], "default");
        let (status, body, _) = send(&server, Method::DELETE, "/anything").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "no matching route");
    }

    #[tokio::test]
    async fn test_request_id_is_set() {
        let server = server_for(&[("default", "http://127.0.0.1:1".into())], "default");
        let request = Request::builder().uri("/ping").body(Body::empty()).unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_origins_are_routed_by_moniker() {
        let a = echo_origin().await;
        let b = echo_origin().await;
        let server = server_for(&[("a", a), ("b", b)], "a");

        let (status, body, _) = send(&server, Method::GET, "/b/api/v1/query?query=up").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "/api/v1/query?query=up");

        let (_, body, _) = send(&server, Method::GET, "/a/api/v1/series?match=up").await;
        assert_eq!(body, "/api/v1/series?match=up");

        let (_, body, _) = send(&server, Method::GET, "/graph").await;
        assert_eq!(body, "/graph");
    }

    #[tokio::test]
    async fn test_query_is_cached() {
        let origin = echo_origin().await;
        let server = server_for(&[("default", origin)], "default");

        let (_, first, cache) = send(&server, Method::GET, "/api/v1/query_range?query=up").await;
        assert_eq!(cache.as_deref(), Some("miss"));
        let (_, second, cache) = send(&server, Method::GET, "/api/v1/query_range?query=up").await;
        assert_eq!(cache.as_deref(), Some("hit"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_counts_as_miss() {
        let origin = echo_origin().await;
        let cache = Arc::new(MemoryCache::new());
        cache.connect().unwrap();
        let key = cache_key("default", "query", "GET", "/api/v1/query?query=up", b"");
        cache
            .store(&key, b"{not json", std::time::Duration::from_secs(60))
            .unwrap();
        let server = server_with_cache(&[("default", origin)], "default", cache.clone());

        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _local = ::metrics::set_default_local_recorder(&recorder);

        let (status, body, x_cache) = send(&server, Method::GET, "/api/v1/query?query=up").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "/api/v1/query?query=up");
        assert_eq!(x_cache.as_deref(), Some("miss"));

        let rendered = handle.render();
        let lookups: Vec<&str> = rendered
            .lines()
            .filter(|line| line.starts_with("trickster_cache_lookups_total{"))
            .collect();
        assert_eq!(lookups.len(), 1, "rendered: {rendered}");
        assert!(lookups[0].contains("result=\"miss\""));
        assert!(lookups[0].ends_with(" 1"));

        // The fresh response replaced the unreadable entry.
        let (_, _, x_cache) = send(&server, Method::GET, "/api/v1/query?query=up").await;
        assert_eq!(x_cache.as_deref(), Some("hit"));
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let server = server_for(&[("default", url)], "default");
        let (status, body, _) = send(&server, Method::GET, "/api/v1/labels").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, "origin request failed");
    }

    #[tokio::test]
    async fn test_health_probes_origin() {
        let origin = echo_origin().await;
        let server = server_for(&[("default", origin)], "default");
        let (status, body, _) = send(&server, Method::GET, "/default/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "/api/v1/label/__name__/values");
    }
}
