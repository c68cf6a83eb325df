//! Diagnostic endpoint.
//!
//! Serves runtime diagnostics on a dedicated port when `[profiler] enabled`
//! is set. The endpoint runs beside the proxy and never affects it: a bind
//! failure is logged and the task ends.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::runtime::Handle;

/// Runtime snapshot served at `/debug/pprof/runtime`.
#[derive(Debug, Serialize)]
pub struct RuntimeReport {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub workers: usize,
    pub alive_tasks: usize,
    pub global_queue_depth: usize,
}

#[derive(Clone)]
struct ProfilerState {
    started: Instant,
}

/// Router for the diagnostic endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/debug/pprof/", get(index))
        .route("/debug/pprof/runtime", get(runtime_report))
        .with_state(ProfilerState {
            started: Instant::now(),
        })
}

/// Spawn the diagnostic endpoint on `port`.
pub fn spawn_endpoint(handle: &Handle, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    handle.spawn(async move {
        tracing::info!(port, "profiler http endpoint starting");
        if let Err(e) = serve(addr).await {
            tracing::error!(port, detail = %e, "error starting profiler http server");
        }
    });
}

async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router()).await
}

async fn index() -> &'static str {
    "/debug/pprof/runtime\truntime worker and task counts\n"
}

async fn runtime_report(State(state): State<ProfilerState>) -> Json<RuntimeReport> {
    let metrics = Handle::current().metrics();
    Json(RuntimeReport {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
        workers: metrics.num_workers(),
        alive_tasks: metrics.num_alive_tasks(),
        global_queue_depth: metrics.global_queue_depth(),
    })
}
