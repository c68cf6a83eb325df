//! Startup orchestration.
//!
//! # Responsibilities
//! - Bring subsystems up in dependency order
//! - Start background endpoints (profiler, metrics) without waiting on them
//! - Stop at the first fatal stage, before any listener is bound
//! - Release acquired resources on every exit path
//!
//! # Design Decisions
//! - Fail fast: cache, tracing and listener errors are fatal, with no retry
//! - Subsystems initialize in order, not concurrently
//! - The listener starts last (traffic only when ready)
//! - Cleanup runs in reverse: spans are flushed before the cache closes

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Runtime;

use crate::cache::{self, Cache, CacheError};
use crate::config::Config;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::shutdown::CacheGuard;
use crate::lifecycle::signals::shutdown_signal;
use crate::net::listener::{self, bind_address, ListenerError};
use crate::observability::tracing::{bootstrap, TracingBootstrap, TracingContext, TracingError, TracingShutdown};
use crate::observability::{logging, metrics, profiler};
use crate::routing::OriginRouter;

/// Startup stages, in the order they complete.
///
/// The async runtime is built while entering `ProfilerStarted`, the first
/// stage that spawns work on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    LoggerReady = 1,
    ProfilerStarted = 2,
    MetricsReady = 3,
    CacheConnected = 4,
    TracerReady = 5,
    RouterBuilt = 6,
    Serving = 7,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoggerReady => "logger_ready",
            Stage::ProfilerStarted => "profiler_started",
            Stage::MetricsReady => "metrics_ready",
            Stage::CacheConnected => "cache_connected",
            Stage::TracerReady => "tracer_ready",
            Stage::RouterBuilt => "router_built",
            Stage::Serving => "serving",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal startup or serving failure.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("unable to connect to cache: {0}")]
    Cache(#[from] CacheError),

    #[error("unable to initialize tracing: {0}")]
    Tracing(#[from] TracingError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

impl StartupError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            StartupError::Runtime(_) => Stage::ProfilerStarted,
            StartupError::Cache(_) => Stage::CacheConnected,
            StartupError::Tracing(_) => Stage::TracerReady,
            StartupError::Listener(_) => Stage::Serving,
        }
    }
}

fn advance(stage: Stage) {
    tracing::debug!(stage = %stage, "Startup stage complete");
    metrics::record_startup_stage(stage as u8);
}

fn fatal(error: StartupError) -> StartupError {
    tracing::error!(stage = %error.stage(), detail = %error, "Fatal startup error");
    error
}

/// Drives the process from configuration to serving.
pub struct Sequencer {
    config: Arc<Config>,
    cache: Option<Arc<dyn Cache>>,
}

impl Sequencer {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            cache: None,
        }
    }

    /// Use `cache` instead of the backend named in `[cache]`.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run every stage up to (not including) binding the listener.
    ///
    /// Must be called outside an async context: it builds and owns the runtime.
    pub fn prepare(self) -> Result<Ready, StartupError> {
        let config = self.config;

        logging::init_logging(&config.logging, config.main.instance_id);
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            origins = config.origins.len(),
            "trickster starting"
        );
        advance(Stage::LoggerReady);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("trickster-worker")
            .build()
            .map_err(|e| fatal(StartupError::Runtime(e)))?;

        if config.profiler.enabled {
            profiler::spawn_endpoint(runtime.handle(), config.profiler.listen_port);
            advance(Stage::ProfilerStarted);
        }

        let metrics_addr = bind_address(&config.metrics.listen_address, config.metrics.listen_port);
        match metrics_addr.parse::<SocketAddr>() {
            Ok(addr) => metrics::spawn_endpoint(runtime.handle(), addr),
            Err(e) => tracing::error!(
                address = %metrics_addr,
                detail = %e,
                "error starting metrics http endpoint"
            ),
        }
        advance(Stage::MetricsReady);

        let cache = self
            .cache
            .unwrap_or_else(|| cache::from_config(&config.caching));
        let cache_guard = CacheGuard::connect(cache)
            .map_err(|e| fatal(e.into()))?
            .with_reaper(
                runtime.handle(),
                Duration::from_millis(config.caching.reap_sleep_ms),
            );
        advance(Stage::CacheConnected);

        let TracingBootstrap { context, shutdown } =
            bootstrap(&config.tracing).map_err(|e| fatal(e.into()))?;
        advance(Stage::TracerReady);

        let router = Arc::new(OriginRouter::from_config(&config));
        tracing::info!(
            rules = router.rules().len(),
            default_origin = router.default_origin(),
            "Router built"
        );
        advance(Stage::RouterBuilt);

        Ok(Ready {
            config,
            router,
            tracing: context,
            trace_shutdown: shutdown,
            cache_guard,
            runtime,
        })
    }

    /// Start up and serve until SIGINT or SIGTERM.
    pub fn run(self) -> Result<(), StartupError> {
        self.prepare()?.serve()
    }
}

/// Fully initialized process, ready to accept traffic.
///
/// Dropping it flushes spans, then closes the cache, then stops the runtime.
pub struct Ready {
    config: Arc<Config>,
    router: Arc<OriginRouter>,
    tracing: TracingContext,
    trace_shutdown: TracingShutdown,
    cache_guard: CacheGuard,
    runtime: Runtime,
}

impl Ready {
    pub fn router(&self) -> &OriginRouter {
        &self.router
    }

    pub fn tracing(&self) -> &TracingContext {
        &self.tracing
    }

    pub fn cache(&self) -> Arc<dyn Cache> {
        self.cache_guard.cache()
    }

    /// Serve until SIGINT or SIGTERM.
    pub fn serve(self) -> Result<(), StartupError> {
        self.serve_until(shutdown_signal())
    }

    /// Bind the listener and serve until `shutdown` resolves.
    pub fn serve_until<F>(self, shutdown: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ready {
            config,
            router,
            tracing: context,
            mut trace_shutdown,
            cache_guard,
            runtime,
        } = self;

        let state = AppState::new(Arc::clone(&config), router, cache_guard.cache(), context);
        let result = runtime.block_on(async move {
            let listener = listener::bind(&config.proxy_server).await?;
            advance(Stage::Serving);
            HttpServer::new(state)
                .run(listener, shutdown)
                .await
                .map_err(ListenerError::Serve)?;
            Ok::<(), StartupError>(())
        });

        let result = result.map_err(fatal);
        trace_shutdown.shutdown();
        drop(cache_guard);
        drop(runtime);
        if result.is_ok() {
            tracing::info!("Shutdown complete");
        }
        result
    }
}
