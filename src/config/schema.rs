//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! every section carries `#[serde(default)]` so a minimal file is enough.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default path segment prefix of the Prometheus HTTP API.
pub const DEFAULT_API_PATH: &str = "/api/v1/";

/// Name of the origin created when no origins are configured.
pub const DEFAULT_ORIGIN_NAME: &str = "default";

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Cache backend selection and settings.
    #[serde(rename = "cache")]
    pub caching: CachingConfig,

    /// Logger output and level.
    pub logging: LoggingConfig,

    /// Process-wide settings.
    pub main: GeneralConfig,

    /// Prometheus metrics endpoint.
    pub metrics: MetricsConfig,

    /// Diagnostic profiler endpoint.
    pub profiler: ProfilerConfig,

    /// Upstream origins keyed by moniker.
    pub origins: BTreeMap<String, OriginConfig>,

    /// Main proxy listener.
    pub proxy_server: ProxyServerConfig,

    /// Distributed tracing.
    pub tracing: TracingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut origins = BTreeMap::new();
        origins.insert(DEFAULT_ORIGIN_NAME.to_string(), OriginConfig::default());

        Self {
            caching: CachingConfig::default(),
            logging: LoggingConfig::default(),
            main: GeneralConfig::default(),
            metrics: MetricsConfig::default(),
            profiler: ProfilerConfig::default(),
            origins,
            proxy_server: ProxyServerConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

impl Config {
    /// Look up an origin by moniker.
    pub fn origin(&self, moniker: &str) -> Option<&OriginConfig> {
        self.origins.get(moniker)
    }

    /// Moniker of the origin serving unscoped requests.
    ///
    /// An explicit `main.default_origin` wins. Otherwise an origin literally named
    /// `default` is used, and failing that the only configured origin. Validation
    /// rejects configurations where none of these apply.
    pub fn default_origin(&self) -> &str {
        if let Some(name) = self.main.default_origin.as_deref() {
            return name;
        }
        if self.origins.contains_key(DEFAULT_ORIGIN_NAME) || self.origins.len() != 1 {
            return DEFAULT_ORIGIN_NAME;
        }
        self.origins
            .keys()
            .next()
            .map(String::as_str)
            .unwrap_or(DEFAULT_ORIGIN_NAME)
    }
}

/// General process settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Unique id when several instances share a host; suffixes the log file.
    pub instance_id: Option<u32>,

    /// Origin used for unscoped paths (`/api/v1/...`, `/health`, catch-all).
    pub default_origin: Option<String>,
}

/// Main HTTP listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyServerConfig {
    /// IP address to bind; empty binds all interfaces.
    pub listen_address: String,

    /// TCP port to bind.
    pub listen_port: u16,

    /// What the unscoped `/health` route checks.
    pub global_health_check: GlobalHealthCheck,
}

impl Default for ProxyServerConfig {
    fn default() -> Self {
        Self {
            listen_address: String::new(),
            listen_port: 9090,
            global_health_check: GlobalHealthCheck::DefaultOrigin,
        }
    }
}

/// Target of the unscoped `/health` route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GlobalHealthCheck {
    /// Probe only the default origin.
    #[default]
    DefaultOrigin,
    /// Probe every configured origin.
    AllOrigins,
}

/// Supported cache backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    #[default]
    Memory,
    Filesystem,
}

/// Cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CachingConfig {
    /// Backend to use.
    pub cache_type: CacheType,

    /// Lifetime of a cached response in seconds.
    pub record_ttl_secs: u64,

    /// Pause between sweeps for expired entries. 0 disables the sweep.
    pub reap_sleep_ms: u64,

    /// Filesystem backend settings.
    pub filesystem: FilesystemCacheConfig,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::Memory,
            record_ttl_secs: 21_600,
            reap_sleep_ms: 1_000,
            filesystem: FilesystemCacheConfig::default(),
        }
    }
}

/// Filesystem cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilesystemCacheConfig {
    /// Directory holding cache files.
    pub cache_path: String,
}

impl Default for FilesystemCacheConfig {
    fn default() -> Self {
        Self {
            cache_path: "/tmp/trickster".to_string(),
        }
    }
}

/// A Prometheus origin fronted by the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the origin, e.g. `http://prometheus:9090/`.
    pub origin_url: String,

    /// API path prefix on the origin.
    pub api_path: String,

    /// Serve from cache even when the client sends `Cache-Control: no-cache`.
    pub ignore_no_cache_header: bool,

    /// Oldest datapoint age worth caching.
    pub max_value_age_secs: u64,

    /// Disable fetching the most recent window on range queries.
    pub fast_forward_disable: bool,

    /// Recent window never served from cache.
    pub no_cache_last_data_secs: u64,

    /// Upper bound for a single origin request.
    pub timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            origin_url: "http://prometheus:9090/".to_string(),
            api_path: DEFAULT_API_PATH.to_string(),
            ignore_no_cache_header: true,
            max_value_age_secs: 86_400,
            fast_forward_disable: false,
            no_cache_last_data_secs: 0,
            timeout_secs: 180,
        }
    }
}

impl OriginConfig {
    /// API path with a leading slash and no trailing slash (`/api/v1`).
    pub fn api_base(&self) -> String {
        let trimmed = self.api_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    /// Absolute URL for a path (with optional query) on this origin.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.origin_url.trim_end_matches('/'), path_and_query)
    }

    /// Path probed by health checks.
    pub fn health_path(&self) -> String {
        format!("{}/label/__name__/values", self.api_base())
    }
}

/// Metrics endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// IP address to bind; empty binds all interfaces.
    pub listen_address: String,

    /// TCP port serving `/metrics`.
    pub listen_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_address: String::new(),
            listen_port: 8082,
        }
    }
}

/// Diagnostic profiler endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub enabled: bool,
    pub listen_port: u16,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_port: 6060,
        }
    }
}

/// Logger settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file path; empty logs to the console.
    pub log_file: String,

    /// Most verbose level to emit (TRACE, DEBUG, INFO, WARN, ERROR).
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: String::new(),
            log_level: "INFO".to_string(),
        }
    }
}

/// Distributed tracing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// `Always`, `Never` or `Probability`. Anything else samples nothing.
    pub sampler_type: String,

    /// Sampling probability, only read for `Probability`.
    pub sampler_fraction: f64,

    /// `Jaeger` or `None`.
    pub exporter: String,

    pub jaeger: JaegerConfig,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            sampler_type: "Never".to_string(),
            sampler_fraction: 0.0,
            exporter: "None".to_string(),
            jaeger: JaegerConfig::default(),
        }
    }
}

/// Jaeger export settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JaegerConfig {
    /// `host:port` of the agent, used when no collector endpoint is set.
    pub agent_endpoint: String,

    /// Full URL of the collector; takes precedence over the agent.
    pub collector_endpoint: String,

    /// Basic-auth user, optional.
    pub username: String,

    /// Basic-auth password, optional.
    pub password: String,

    /// Service name reported with every span batch.
    pub process: String,

    /// Spans buffered before dropping; 0 keeps the exporter default.
    pub buffer_max_count: usize,

    /// Static tags attached to every span batch.
    pub tags: BTreeMap<String, String>,
}

impl Default for JaegerConfig {
    fn default() -> Self {
        Self {
            agent_endpoint: "localhost:6831".to_string(),
            collector_endpoint: String::new(),
            username: String::new(),
            password: String::new(),
            process: "trickster".to_string(),
            buffer_max_count: 0,
            tags: BTreeMap::new(),
        }
    }
}
