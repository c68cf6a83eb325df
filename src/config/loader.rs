//! Configuration loading from disk and the command line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use thiserror::Error;

use crate::config::schema::Config;
use crate::config::validation::{validate_config, ValidationError};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/trickster/trickster.conf";

/// Command line arguments. Flags override values from the config file.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "trickster")]
#[command(about = "Caching reverse proxy for Prometheus-compatible query APIs", long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// URL of the default origin.
    #[arg(long = "origin")]
    pub origin: Option<String>,

    /// Port for the proxy listener.
    #[arg(long = "proxy-port")]
    pub proxy_port: Option<u16>,

    /// Port for the metrics endpoint.
    #[arg(long = "metrics-port")]
    pub metrics_port: Option<u16>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR).
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    /// Instance id, used to suffix the log file.
    #[arg(long = "instance-id")]
    pub instance_id: Option<u32>,
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = read_config_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse configuration text without validating it.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Build the configuration from defaults, the config file, and CLI overrides.
///
/// A missing file is only tolerated at the default location.
pub fn load_configuration(args: &Args) -> Result<Config, ConfigError> {
    let mut config = match &args.config {
        Some(path) => read_config_file(path)?,
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                read_config_file(path)?
            } else {
                Config::default()
            }
        }
    };

    apply_overrides(&mut config, args);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(url) = &args.origin {
        let name = config.default_origin().to_string();
        config.origins.entry(name).or_default().origin_url = url.clone();
    }
    if let Some(port) = args.proxy_port {
        config.proxy_server.listen_port = port;
    }
    if let Some(port) = args.metrics_port {
        config.metrics.listen_port = port;
    }
    if let Some(level) = &args.log_level {
        config.logging.log_level = level.clone();
    }
    if let Some(id) = args.instance_id {
        config.main.instance_id = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CacheType, GlobalHealthCheck};
    use std::io::Write;

    const MULTI_ORIGIN: &str = r#"
        [main]
        default_origin = "a"

        [proxy_server]
        listen_port = 9191
        global_health_check = "all_origins"

        [cache]
        cache_type = "filesystem"
        reap_sleep_ms = 250

        [cache.filesystem]
        cache_path = "/var/cache/trickster"

        [origins.a]
        origin_url = "http://prom-a:9090"

        [origins.b]
        origin_url = "http://prom-b:9090"
        timeout_secs = 30

        [tracing]
        sampler_type = "Probability"
        sampler_fraction = 0.25
        exporter = "Jaeger"

        [tracing.jaeger]
        collector_endpoint = "http://jaeger:4318/v1/traces"

        [tracing.jaeger.tags]
        env = "prod"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(MULTI_ORIGIN).unwrap();

        assert_eq!(config.default_origin(), "a");
        assert_eq!(config.proxy_server.listen_port, 9191);
        assert_eq!(
            config.proxy_server.global_health_check,
            GlobalHealthCheck::AllOrigins
        );
        assert_eq!(config.caching.cache_type, CacheType::Filesystem);
        assert_eq!(config.caching.filesystem.cache_path, "/var/cache/trickster");
        assert_eq!(config.caching.reap_sleep_ms, 250);
        assert_eq!(config.origins.len(), 2);
        assert!(!config.origins.contains_key("default"));

        let b = config.origin("b").unwrap();
        assert_eq!(b.timeout_secs, 30);
        // Unset origin fields keep their defaults.
        assert_eq!(b.api_path, "/api/v1/");
        assert!(b.ignore_no_cache_header);

        assert_eq!(config.tracing.sampler_fraction, 0.25);
        assert_eq!(config.tracing.jaeger.process, "trickster");
        assert_eq!(config.tracing.jaeger.tags["env"], "prod");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.proxy_server.listen_port, 9090);
        assert_eq!(config.metrics.listen_port, 8082);
        assert_eq!(config.caching.record_ttl_secs, 21_600);
        assert_eq!(config.caching.reap_sleep_ms, 1_000);
        assert_eq!(config.tracing.sampler_type, "Never");
        assert!(config.origins.contains_key("default"));
    }

    #[test]
    fn test_unknown_cache_type_rejected() {
        let err = parse_config("[cache]\ncache_type = \"redis\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_configuration_applies_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MULTI_ORIGIN.as_bytes()).unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            origin: Some("http://override:9090".into()),
            proxy_port: Some(7000),
            metrics_port: Some(7001),
            log_level: Some("debug".into()),
            instance_id: Some(3),
        };
        let config = load_configuration(&args).unwrap();

        assert_eq!(config.origin("a").unwrap().origin_url, "http://override:9090");
        assert_eq!(config.origin("b").unwrap().origin_url, "http://prom-b:9090");
        assert_eq!(config.proxy_server.listen_port, 7000);
        assert_eq!(config.metrics.listen_port, 7001);
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.main.instance_id, Some(3));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/trickster.conf")),
            ..Args::default()
        };
        assert!(matches!(
            load_configuration(&args),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_load_config_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[tracing]\nsampler_fraction = 2.0\n").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("sampler_fraction"));
    }
}
