//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (default origin references an existing origin)
//! - Validate value ranges (ports, sampler fraction)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::Config;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no origins configured")]
    NoOrigins,

    #[error("default origin '{0}' is not a configured origin")]
    UnknownDefaultOrigin(String),

    #[error("several origins configured; set main.default_origin")]
    AmbiguousDefaultOrigin,

    #[error("origin moniker '{0}' must be a non-empty path segment")]
    InvalidMoniker(String),

    #[error("origin '{moniker}' has invalid origin_url '{url}': {reason}")]
    InvalidOriginUrl {
        moniker: String,
        url: String,
        reason: String,
    },

    #[error("sampler_fraction {0} is outside [0, 1]")]
    SamplerFraction(f64),

    #[error("{0} listen_port must not be 0")]
    ZeroPort(&'static str),
}

/// Check a loaded configuration, collecting every problem found.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.origins.is_empty() {
        errors.push(ValidationError::NoOrigins);
    } else if !config.origins.contains_key(config.default_origin()) {
        if config.main.default_origin.is_some() {
            errors.push(ValidationError::UnknownDefaultOrigin(
                config.default_origin().to_string(),
            ));
        } else {
            errors.push(ValidationError::AmbiguousDefaultOrigin);
        }
    }

    for (moniker, origin) in &config.origins {
        if moniker.is_empty() || moniker.contains('/') {
            errors.push(ValidationError::InvalidMoniker(moniker.clone()));
        }
        if let Err(reason) = check_origin_url(&origin.origin_url) {
            errors.push(ValidationError::InvalidOriginUrl {
                moniker: moniker.clone(),
                url: origin.origin_url.clone(),
                reason,
            });
        }
    }

    let fraction = config.tracing.sampler_fraction;
    if !(0.0..=1.0).contains(&fraction) {
        errors.push(ValidationError::SamplerFraction(fraction));
    }

    if config.proxy_server.listen_port == 0 {
        errors.push(ValidationError::ZeroPort("proxy_server"));
    }
    if config.metrics.listen_port == 0 {
        errors.push(ValidationError::ZeroPort("metrics"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// The upstream client speaks plain HTTP only.
fn check_origin_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}
