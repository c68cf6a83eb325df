//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + command line flags
//!     → loader.rs (parse, deserialize, apply flag overrides)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{Args, ConfigError};
pub use schema::{
    CacheType, CachingConfig, Config, GlobalHealthCheck, JaegerConfig, LoggingConfig,
    OriginConfig, ProxyServerConfig, TracingConfig,
};
