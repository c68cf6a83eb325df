//! Caching reverse proxy for Prometheus-compatible query APIs.

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::Config;
pub use http::HttpServer;
pub use lifecycle::{Sequencer, Shutdown};
pub use routing::OriginRouter;
