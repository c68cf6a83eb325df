//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, dispatch)
//!     → [routing layer resolves origin + capability]
//!     → handlers.rs (liveness, health, cached query, full proxy)
//!     → upstream.rs (origin request with timeout)
//!     → Send to client (gzip when accepted)
//! ```

pub mod handlers;
pub mod server;
pub mod upstream;

pub use server::{AppState, HttpServer};
pub use upstream::{UpstreamClient, UpstreamError};
