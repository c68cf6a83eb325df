//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! [proxy_server] listen_address:listen_port
//!     → listener.rs (bind, fatal on failure)
//!     → Hand off to HTTP layer (axum::serve)
//! ```

pub mod listener;
