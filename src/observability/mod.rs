//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (sampled spans per routed request)
//!
//! Consumers:
//!     → Log output (stdout or per-instance file)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Distributed tracing (optional, Jaeger)
//!     → profiler.rs diagnostic endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging with event/detail fields for machine parsing
//! - Metrics are cheap (atomic increments)
//! - Tracing is off by default (Never sampler, no exporter)
//! - Metrics and profiler endpoints run in the background and never block startup

pub mod logging;
pub mod metrics;
pub mod profiler;
pub mod tracing;
