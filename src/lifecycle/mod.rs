//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Logger → Profiler → Metrics → Cache → Tracing → Router → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Flush spans → Close cache → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing listens until every fatal stage has passed
//! - Ordered shutdown: release in reverse acquisition order
//! - Resources are held by drop guards so early returns release them too

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{CacheGuard, Shutdown};
pub use startup::{Ready, Sequencer, Stage, StartupError};
