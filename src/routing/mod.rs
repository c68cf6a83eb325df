//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (ordered rule scan)
//!     → matcher.rs (evaluate path pattern, capture moniker)
//!     → Return: Resolution (origin, capability, remainder) or NoMatch
//!
//! Route Compilation (at startup):
//!     Config (origin monikers, default origin, health mode)
//!     → standard rule table, most specific first
//!     → Freeze as immutable OriginRouter
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (exact and prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (declared order)
//! - Origin-scoped rules precede unscoped ones

pub mod matcher;
pub mod router;

pub use router::{Capability, OriginRouter, PathBase, Resolution, RouteRule, Target};
