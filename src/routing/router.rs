//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store the ordered rule table
//! - Resolve a request (method, path) to an origin and capability
//! - Return the resolution or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan over a short, fixed rule list
//! - Rule order is the only tie-break; first match wins
//! - A method mismatch falls through to later rules

use std::collections::HashSet;
use std::fmt;

use axum::http::Method;

use crate::config::{Config, GlobalHealthCheck, OriginConfig};
use crate::routing::matcher::PathPattern;

/// Path prefix of the Prometheus HTTP API as seen by clients.
pub const API_V1: &str = "/api/v1";

/// Kind of operation a matched route represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Process liveness, no origin involved.
    Liveness,
    Health,
    QueryRange,
    Query,
    FullProxy,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Liveness => "liveness",
            Capability::Health => "health",
            Capability::QueryRange => "query_range",
            Capability::Query => "query",
            Capability::FullProxy => "full_proxy",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule picks its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginSelection {
    /// No origin (liveness).
    None,
    /// Moniker captured from the first path segment.
    FromPath,
    /// The configured default origin.
    Default,
    /// Every configured origin.
    All,
}

/// What the remainder of a resolution is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathBase {
    /// Remainder follows the origin's API path.
    Api,
    /// Remainder is a full path on the origin.
    Root,
}

/// One entry of the routing table.
#[derive(Debug, Clone)]
pub struct RouteRule {
    /// Rule identifier for logging.
    pub name: &'static str,
    pub pattern: PathPattern,
    pub methods: Vec<Method>,
    pub capability: Capability,
    pub origin: OriginSelection,
    pub base: PathBase,
}

impl RouteRule {
    fn new(
        name: &'static str,
        pattern: PathPattern,
        methods: &[Method],
        capability: Capability,
        origin: OriginSelection,
        base: PathBase,
    ) -> Self {
        Self {
            name,
            pattern,
            methods: methods.to_vec(),
            capability,
            origin,
            base,
        }
    }
}

/// Origin(s) a resolution targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    None,
    Origin(String),
    AllOrigins,
}

impl Target {
    /// Moniker of a single-origin target.
    pub fn origin(&self) -> Option<&str> {
        match self {
            Target::Origin(moniker) => Some(moniker),
            Target::None | Target::AllOrigins => None,
        }
    }
}

/// Result of routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Name of the rule that matched.
    pub rule: &'static str,
    pub target: Target,
    pub capability: Capability,
    /// Path left after the matched prefix (`/unknown` for `/{m}/api/v1/unknown`).
    pub remainder: String,
    pub base: PathBase,
}

impl Resolution {
    /// Path to request on `origin`, without the query string.
    pub fn upstream_path(&self, origin: &OriginConfig) -> String {
        match self.base {
            PathBase::Api => format!("{}{}", origin.api_base(), self.remainder),
            PathBase::Root => self.remainder.clone(),
        }
    }
}

/// Ordered routing table resolving requests to origins and capabilities.
#[derive(Debug, Clone)]
pub struct OriginRouter {
    rules: Vec<RouteRule>,
    monikers: HashSet<String>,
    default_origin: String,
}

impl OriginRouter {
    /// Build the standard table for a validated configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            standard_rules(config.proxy_server.global_health_check),
            config.origins.keys().cloned(),
            config.default_origin(),
        )
    }

    /// Build a router from an explicit rule table.
    pub fn new(
        rules: Vec<RouteRule>,
        monikers: impl IntoIterator<Item = String>,
        default_origin: impl Into<String>,
    ) -> Self {
        Self {
            rules,
            monikers: monikers.into_iter().collect(),
            default_origin: default_origin.into(),
        }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn default_origin(&self) -> &str {
        &self.default_origin
    }

    /// Resolve a request. `None` only when no rule matches at all.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<Resolution> {
        self.rules.iter().find_map(|rule| {
            if !rule.methods.contains(method) {
                return None;
            }
            let captures = rule.pattern.matches(path, &self.monikers)?;

            let target = match rule.origin {
                OriginSelection::None => Target::None,
                OriginSelection::FromPath => Target::Origin(captures.moniker?.to_string()),
                OriginSelection::Default => Target::Origin(self.default_origin.clone()),
                OriginSelection::All => Target::AllOrigins,
            };

            let remainder = match rule.base {
                PathBase::Api => captures.rest.strip_prefix(API_V1).unwrap_or(captures.rest),
                PathBase::Root => captures.rest,
            };

            Some(Resolution {
                rule: rule.name,
                target,
                capability: rule.capability,
                remainder: remainder.to_string(),
                base: rule.base,
            })
        })
    }
}

/// The proxy's routing table, most specific rules first.
pub fn standard_rules(global_health: GlobalHealthCheck) -> Vec<RouteRule> {
    use Capability as C;
    use OriginSelection as O;

    let get = [Method::GET];
    let get_post = [Method::GET, Method::POST];
    let api_prefix = format!("{API_V1}/");
    let query_range = format!("{API_V1}/query_range");
    let query = format!("{API_V1}/query");
    let global_health = match global_health {
        GlobalHealthCheck::DefaultOrigin => O::Default,
        GlobalHealthCheck::AllOrigins => O::All,
    };

    vec![
        RouteRule::new("ping", PathPattern::exact("/ping"), &get, C::Liveness, O::None, PathBase::Root),
        RouteRule::new("origin_health", PathPattern::scoped_exact("/health"), &get, C::Health, O::FromPath, PathBase::Root),
        RouteRule::new("health", PathPattern::exact("/health"), &get, C::Health, global_health, PathBase::Root),
        RouteRule::new("origin_query_range", PathPattern::scoped_exact(query_range.clone()), &get_post, C::QueryRange, O::FromPath, PathBase::Api),
        RouteRule::new("origin_query", PathPattern::scoped_exact(query.clone()), &get_post, C::Query, O::FromPath, PathBase::Api),
        RouteRule::new("origin_proxy", PathPattern::scoped_prefix(api_prefix.clone()), &get, C::FullProxy, O::FromPath, PathBase::Api),
        RouteRule::new("query_range", PathPattern::exact(query_range), &get_post, C::QueryRange, O::Default, PathBase::Api),
        RouteRule::new("query", PathPattern::exact(query), &get_post, C::Query, O::Default, PathBase::Api),
        RouteRule::new("proxy", PathPattern::prefix(api_prefix), &get, C::FullProxy, O::Default, PathBase::Api),
        RouteRule::new("catch_all", PathPattern::any(), &get, C::FullProxy, O::Default, PathBase::Root),
    ]
}
