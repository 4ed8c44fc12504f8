//! Route table core - registration and the matching hot path.

use crate::endpoint::Endpoint;
use crate::error::ConfigError;
use crate::hooks::ensure_unique;
use crate::server::Response;
use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the hot path.
///
/// Param names use `Arc<str>` because they come from the compiled route
/// (known at startup); values are per-request data from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Body written when no route matches.
pub const NOT_FOUND_BODY: &str = "Not Found";
/// Placeholder body served in zero-configuration mode (empty route table).
pub const PLACEHOLDER_BODY: &str = "Hello, World!";

/// Route pattern as supplied by the caller.
///
/// A plain string is regex source and gets anchored at both ends. A compiled
/// [`Regex`] is used verbatim, named capture groups included.
#[derive(Debug, Clone)]
pub enum RoutePattern {
    Source(String),
    Compiled(Regex),
}

impl From<&str> for RoutePattern {
    fn from(s: &str) -> Self {
        RoutePattern::Source(s.to_string())
    }
}

impl From<String> for RoutePattern {
    fn from(s: String) -> Self {
        RoutePattern::Source(s)
    }
}

impl From<Regex> for RoutePattern {
    fn from(re: Regex) -> Self {
        RoutePattern::Compiled(re)
    }
}

impl RoutePattern {
    /// Source string used for uniqueness checks.
    pub fn source(&self) -> &str {
        match self {
            RoutePattern::Source(s) => s,
            RoutePattern::Compiled(re) => re.as_str(),
        }
    }

    fn compile(self) -> Result<(String, Regex), ConfigError> {
        match self {
            RoutePattern::Compiled(re) => Ok((re.as_str().to_string(), re)),
            RoutePattern::Source(source) => {
                // Grouped so alternations stay anchored on both sides
                let anchored = format!("^(?:{source})$");
                let regex = Regex::new(&anchored).map_err(|e| ConfigError::InvalidPattern {
                    pattern: source.clone(),
                    source: e,
                })?;
                Ok((source, regex))
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Arc<str>,
    regex: Regex,
    param_names: Vec<Arc<str>>,
    endpoint: Arc<dyn Endpoint>,
}

/// Result of matching a request against the table.
#[derive(Clone)]
pub struct RouteMatch {
    pub method: Method,
    /// Pattern source the route was registered with
    pub pattern: Arc<str>,
    pub endpoint: Arc<dyn Endpoint>,
    /// Named captures, in pattern order
    pub path_params: ParamVec,
}

impl std::fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("endpoint", &self.endpoint.name())
            .field("path_params", &self.path_params)
            .finish()
    }
}

impl RouteMatch {
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Ordered `(method, pattern) -> endpoint` bindings.
///
/// Written during startup only; matching is a linear scan in registration
/// order and the first hit wins, so overlapping patterns must be registered
/// most-specific first.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `endpoint` to `(method, pattern)`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateRoute`] when the pair already exists,
    /// [`ConfigError::InvalidPattern`] when the pattern does not compile, and
    /// [`ConfigError::DuplicateHook`] when the endpoint declares the same local
    /// hook twice.
    pub fn register(
        &mut self,
        method: Method,
        pattern: impl Into<RoutePattern>,
        endpoint: Arc<dyn Endpoint>,
    ) -> Result<(), ConfigError> {
        let pattern = pattern.into();
        if self
            .routes
            .iter()
            .any(|r| r.method == method && r.pattern.as_ref() == pattern.source())
        {
            return Err(ConfigError::DuplicateRoute {
                method,
                pattern: pattern.source().to_string(),
            });
        }

        ensure_unique(endpoint.local_pre_hooks(), "local pre")?;
        ensure_unique(endpoint.local_post_hooks(), "local post")?;
        ensure_unique(endpoint.local_error_hooks(), "local error")?;

        let (source, regex) = pattern.compile()?;
        let param_names = regex
            .capture_names()
            .flatten()
            .map(Arc::from)
            .collect::<Vec<_>>();

        info!(
            method = %method,
            pattern = %source,
            endpoint = %endpoint.name(),
            path_params = ?param_names,
            routes_count = self.routes.len() + 1,
            "Route registered"
        );

        self.routes.push(Route {
            method,
            pattern: Arc::from(source),
            regex,
            param_names,
            endpoint,
        });
        Ok(())
    }

    /// First route, in registration order, whose method and pattern match.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        debug!(method = %method, path = %path, "Route match attempt");
        let match_start = std::time::Instant::now();

        for route in self.routes.iter().filter(|r| r.method == *method) {
            let Some(caps) = route.regex.captures(path) else {
                continue;
            };
            let path_params: ParamVec = route
                .param_names
                .iter()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (Arc::clone(name), m.as_str().to_string()))
                })
                .collect();

            info!(
                method = %method,
                path = %path,
                route_pattern = %route.pattern,
                endpoint = %route.endpoint.name(),
                path_params = ?path_params,
                duration_us = match_start.elapsed().as_micros(),
                "Route matched"
            );
            return Some(RouteMatch {
                method: route.method.clone(),
                pattern: Arc::clone(&route.pattern),
                endpoint: Arc::clone(&route.endpoint),
                path_params,
            });
        }

        warn!(
            method = %method,
            path = %path,
            duration_us = match_start.elapsed().as_micros(),
            "No route matched"
        );
        None
    }

    /// Write the fallback reply for an unmatched request.
    ///
    /// An empty table means the server runs in zero-configuration mode and
    /// answers every request with a placeholder greeting.
    pub fn write_unknown_route(&self, res: &mut Response) {
        if self.routes.is_empty() {
            res.set_status(200);
            res.text(PLACEHOLDER_BODY);
        } else {
            res.set_status(404);
            res.text(NOT_FOUND_BODY);
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// `(method, pattern, endpoint name)` for every route, in match order.
    pub fn entries(&self) -> impl Iterator<Item = (&Method, &str, &str)> {
        self.routes
            .iter()
            .map(|r| (&r.method, r.pattern.as_ref(), r.endpoint.name()))
    }

    /// Print all registered routes to stdout
    pub fn dump_routes(&self) {
        println!("[routes] count={}", self.routes.len());
        for (method, pattern, endpoint) in self.entries() {
            println!("[route] {method} {pattern} -> {endpoint}");
        }
    }
}
