//! # Router Module
//!
//! The route table binds `(method, pattern)` pairs to endpoints and resolves
//! inbound requests against them.
//!
//! ## Patterns
//!
//! Patterns are regular expressions. A pattern given as a string is anchored
//! at both ends (`/widgets` compiles to `^/widgets$`); a pattern given as a
//! pre-built [`regex::Regex`] is used verbatim. Named capture groups become
//! path parameters:
//!
//! ```rust,ignore
//! use brrtkit::router::RouteTable;
//! use http::Method;
//!
//! let mut table = RouteTable::new();
//! table.register(Method::GET, r"/widgets/(?<id>\d+)", endpoint)?;
//!
//! let m = table.route(&Method::GET, "/widgets/42").unwrap();
//! assert_eq!(m.get_path_param("id"), Some("42"));
//! ```
//!
//! ## Ordering and uniqueness
//!
//! - Matching scans routes in registration order; the first match wins.
//! - Registering the same `(method, pattern source)` twice is a startup
//!   [`ConfigError`](crate::error::ConfigError).
//! - The table is populated before serving starts and is read-only afterwards,
//!   so lookups take no lock.

mod core;
#[cfg(test)]
mod tests;

pub use core::{
    ParamVec, RouteMatch, RoutePattern, RouteTable, MAX_INLINE_PARAMS, NOT_FOUND_BODY,
    PLACEHOLDER_BODY,
};
