//! Error types for startup configuration, request parsing and the session subsystem.
//!
//! Startup failures ([`ConfigError`]) are returned synchronously by registration
//! APIs and are never produced while serving. Everything raised while a request
//! is in flight is carried through hooks and endpoints as [`anyhow::Error`];
//! the typed errors below convert into it with `?` and can be recovered in an
//! error hook with `downcast_ref`.

use std::path::PathBuf;

use http::Method;
use thiserror::Error;

/// Fatal startup error: duplicate registrations, invalid patterns, missing directories.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `(method, pattern)` is already bound in the route table
    #[error("route {method} {pattern} is already registered")]
    DuplicateRoute { method: Method, pattern: String },

    /// Pattern source does not compile as a regular expression
    #[error("invalid route pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The same hook identity appears twice in one hook list
    #[error("hook {name} is already registered in the {list} hook list")]
    DuplicateHook { name: &'static str, list: &'static str },

    /// A directory handed to the server does not exist
    #[error("directory {} does not exist", path.display())]
    MissingDirectory { path: PathBuf },

    /// Configuration file could not be read or deserialized
    #[error("failed to load configuration from {}: {message}", path.display())]
    Load { path: PathBuf, message: String },

    /// Configuration values are out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure to interpret the inbound request.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The peer closed the connection without sending a request line
    #[error("connection closed before a request was received")]
    ConnectionClosed,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unsupported HTTP version {0}")]
    UnsupportedVersion(String),

    #[error("request head exceeds {limit} bytes")]
    HeadersTooLarge { limit: usize },

    #[error("request body of {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: usize, limit: usize },

    /// The connection closed or timed out before the body was complete
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("request body is not valid UTF-8")]
    NotUtf8,

    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("request body is JSON but not an object")]
    NotAnObject,
}

/// Lookup failures on the per-request item store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("required context item {0} is missing")]
    MissingItem(&'static str),

    #[error("context item {0} is already attached")]
    DuplicateItem(&'static str),
}

/// Failures emitting the response.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response has already been sent")]
    AlreadySent,

    #[error("failed to serialize response payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write response: {0}")]
    Io(#[from] std::io::Error),
}

/// Session registry and backing-store failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} is already registered")]
    DuplicateId(String),

    #[error("session delegate failed for {uuid}: {source}")]
    Delegate {
        uuid: String,
        #[source]
        source: anyhow::Error,
    },
}
