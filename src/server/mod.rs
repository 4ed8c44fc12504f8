//! HTTP/1.x plumbing: request parsing, response emission, the per-server
//! service and the coroutine accept loop.
//!
//! Every connection carries exactly one request and is closed after the reply.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{
    parse_cookies, ContentType, HeaderValue, QueryParams, Request, RequestLimits,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES,
};
pub use response::{
    ChunkedWriter, HeaderVec, IntoHeaders, Payload, Reply, Response, CONTENT_TYPE_JSON,
    CONTENT_TYPE_TEXT, MAX_INLINE_HEADERS,
};
pub use service::AppService;
