//! # brrtkit
//!
//! **brrtkit** is a coroutine-powered HTTP server framework: a regex route
//! table, a layered hook pipeline around every endpoint, and TTL-bounded
//! cookie sessions, all running on the `may` runtime.
//!
//! ## Architecture
//!
//! - **[`app`]** - Startup registration; validates routes, hooks and sessions eagerly
//! - **[`router`]** - Ordered `(method, regex)` route table with named path parameters
//! - **[`hooks`]** - Pre/post/error hook traits, exclusion and per-request compilation
//! - **[`dispatcher`]** - Runs the pipeline for one request and owns failure handling
//! - **[`context`]** - Per-request state: request, response, correlation id, typed items
//! - **[`session`]** - Sessions, the shared store, the sweeper and the session hooks
//! - **[`server`]** - HTTP/1.x parsing, response emission and the accept loop
//! - **[`static_files`]** - Public directory served for unmatched GET requests
//! - **[`config`]**, **[`logging`]**, **[`runtime_config`]** - YAML + env configuration
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as HttpServer<br/>(may coroutine)
//!     participant Dispatcher
//!     participant Pre as Pre-hooks
//!     participant Endpoint
//!     participant Post as Post-hooks
//!     participant Err as Error hooks
//!
//!     Client->>Server: GET /widgets/42
//!     Server->>Server: Parse head (400 on failure)
//!     Server->>Dispatcher: dispatch(ctx)
//!     Dispatcher->>Dispatcher: RouteTable::route(method, path)
//!     alt No route
//!         Dispatcher-->>Client: static file or placeholder 404
//!     end
//!     Dispatcher->>Pre: compiled global (minus exclusions) + local
//!     alt Response sent by a pre-hook
//!         Pre-->>Client: short-circuit
//!     end
//!     Dispatcher->>Endpoint: handle(ctx)
//!     Dispatcher->>Post: compiled global (minus exclusions) + local
//!     alt Any step fails or panics
//!         Dispatcher->>Err: reset response, run error chain
//!         Err-->>Client: response if modified, else close
//!     end
//!     Dispatcher-->>Client: send (gzip when a body is present)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use brrtkit::app::App;
//! use brrtkit::endpoint::FnEndpoint;
//! use brrtkit::server::HttpServer;
//! use brrtkit::session::SessionOptions;
//! use http::Method;
//!
//! let mut app = App::new();
//! app.with_sessions(&SessionOptions::default(), None)?
//!     .route(
//!         Method::GET,
//!         "/hello",
//!         FnEndpoint::new("hello", |ctx| {
//!             ctx.response_mut().text("hello");
//!             Ok(())
//!         })
//!         .into_arc(),
//!     )?;
//! let handle = HttpServer(app.build()).start("127.0.0.1:8080")?;
//! handle.join().ok();
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Runtime Considerations
//!
//! brrtkit uses the `may` coroutine runtime, not tokio. Each connection is
//! served in its own coroutine and carries exactly one request. Coroutine
//! stack size is configurable via `BRRTKIT_STACK_SIZE`.

pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod hooks;
pub mod ids;
pub mod logging;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod session;
pub mod static_files;
pub mod testing;

pub use app::App;
pub use context::RequestContext;
pub use endpoint::{Endpoint, FnEndpoint};
pub use error::{ConfigError, ContextError, ParseError, ResponseError, SessionError};
pub use ids::RequestId;
