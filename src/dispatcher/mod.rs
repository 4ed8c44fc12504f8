//! # Dispatcher Module
//!
//! Drives one parsed request through the pipeline:
//!
//! 1. Route lookup. A miss serves a public file for GET when a public
//!    directory is configured, otherwise the 404 (or zero-config placeholder)
//!    reply.
//! 2. Global then local pre-hooks, in order. A pre-hook that sends the
//!    response stops the pipeline before the endpoint runs.
//! 3. The endpoint.
//! 4. Global then local post-hooks.
//! 5. An unsent response is sent as-is.
//!
//! ## Error Handling
//!
//! Any error or panic raised by a hook or the endpoint diverts to the
//! endpoint's compiled error chain with the error attached. Failures before
//! a route is known (static file I/O) run the fallback chain of global error
//! hooks. The framework writes nothing by itself: if no error hook touches
//! the response, the connection is closed without a reply. An error hook
//! that fails ends the chain with a plain `500`.

mod core;

pub use self::core::{DispatchOutcome, Dispatcher, INTERNAL_ERROR_BODY};
