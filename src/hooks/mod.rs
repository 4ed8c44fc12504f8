//! # Hooks
//!
//! Middleware units that run around endpoint execution.
//!
//! - [`PreHook`] runs before the endpoint and may short-circuit by sending a
//!   response.
//! - [`PostHook`] runs after the endpoint succeeded.
//! - [`ErrorHook`] runs with the triggering error when anything before it
//!   failed.
//!
//! Hooks are registered as a [`HookEntry`], either a factory (fresh instance
//! per request, built from the request's context) or a shared instance.
//! [`HookPipeline`] holds the global lists; each [`Endpoint`](crate::endpoint::Endpoint)
//! may exclude global hooks by [`HookId`] and add local hooks that always run
//! after the global ones.

mod core;
mod metrics;
mod tracing;

pub use self::core::{
    compile, ensure_unique, CompiledHook, ErrorHook, HookEntry, HookId, HookList, HookPipeline,
    HookSource, PostHook, PreHook,
};
pub use self::metrics::MetricsHook;
pub use self::tracing::TracingHook;
