use tracing::info;

use super::{PostHook, PreHook};
use crate::context::RequestContext;

/// Logs request start and completion with the correlation id.
///
/// Register the same instance as both a pre- and a post-hook:
///
/// ```rust,ignore
/// let tracing = Arc::new(TracingHook);
/// pipeline.add_pre_hook(HookEntry::<dyn PreHook>::shared(Arc::clone(&tracing)))?;
/// pipeline.add_post_hook(HookEntry::<dyn PostHook>::shared(tracing))?;
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHook;

impl PreHook for TracingHook {
    fn before(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        let req = ctx.request();
        info!(
            request_id = %ctx.request_id(),
            method = %req.method(),
            path = %req.path(),
            "Request started"
        );
        Ok(())
    }
}

impl PostHook for TracingHook {
    fn after(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        info!(
            request_id = %ctx.request_id(),
            method = %ctx.request().method(),
            path = %ctx.request().path(),
            status = ctx.response().status().as_u16(),
            latency_ms = ctx.elapsed().as_millis() as u64,
            "Request completed"
        );
        Ok(())
    }
}
