//! Application handlers bound to routes.
//!
//! An [`Endpoint`] carries its business logic plus its hook configuration:
//! which global hooks it opts out of and which local hooks it always runs.

use crate::context::RequestContext;
use crate::hooks::{ErrorHook, HookEntry, HookId, PostHook, PreHook};
use std::sync::Arc;

pub trait Endpoint: Send + Sync {
    fn handle(&self, ctx: &mut RequestContext) -> anyhow::Result<()>;

    /// Name used in logs and route listings.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn excluded_global_pre_hooks(&self) -> &[HookId] {
        &[]
    }

    fn excluded_global_post_hooks(&self) -> &[HookId] {
        &[]
    }

    fn excluded_global_error_hooks(&self) -> &[HookId] {
        &[]
    }

    fn local_pre_hooks(&self) -> &[HookEntry<dyn PreHook>] {
        &[]
    }

    fn local_post_hooks(&self) -> &[HookEntry<dyn PostHook>] {
        &[]
    }

    fn local_error_hooks(&self) -> &[HookEntry<dyn ErrorHook>] {
        &[]
    }
}

type HandlerFn = dyn Fn(&mut RequestContext) -> anyhow::Result<()> + Send + Sync;

/// Closure-backed endpoint with builder-style hook configuration.
///
/// ```rust,ignore
/// let ep = FnEndpoint::new("create_widget", |ctx| {
///     ctx.response_mut().json(&serde_json::json!({ "ok": true }))?;
///     Ok(())
/// })
/// .exclude_pre_hook::<AuthHook>()
/// .with_post_hook(HookEntry::<dyn PostHook>::instance(AuditHook));
/// ```
pub struct FnEndpoint {
    name: String,
    handler: Box<HandlerFn>,
    excluded_pre: Vec<HookId>,
    excluded_post: Vec<HookId>,
    excluded_error: Vec<HookId>,
    local_pre: Vec<HookEntry<dyn PreHook>>,
    local_post: Vec<HookEntry<dyn PostHook>>,
    local_error: Vec<HookEntry<dyn ErrorHook>>,
}

impl FnEndpoint {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Box::new(handler),
            excluded_pre: Vec::new(),
            excluded_post: Vec::new(),
            excluded_error: Vec::new(),
            local_pre: Vec::new(),
            local_post: Vec::new(),
            local_error: Vec::new(),
        }
    }

    /// Opt out of the global pre-hook of type `T`.
    #[must_use]
    pub fn exclude_pre_hook<T: ?Sized + 'static>(mut self) -> Self {
        self.excluded_pre.push(HookId::of::<T>());
        self
    }

    #[must_use]
    pub fn exclude_post_hook<T: ?Sized + 'static>(mut self) -> Self {
        self.excluded_post.push(HookId::of::<T>());
        self
    }

    #[must_use]
    pub fn exclude_error_hook<T: ?Sized + 'static>(mut self) -> Self {
        self.excluded_error.push(HookId::of::<T>());
        self
    }

    #[must_use]
    pub fn with_pre_hook(mut self, hook: HookEntry<dyn PreHook>) -> Self {
        self.local_pre.push(hook);
        self
    }

    #[must_use]
    pub fn with_post_hook(mut self, hook: HookEntry<dyn PostHook>) -> Self {
        self.local_post.push(hook);
        self
    }

    #[must_use]
    pub fn with_error_hook(mut self, hook: HookEntry<dyn ErrorHook>) -> Self {
        self.local_error.push(hook);
        self
    }

    pub fn into_arc(self) -> Arc<dyn Endpoint> {
        Arc::new(self)
    }
}

impl Endpoint for FnEndpoint {
    fn handle(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        (self.handler)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn excluded_global_pre_hooks(&self) -> &[HookId] {
        &self.excluded_pre
    }

    fn excluded_global_post_hooks(&self) -> &[HookId] {
        &self.excluded_post
    }

    fn excluded_global_error_hooks(&self) -> &[HookId] {
        &self.excluded_error
    }

    fn local_pre_hooks(&self) -> &[HookEntry<dyn PreHook>] {
        &self.local_pre
    }

    fn local_post_hooks(&self) -> &[HookEntry<dyn PostHook>] {
        &self.local_post
    }

    fn local_error_hooks(&self) -> &[HookEntry<dyn ErrorHook>] {
        &self.local_error
    }
}
