use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use crate::context::RequestContext;
use crate::endpoint::Endpoint;
use crate::error::ConfigError;

/// Runs before the endpoint. Writing *and sending* a response stops the
/// pipeline: the dispatcher checks `is_sent()` after every pre-hook.
pub trait PreHook: Send + Sync {
    fn before(&self, ctx: &mut RequestContext) -> anyhow::Result<()>;
}

/// Runs after the endpoint returned successfully.
pub trait PostHook: Send + Sync {
    fn after(&self, ctx: &mut RequestContext) -> anyhow::Result<()>;
}

/// Runs when a pre-hook, the endpoint, or a post-hook failed.
pub trait ErrorHook: Send + Sync {
    fn on_error(&self, ctx: &mut RequestContext, error: &anyhow::Error) -> anyhow::Result<()>;
}

/// Identity of a hook type, used for duplicate detection and exclusions.
#[derive(Clone, Copy)]
pub struct HookId {
    type_id: TypeId,
    name: &'static str,
}

impl HookId {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for HookId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for HookId {}

impl Hash for HookId {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

type Factory<H> = Arc<dyn Fn(&RequestContext) -> Box<H> + Send + Sync>;

/// How a registered hook is obtained for a request.
pub enum HookSource<H: ?Sized> {
    /// Fresh instance per request, built with the request's context in hand.
    Factory(Factory<H>),
    /// One instance shared by every request. Must be stateless or synchronized.
    Instance(Arc<H>),
}

impl<H: ?Sized> Clone for HookSource<H> {
    fn clone(&self) -> Self {
        match self {
            HookSource::Factory(make) => HookSource::Factory(Arc::clone(make)),
            HookSource::Instance(hook) => HookSource::Instance(Arc::clone(hook)),
        }
    }
}

/// A registered hook: its identity plus where instances come from.
pub struct HookEntry<H: ?Sized> {
    id: HookId,
    source: HookSource<H>,
}

impl<H: ?Sized> Clone for HookEntry<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            source: self.source.clone(),
        }
    }
}

impl<H: ?Sized> fmt::Debug for HookEntry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.source {
            HookSource::Factory(_) => "factory",
            HookSource::Instance(_) => "instance",
        };
        f.debug_struct("HookEntry")
            .field("id", &self.id)
            .field("kind", &kind)
            .finish()
    }
}

impl<H: ?Sized> HookEntry<H> {
    pub fn id(&self) -> HookId {
        self.id
    }

    pub fn source(&self) -> &HookSource<H> {
        &self.source
    }

    fn resolve(&self, ctx: &RequestContext) -> CompiledHook<H> {
        match &self.source {
            HookSource::Factory(make) => CompiledHook::Owned(make(ctx)),
            HookSource::Instance(hook) => CompiledHook::Shared(Arc::clone(hook)),
        }
    }
}

macro_rules! hook_entry_constructors {
    ($trait:ident) => {
        impl HookEntry<dyn $trait> {
            /// Register a constructor; a new `T` is built for every request.
            pub fn factory<T, F>(make: F) -> Self
            where
                T: $trait + 'static,
                F: Fn(&RequestContext) -> T + Send + Sync + 'static,
            {
                Self {
                    id: HookId::of::<T>(),
                    source: HookSource::Factory(Arc::new(move |ctx: &RequestContext| {
                        Box::new(make(ctx)) as Box<dyn $trait>
                    })),
                }
            }

            /// Register a single instance reused across requests.
            pub fn instance<T: $trait + 'static>(hook: T) -> Self {
                Self::shared(Arc::new(hook))
            }

            /// Like [`Self::instance`], keeping a handle for the caller.
            pub fn shared<T: $trait + 'static>(hook: Arc<T>) -> Self {
                Self {
                    id: HookId::of::<T>(),
                    source: HookSource::Instance(hook),
                }
            }
        }
    };
}

hook_entry_constructors!(PreHook);
hook_entry_constructors!(PostHook);
hook_entry_constructors!(ErrorHook);

/// A hook ready to run for one request.
pub enum CompiledHook<H: ?Sized> {
    Owned(Box<H>),
    Shared(Arc<H>),
}

impl<H: ?Sized> Deref for CompiledHook<H> {
    type Target = H;

    fn deref(&self) -> &H {
        match self {
            CompiledHook::Owned(hook) => hook,
            CompiledHook::Shared(hook) => hook,
        }
    }
}

/// Fail when two entries in the same list share an identity.
pub fn ensure_unique<H: ?Sized>(
    entries: &[HookEntry<H>],
    list: &'static str,
) -> Result<(), ConfigError> {
    for (i, entry) in entries.iter().enumerate() {
        if entries[..i].iter().any(|e| e.id == entry.id) {
            return Err(ConfigError::DuplicateHook {
                name: entry.id.name(),
                list,
            });
        }
    }
    Ok(())
}

/// Build the execution list for one request: global hooks in registration
/// order minus `excluded`, then every local hook in declaration order.
pub fn compile<H: ?Sized>(
    ctx: &RequestContext,
    global: &[HookEntry<H>],
    excluded: &[HookId],
    local: &[HookEntry<H>],
) -> Vec<CompiledHook<H>> {
    let mut compiled = Vec::with_capacity(global.len() + local.len());
    for entry in global {
        if excluded.contains(&entry.id) {
            debug!(
                request_id = %ctx.request_id(),
                hook = entry.id.name(),
                "Global hook excluded by endpoint"
            );
            continue;
        }
        compiled.push(entry.resolve(ctx));
    }
    compiled.extend(local.iter().map(|entry| entry.resolve(ctx)));
    compiled
}

/// An ordered global hook list of one kind.
pub struct HookList<H: ?Sized> {
    kind: &'static str,
    entries: Vec<HookEntry<H>>,
}

impl<H: ?Sized> HookList<H> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// [`ConfigError::DuplicateHook`] when an entry with the same identity is
    /// already registered in this list.
    pub fn push(&mut self, entry: HookEntry<H>) -> Result<(), ConfigError> {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return Err(ConfigError::DuplicateHook {
                name: entry.id.name(),
                list: self.kind,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[HookEntry<H>] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = HookId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Global pre/post/error registries, filled before serving starts.
pub struct HookPipeline {
    pre: HookList<dyn PreHook>,
    post: HookList<dyn PostHook>,
    error: HookList<dyn ErrorHook>,
}

impl Default for HookPipeline {
    fn default() -> Self {
        Self {
            pre: HookList::new("global pre"),
            post: HookList::new("global post"),
            error: HookList::new("global error"),
        }
    }
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre_hook(&mut self, entry: HookEntry<dyn PreHook>) -> Result<(), ConfigError> {
        self.pre.push(entry)
    }

    pub fn add_post_hook(&mut self, entry: HookEntry<dyn PostHook>) -> Result<(), ConfigError> {
        self.post.push(entry)
    }

    pub fn add_error_hook(&mut self, entry: HookEntry<dyn ErrorHook>) -> Result<(), ConfigError> {
        self.error.push(entry)
    }

    pub fn pre_hooks(&self) -> &HookList<dyn PreHook> {
        &self.pre
    }

    pub fn post_hooks(&self) -> &HookList<dyn PostHook> {
        &self.post
    }

    pub fn error_hooks(&self) -> &HookList<dyn ErrorHook> {
        &self.error
    }

    pub fn compile_pre(
        &self,
        ctx: &RequestContext,
        endpoint: &dyn Endpoint,
    ) -> Vec<CompiledHook<dyn PreHook>> {
        compile(
            ctx,
            self.pre.entries(),
            endpoint.excluded_global_pre_hooks(),
            endpoint.local_pre_hooks(),
        )
    }

    pub fn compile_post(
        &self,
        ctx: &RequestContext,
        endpoint: &dyn Endpoint,
    ) -> Vec<CompiledHook<dyn PostHook>> {
        compile(
            ctx,
            self.post.entries(),
            endpoint.excluded_global_post_hooks(),
            endpoint.local_post_hooks(),
        )
    }

    /// Error chain for a request. Without an endpoint (failure before
    /// matching) this is the fallback chain: global hooks only, no exclusions.
    pub fn compile_error(
        &self,
        ctx: &RequestContext,
        endpoint: Option<&dyn Endpoint>,
    ) -> Vec<CompiledHook<dyn ErrorHook>> {
        match endpoint {
            Some(ep) => compile(
                ctx,
                self.error.entries(),
                ep.excluded_global_error_hooks(),
                ep.local_error_hooks(),
            ),
            None => compile(ctx, self.error.entries(), &[], &[]),
        }
    }
}
