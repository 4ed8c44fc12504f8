//! Startup registration API.
//!
//! Everything registered here is validated immediately; a duplicate route or
//! hook, an invalid pattern or a missing public directory is returned as a
//! [`ConfigError`] before any request is served. [`App::build`] freezes the
//! registries into an [`AppService`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::dispatcher::Dispatcher;
use crate::endpoint::Endpoint;
use crate::error::ConfigError;
use crate::hooks::{ErrorHook, HookEntry, HookPipeline, PostHook, PreHook};
use crate::router::{RoutePattern, RouteTable};
use crate::server::{AppService, RequestLimits};
use crate::session::{
    SessionDelegate, SessionHook, SessionOptions, SessionPersistHook, SessionStore,
    SessionSweeper,
};
use crate::static_files::StaticFiles;

pub struct App {
    routes: RouteTable,
    hooks: HookPipeline,
    clock: Arc<dyn Clock>,
    sessions: Arc<SessionStore>,
    sweep_interval: Option<Duration>,
    static_files: Option<StaticFiles>,
    limits: RequestLimits,
    read_timeout: Option<Duration>,
}

impl Default for App {
    fn default() -> Self {
        Self {
            routes: RouteTable::new(),
            hooks: HookPipeline::new(),
            clock: Arc::new(SystemClock),
            sessions: Arc::new(SessionStore::new()),
            sweep_interval: None,
            static_files: None,
            limits: RequestLimits::default(),
            read_timeout: None,
        }
    }
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock used by sessions registered after this call.
    pub fn with_clock(&mut self, clock: Arc<dyn Clock>) -> &mut Self {
        self.clock = clock;
        self
    }

    pub fn route(
        &mut self,
        method: Method,
        pattern: impl Into<RoutePattern>,
        endpoint: Arc<dyn Endpoint>,
    ) -> Result<&mut Self, ConfigError> {
        self.routes.register(method, pattern, endpoint)?;
        Ok(self)
    }

    pub fn pre_hook(&mut self, hook: HookEntry<dyn PreHook>) -> Result<&mut Self, ConfigError> {
        info!(hook = hook.id().name(), "Global pre-hook registered");
        self.hooks.add_pre_hook(hook)?;
        Ok(self)
    }

    pub fn post_hook(&mut self, hook: HookEntry<dyn PostHook>) -> Result<&mut Self, ConfigError> {
        info!(hook = hook.id().name(), "Global post-hook registered");
        self.hooks.add_post_hook(hook)?;
        Ok(self)
    }

    pub fn error_hook(&mut self, hook: HookEntry<dyn ErrorHook>) -> Result<&mut Self, ConfigError> {
        info!(hook = hook.id().name(), "Global error hook registered");
        self.hooks.add_error_hook(hook)?;
        Ok(self)
    }

    /// Enable sessions: registers [`SessionHook`] as the next global pre-hook,
    /// [`SessionPersistHook`] as the next global post-hook, and a sweeper that
    /// starts with the server.
    pub fn with_sessions(
        &mut self,
        options: &SessionOptions,
        delegate: Option<Arc<dyn SessionDelegate>>,
    ) -> Result<&mut Self, ConfigError> {
        if options.ttl.is_zero() || options.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "session ttl and sweep interval must be non-zero".into(),
            ));
        }
        let mut hook = SessionHook::new(Arc::clone(&self.sessions), Arc::clone(&self.clock), options);
        if let Some(delegate) = delegate {
            hook = hook.with_delegate(delegate);
        }
        info!(
            cookie = %hook.cookie_name(),
            ttl_secs = options.ttl.as_secs(),
            sweep_interval_secs = options.sweep_interval.as_secs(),
            "Sessions enabled"
        );
        self.hooks.add_pre_hook(HookEntry::<dyn PreHook>::instance(hook))?;
        self.hooks
            .add_post_hook(HookEntry::<dyn PostHook>::instance(SessionPersistHook))?;
        self.sweep_interval = Some(options.sweep_interval);
        Ok(self)
    }

    /// Serve files under `dir` for GET requests no route matches.
    pub fn serve_public_dir(&mut self, dir: impl Into<PathBuf>) -> Result<&mut Self, ConfigError> {
        let static_files = StaticFiles::new(dir)?;
        info!(dir = %static_files.base_dir().display(), "Public directory registered");
        self.static_files = Some(static_files);
        Ok(self)
    }

    pub fn limits(&mut self, limits: RequestLimits) -> &mut Self {
        self.limits = limits;
        self
    }

    pub fn read_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn session_store(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn build(self) -> AppService {
        let mut dispatcher = Dispatcher::new(self.routes, self.hooks);
        if let Some(static_files) = self.static_files {
            dispatcher = dispatcher.with_static_files(static_files);
        }
        let mut service =
            AppService::new(dispatcher, Arc::clone(&self.sessions)).with_limits(self.limits);
        if let Some(timeout) = self.read_timeout {
            service = service.with_read_timeout(timeout);
        }
        if let Some(interval) = self.sweep_interval {
            service = service.with_sweeper(Arc::new(SessionSweeper::new(self.sessions, interval)));
        }
        service
    }
}
