use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use http::Method;
use tracing::{debug, error, info, warn};

use crate::context::RequestContext;
use crate::endpoint::Endpoint;
use crate::hooks::HookPipeline;
use crate::router::RouteTable;
use crate::static_files::StaticFiles;

/// Body written when an error hook itself fails.
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// How a request left the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Pre-hooks, endpoint and post-hooks all succeeded
    Completed,
    /// A pre-hook sent the response; the endpoint did not run
    ShortCircuited,
    /// No route matched; the 404 (or placeholder) reply was sent
    NotFound,
    /// Served from the public directory
    StaticFile,
    /// The error chain ran
    Failed,
}

/// Request state machine over a frozen route table and hook pipeline.
pub struct Dispatcher {
    routes: RouteTable,
    hooks: HookPipeline,
    static_files: Option<StaticFiles>,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, hooks: HookPipeline) -> Self {
        Self {
            routes,
            hooks,
            static_files: None,
        }
    }

    #[must_use]
    pub fn with_static_files(mut self, static_files: StaticFiles) -> Self {
        self.static_files = Some(static_files);
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    pub fn static_files(&self) -> Option<&StaticFiles> {
        self.static_files.as_ref()
    }

    /// Drive one request to completion. The response is sent, or deliberately
    /// left unsent when a failure produced nothing to say.
    pub fn dispatch(&self, ctx: &mut RequestContext) -> DispatchOutcome {
        let method = ctx.request().method().clone();
        let path = ctx.request().path().to_string();

        let Some(route) = self.routes.route(&method, &path) else {
            return self.unmatched(ctx, &method, &path);
        };
        let endpoint = Arc::clone(&route.endpoint);
        ctx.request_mut().set_path_params(route.path_params);

        match self.run_pipeline(ctx, endpoint.as_ref()) {
            Ok(outcome) => {
                if !ctx.response().is_sent() {
                    send_or_log(ctx);
                }
                debug!(
                    request_id = %ctx.request_id(),
                    endpoint = %endpoint.name(),
                    outcome = ?outcome,
                    status = ctx.response().status().as_u16(),
                    "Dispatch finished"
                );
                outcome
            }
            Err(err) => {
                self.handle_failure(ctx, Some(endpoint.as_ref()), &err);
                DispatchOutcome::Failed
            }
        }
    }

    fn run_pipeline(
        &self,
        ctx: &mut RequestContext,
        endpoint: &dyn Endpoint,
    ) -> anyhow::Result<DispatchOutcome> {
        let pre = self.hooks.compile_pre(ctx, endpoint);
        for hook in &pre {
            guarded("pre-hook", || hook.before(ctx))?;
            if ctx.response().is_sent() {
                info!(
                    request_id = %ctx.request_id(),
                    endpoint = %endpoint.name(),
                    status = ctx.response().status().as_u16(),
                    "Pre-hook short-circuited request"
                );
                return Ok(DispatchOutcome::ShortCircuited);
            }
        }

        guarded("endpoint", || endpoint.handle(ctx))?;

        let post = self.hooks.compile_post(ctx, endpoint);
        for hook in &post {
            guarded("post-hook", || hook.after(ctx))?;
        }
        Ok(DispatchOutcome::Completed)
    }

    fn unmatched(&self, ctx: &mut RequestContext, method: &Method, path: &str) -> DispatchOutcome {
        if let Some(static_files) = self.static_files.as_ref().filter(|_| *method == Method::GET) {
            match static_files.load(path) {
                Ok(Some((bytes, content_type))) => {
                    ctx.response_mut()
                        .set_header("content-type", content_type)
                        .set_content(bytes);
                    send_or_log(ctx);
                    return DispatchOutcome::StaticFile;
                }
                Ok(None) => {}
                Err(e) => {
                    let err = anyhow::Error::new(e)
                        .context(format!("failed to read static file {path}"));
                    self.handle_failure(ctx, None, &err);
                    return DispatchOutcome::Failed;
                }
            }
        }

        self.routes.write_unknown_route(ctx.response_mut());
        send_or_log(ctx);
        DispatchOutcome::NotFound
    }

    /// Run the error chain for `err`.
    ///
    /// The modified flag is reset first so only what the error hooks write
    /// counts: a modified response is sent, an untouched one is dropped and
    /// the connection closes without a reply. A failing error hook ends the
    /// chain with a 500.
    pub(crate) fn handle_failure(
        &self,
        ctx: &mut RequestContext,
        endpoint: Option<&dyn Endpoint>,
        err: &anyhow::Error,
    ) {
        warn!(
            request_id = %ctx.request_id(),
            endpoint = endpoint.map(|e| e.name()).unwrap_or("<unmatched>"),
            error = %format!("{err:#}"),
            "Request failed, running error hooks"
        );
        ctx.response_mut().reset_modified();

        let chain = self.hooks.compile_error(ctx, endpoint);
        for hook in &chain {
            if let Err(hook_err) = guarded("error hook", || hook.on_error(ctx, err)) {
                error!(
                    request_id = %ctx.request_id(),
                    error = %format!("{hook_err:#}"),
                    original_error = %format!("{err:#}"),
                    "Error hook failed"
                );
                if !ctx.response().is_sent() {
                    ctx.response_mut().set_status(500).text(INTERNAL_ERROR_BODY);
                    send_or_log(ctx);
                }
                return;
            }
        }

        if ctx.response().is_sent() {
            return;
        }
        if ctx.response().is_modified() {
            send_or_log(ctx);
        } else {
            warn!(
                request_id = %ctx.request_id(),
                error_hooks = chain.len(),
                "No error hook wrote a response, closing connection"
            );
        }
    }
}

fn send_or_log(ctx: &mut RequestContext) {
    if let Err(e) = ctx.send() {
        debug!(request_id = %ctx.request_id(), error = %e, "Failed to send response");
    }
}

/// Run a pipeline stage, turning a panic into an error.
fn guarded<F>(stage: &'static str, f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(stage, panic_message = %message, "Panic caught in request pipeline");
            Err(anyhow!("{stage} panicked: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
