//! The demo application served by `brrtkit serve`.

use std::sync::Arc;

use http::Method;
use serde_json::json;

use crate::app::App;
use crate::config::ServerConfig;
use crate::context::RequestContext;
use crate::endpoint::FnEndpoint;
use crate::error::{ConfigError, ParseError};
use crate::hooks::{ErrorHook, HookEntry, MetricsHook, PostHook, PreHook, TracingHook};
use crate::server::Reply;
use crate::session::{MemorySessionDelegate, SessionDelegate};

/// Answers every failure with a JSON body; request parsing errors are `400`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonErrorHook;

impl ErrorHook for JsonErrorHook {
    fn on_error(&self, ctx: &mut RequestContext, error: &anyhow::Error) -> anyhow::Result<()> {
        let status = if error.downcast_ref::<ParseError>().is_some() {
            400
        } else {
            500
        };
        let body = json!({
            "error": format!("{error:#}"),
            "request_id": ctx.request_id().to_string(),
        });
        ctx.response_mut()
            .reply_with(Reply::new().status(status).payload(body))?;
        Ok(())
    }
}

/// Build the demo app from `config`. Returns the shared metrics handle too.
pub fn build_demo_app(config: &ServerConfig) -> Result<(App, Arc<MetricsHook>), ConfigError> {
    let mut app = App::new();
    app.limits(config.limits()).read_timeout(config.read_timeout());

    let tracing = Arc::new(TracingHook);
    let metrics = Arc::new(MetricsHook::new());
    let delegate: Arc<dyn SessionDelegate> = Arc::new(MemorySessionDelegate::new());

    app.pre_hook(HookEntry::<dyn PreHook>::shared(Arc::clone(&tracing)))?
        .with_sessions(&config.session_options(), Some(delegate))?
        .post_hook(HookEntry::<dyn PostHook>::shared(tracing))?
        .post_hook(HookEntry::<dyn PostHook>::shared(Arc::clone(&metrics)))?
        .error_hook(HookEntry::<dyn ErrorHook>::shared(Arc::clone(&metrics)))?
        .error_hook(HookEntry::<dyn ErrorHook>::instance(JsonErrorHook))?;

    let health = FnEndpoint::new("health", |ctx| {
        ctx.response_mut().json(&json!({ "status": "ok" }))?;
        Ok(())
    })
    .exclude_pre_hook::<crate::session::SessionHook>()
    .exclude_post_hook::<crate::session::SessionPersistHook>();

    let metrics_handle = Arc::clone(&metrics);
    let metrics_endpoint = FnEndpoint::new("metrics", move |ctx| {
        let body = metrics_handle.render();
        ctx.response_mut()
            .set_header("content-type", "text/plain; version=0.0.4")
            .set_content(body);
        Ok(())
    })
    .exclude_pre_hook::<crate::session::SessionHook>()
    .exclude_post_hook::<crate::session::SessionPersistHook>()
    .exclude_post_hook::<MetricsHook>();

    let session_echo = FnEndpoint::new("session_echo", |ctx| {
        let session = ctx
            .session()
            .ok_or_else(|| anyhow::anyhow!("session hook did not run"))?;
        let visits = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
        session.set("visits", visits);
        ctx.response_mut().json(&json!({
            "session": session.uuid(),
            "visits": visits,
            "data": session.data(),
        }))?;
        Ok(())
    });

    let create_widget = FnEndpoint::new("create_widget", |ctx| {
        let body = ctx.request_mut().body_as_json()?;
        let name = body
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("unnamed")
            .to_string();
        ctx.response_mut()
            .reply_with(Reply::new().status(201).payload(json!({ "name": name, "widget": body })))?;
        Ok(())
    });

    let get_widget = FnEndpoint::new("get_widget", |ctx| {
        let id = ctx.request().path_param("id").unwrap_or_default().to_string();
        ctx.response_mut().json(&json!({ "id": id }))?;
        Ok(())
    });

    app.route(Method::GET, "/health", health.into_arc())?
        .route(Method::GET, "/metrics", metrics_endpoint.into_arc())?
        .route(Method::GET, "/session", session_echo.into_arc())?
        .route(Method::POST, "/widgets", create_widget.into_arc())?
        .route(Method::GET, r"/widgets/(?<id>\d+)", get_widget.into_arc())?;

    if let Some(dir) = &config.public_dir {
        app.serve_public_dir(dir)?;
    }
    Ok((app, metrics))
}
