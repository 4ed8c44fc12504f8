//! Integration tests for the request pipeline
//!
//! # Test Coverage
//!
//! - Global/local hook ordering and per-endpoint exclusion
//! - Pre-hook short-circuit
//! - Error chain: silent close, modified replies, failing error hooks, panics
//! - End-to-end session cookie flow with a local post-hook

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use brrtkit::app::App;
use brrtkit::clock::ManualClock;
use brrtkit::context::RequestContext;
use brrtkit::dispatcher::INTERNAL_ERROR_BODY;
use brrtkit::endpoint::FnEndpoint;
use brrtkit::hooks::{ErrorHook, HookEntry, PostHook, PreHook};
use brrtkit::server::Reply;
use brrtkit::session::SessionOptions;
use common::{cookie_value, roundtrip, CallLog, CountingHook, OtherRecorder, Recorder};
use http::Method;
use serde_json::json;

struct RejectUnauthenticated;

impl PreHook for RejectUnauthenticated {
    fn before(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        if ctx.request().header("authorization").is_none() {
            ctx.response_mut().set_status(401).text("missing credentials");
            ctx.send()?;
        }
        Ok(())
    }
}

struct LocalPre(CallLog);

impl PreHook for LocalPre {
    fn before(&self, _ctx: &mut RequestContext) -> anyhow::Result<()> {
        self.0.push("pre:local");
        Ok(())
    }
}

struct FailingErrorHook;

impl ErrorHook for FailingErrorHook {
    fn on_error(&self, _ctx: &mut RequestContext, _error: &anyhow::Error) -> anyhow::Result<()> {
        anyhow::bail!("error hook exploded")
    }
}

struct WriteErrorBody;

impl ErrorHook for WriteErrorBody {
    fn on_error(&self, ctx: &mut RequestContext, error: &anyhow::Error) -> anyhow::Result<()> {
        ctx.response_mut()
            .reply_with(Reply::new().status(503).payload(json!({ "error": error.to_string() })))?;
        Ok(())
    }
}

fn logging_endpoint(log: &CallLog) -> FnEndpoint {
    let log = log.clone();
    FnEndpoint::new("logged", move |ctx| {
        log.push("endpoint");
        ctx.response_mut().text("ok");
        Ok(())
    })
}

#[test]
fn test_hook_order_and_exclusion() {
    let log = CallLog::default();
    let mut app = App::new();
    app.pre_hook(HookEntry::<dyn PreHook>::instance(Recorder { name: "a", log: log.clone() }))
        .unwrap()
        .pre_hook(HookEntry::<dyn PreHook>::instance(OtherRecorder { name: "b", log: log.clone() }))
        .unwrap()
        .post_hook(HookEntry::<dyn PostHook>::instance(Recorder { name: "a", log: log.clone() }))
        .unwrap()
        .post_hook(HookEntry::<dyn PostHook>::instance(OtherRecorder { name: "b", log: log.clone() }))
        .unwrap();

    let endpoint = logging_endpoint(&log)
        .exclude_pre_hook::<OtherRecorder>()
        .exclude_post_hook::<Recorder>()
        .with_pre_hook(HookEntry::<dyn PreHook>::factory({
            let log = log.clone();
            move |_ctx: &RequestContext| LocalPre(log.clone())
        }))
        .with_post_hook(HookEntry::<dyn PostHook>::instance(CountingHook::default()));
    app.route(Method::GET, "/items", endpoint.into_arc()).unwrap();

    let raw = roundtrip(&app.build(), b"GET /items HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 200);
    assert_eq!(raw.body_text(), "ok");
    assert_eq!(raw.header("x-post-count"), Some("1"));
    assert_eq!(log.entries(), vec!["pre:a", "pre:local", "endpoint", "post:b"]);
}

#[test]
fn test_excluding_unregistered_hook_is_harmless() {
    let log = CallLog::default();
    let mut app = App::new();
    app.pre_hook(HookEntry::<dyn PreHook>::instance(Recorder { name: "a", log: log.clone() }))
        .unwrap();
    let endpoint = logging_endpoint(&log).exclude_pre_hook::<OtherRecorder>();
    app.route(Method::GET, "/", endpoint.into_arc()).unwrap();

    roundtrip(&app.build(), b"GET / HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(log.entries(), vec!["pre:a", "endpoint"]);
}

#[test]
fn test_duplicate_global_hook_rejected() {
    let log = CallLog::default();
    let mut app = App::new();
    app.pre_hook(HookEntry::<dyn PreHook>::instance(Recorder { name: "a", log: log.clone() }))
        .unwrap();
    let err = app
        .pre_hook(HookEntry::<dyn PreHook>::instance(Recorder { name: "again", log }))
        .err()
        .unwrap();
    assert!(matches!(err, brrtkit::ConfigError::DuplicateHook { .. }));
}

#[test]
fn test_pre_hook_short_circuit_skips_endpoint_and_post_hooks() {
    let log = CallLog::default();
    let mut app = App::new();
    app.pre_hook(HookEntry::<dyn PreHook>::instance(RejectUnauthenticated))
        .unwrap()
        .pre_hook(HookEntry::<dyn PreHook>::instance(Recorder { name: "a", log: log.clone() }))
        .unwrap()
        .post_hook(HookEntry::<dyn PostHook>::instance(OtherRecorder { name: "b", log: log.clone() }))
        .unwrap()
        .route(Method::GET, "/secret", logging_endpoint(&log).into_arc())
        .unwrap();
    let service = app.build();

    let raw = roundtrip(&service, b"GET /secret HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 401);
    assert_eq!(raw.body_text(), "missing credentials");
    assert!(log.entries().is_empty());

    let raw = roundtrip(&service, b"GET /secret HTTP/1.1\r\nAuthorization: yes\r\n\r\n").unwrap();
    assert_eq!(raw.status, 200);
    assert_eq!(log.entries(), vec!["pre:a", "endpoint", "post:b"]);
}

#[test]
fn test_unhandled_error_closes_without_reply() {
    let log = CallLog::default();
    let mut app = App::new();
    app.error_hook(HookEntry::<dyn ErrorHook>::instance(Recorder { name: "a", log: log.clone() }))
        .unwrap()
        .route(
            Method::GET,
            "/boom",
            FnEndpoint::new("boom", |ctx| {
                ctx.response_mut().text("partial output");
                anyhow::bail!("endpoint failed")
            })
            .into_arc(),
        )
        .unwrap();

    assert!(roundtrip(&app.build(), b"GET /boom HTTP/1.1\r\n\r\n").is_none());
    assert_eq!(log.entries(), vec!["error:a"]);
}

#[test]
fn test_error_hook_reply_is_sent() {
    let log = CallLog::default();
    let endpoint = FnEndpoint::new("boom", |_ctx| anyhow::bail!("backend down"))
        .with_error_hook(HookEntry::<dyn ErrorHook>::instance(OtherRecorder {
            name: "local",
            log: log.clone(),
        }));
    let mut app = App::new();
    app.error_hook(HookEntry::<dyn ErrorHook>::instance(WriteErrorBody))
        .unwrap()
        .error_hook(HookEntry::<dyn ErrorHook>::instance(Recorder { name: "global", log: log.clone() }))
        .unwrap()
        .route(Method::GET, "/boom", endpoint.into_arc())
        .unwrap();

    let raw = roundtrip(&app.build(), b"GET /boom HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 503);
    assert_eq!(raw.body_json(), json!({ "error": "backend down" }));
    assert_eq!(log.entries(), vec!["error:global", "error:local"]);
}

#[test]
fn test_failing_error_hook_yields_500() {
    let log = CallLog::default();
    let mut app = App::new();
    app.error_hook(HookEntry::<dyn ErrorHook>::instance(FailingErrorHook))
        .unwrap()
        .error_hook(HookEntry::<dyn ErrorHook>::instance(Recorder { name: "after", log: log.clone() }))
        .unwrap()
        .route(
            Method::GET,
            "/boom",
            FnEndpoint::new("boom", |_ctx| anyhow::bail!("endpoint failed")).into_arc(),
        )
        .unwrap();

    let raw = roundtrip(&app.build(), b"GET /boom HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 500);
    assert_eq!(raw.body_text(), INTERNAL_ERROR_BODY);
    assert!(log.entries().is_empty());
}

#[test]
fn test_endpoint_panic_runs_error_chain() {
    let mut app = App::new();
    app.error_hook(HookEntry::<dyn ErrorHook>::instance(WriteErrorBody))
        .unwrap()
        .route(
            Method::GET,
            "/panic",
            FnEndpoint::new("panics", |_ctx| panic!("handler bug")).into_arc(),
        )
        .unwrap();

    let raw = roundtrip(&app.build(), b"GET /panic HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 503);
    assert!(raw.body_json()["error"].as_str().unwrap().contains("handler bug"));
}

#[test]
fn test_post_hook_failure_runs_error_chain() {
    struct FailingPostHook;
    impl PostHook for FailingPostHook {
        fn after(&self, _ctx: &mut RequestContext) -> anyhow::Result<()> {
            anyhow::bail!("post-hook failed")
        }
    }

    let log = CallLog::default();
    let mut app = App::new();
    app.post_hook(HookEntry::<dyn PostHook>::instance(FailingPostHook))
        .unwrap()
        .error_hook(HookEntry::<dyn ErrorHook>::instance(WriteErrorBody))
        .unwrap()
        .route(Method::GET, "/", logging_endpoint(&log).into_arc())
        .unwrap();

    let raw = roundtrip(&app.build(), b"GET / HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 503);
    assert_eq!(raw.body_json(), json!({ "error": "post-hook failed" }));
    assert_eq!(log.entries(), vec!["endpoint"]);
}

#[test]
fn test_unknown_route_is_404_once_routes_exist() {
    let log = CallLog::default();
    let mut app = App::new();
    app.route(Method::GET, "/known", logging_endpoint(&log).into_arc())
        .unwrap();
    let raw = roundtrip(&app.build(), b"GET /unknown HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 404);
    assert!(log.entries().is_empty());
}

#[test]
fn test_widget_flow_with_session_and_local_post_hook() {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let counter = Arc::new(CountingHook::default());
    let endpoint = FnEndpoint::new("create_widget", |ctx| {
        let body = ctx.request_mut().body_as_json()?;
        let session = ctx.session().ok_or_else(|| anyhow::anyhow!("no session"))?;
        ctx.response_mut()
            .json(&json!({ "widget": body, "session": session.uuid() }))?;
        Ok(())
    })
    .with_post_hook(HookEntry::<dyn PostHook>::shared(Arc::clone(&counter)));

    let mut app = App::new();
    app.with_clock(clock)
        .with_sessions(&SessionOptions::default(), None)
        .unwrap()
        .route(Method::POST, "/widgets", endpoint.into_arc())
        .unwrap();
    let service = app.build();
    let cookie_name = SessionOptions::default().cookie_name();

    let first = roundtrip(
        &service,
        b"POST /widgets HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 15\r\n\r\n{\"name\":\"bolt\"}",
    )
    .unwrap();
    assert_eq!(first.status, 200);
    assert_eq!(first.header("x-post-count"), Some("1"));
    assert!(first.header("x-request-id").is_some());
    let uuid = cookie_value(&first, &cookie_name).unwrap();
    assert_eq!(first.body_json()["session"], json!(uuid));
    assert_eq!(first.body_json()["widget"], json!({ "name": "bolt" }));
    assert_eq!(service.sessions().len(), 1);

    let second = format!(
        "POST /widgets HTTP/1.1\r\nCookie: {cookie_name}={uuid}\r\nContent-Length: 2\r\n\r\n{{}}"
    );
    let second = roundtrip(&service, second.as_bytes()).unwrap();
    assert_eq!(second.status, 200);
    assert!(second.header("set-cookie").is_none());
    assert_eq!(second.header("x-post-count"), Some("2"));
    assert_eq!(second.body_json()["session"], json!(uuid));
    assert_eq!(service.sessions().len(), 1);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_inbound_request_id_is_echoed() {
    let log = CallLog::default();
    let mut app = App::new();
    app.route(Method::GET, "/", logging_endpoint(&log).into_arc())
        .unwrap();
    let raw = roundtrip(
        &app.build(),
        b"GET / HTTP/1.1\r\nX-Request-Id: 01ARZ3NDEKTSV4RRFFQ69G5FAV\r\n\r\n",
    )
    .unwrap();
    assert_eq!(raw.header("x-request-id"), Some("01ARZ3NDEKTSV4RRFFQ69G5FAV"));
}
