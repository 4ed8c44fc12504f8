//! Integration tests for the TCP server
//!
//! Binds `127.0.0.1:0`, talks raw HTTP/1.1 over `std::net::TcpStream` and
//! checks that each connection carries exactly one request.

mod common;

use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use brrtkit::app::App;
use brrtkit::endpoint::FnEndpoint;
use brrtkit::server::{HttpServer, ServerHandle};
use brrtkit::session::SessionOptions;
use brrtkit::testing::RawResponse;
use common::{cookie_value, roundtrip};
use http::Method;
use serde_json::json;

/// Server fixture; stops the server when dropped.
struct TestServer {
    handle: Option<ServerHandle>,
}

impl TestServer {
    fn start(app: App) -> Self {
        let handle = HttpServer(app.build()).start("127.0.0.1:0").unwrap();
        handle.wait_ready().unwrap();
        Self {
            handle: Some(handle),
        }
    }

    fn addr(&self) -> SocketAddr {
        self.handle.as_ref().unwrap().local_addr()
    }

    fn send(&self, raw: &str) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(raw.as_bytes()).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}

fn demo_app() -> App {
    let mut app = App::new();
    app.with_sessions(&SessionOptions::default(), None)
        .unwrap()
        .route(
            Method::GET,
            r"/widgets/(?<id>\d+)",
            FnEndpoint::new("get_widget", |ctx| {
                let id = ctx.request().path_param("id").unwrap_or_default().to_string();
                ctx.response_mut().json(&json!({ "id": id }))?;
                Ok(())
            })
            .into_arc(),
        )
        .unwrap();
    app
}

#[test]
fn test_serves_one_request_per_connection() {
    let server = TestServer::start(demo_app());
    let bytes = server.send("GET /widgets/42 HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let raw = RawResponse::parse(&bytes).unwrap();
    assert_eq!(raw.status, 200);
    assert_eq!(raw.header("connection"), Some("close"));
    assert_eq!(raw.body_json(), json!({ "id": "42" }));
    assert!(cookie_value(&raw, &SessionOptions::default().cookie_name()).is_some());
}

#[test]
fn test_malformed_request_gets_400_over_tcp() {
    let server = TestServer::start(demo_app());
    let raw = RawResponse::parse(&server.send("NONSENSE\r\n\r\n")).unwrap();
    assert_eq!(raw.status, 400);
}

#[test]
fn test_sweeper_runs_with_server() {
    let server = TestServer::start(demo_app());
    let sweeper = server.handle.as_ref().unwrap().service().sweeper().unwrap();
    assert!(sweeper.is_running());
}

#[test]
fn test_zero_config_server_answers_placeholder() {
    let server = TestServer::start(App::new());
    let raw = RawResponse::parse(&server.send("GET /whatever HTTP/1.1\r\n\r\n")).unwrap();
    assert_eq!(raw.status, 200);
    assert_eq!(raw.body_text(), brrtkit::router::PLACEHOLDER_BODY);
}

#[test]
fn test_public_dir_serves_unmatched_get() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("style.css"), "body { color: red; }").unwrap();

    let mut app = demo_app();
    app.serve_public_dir(dir.path()).unwrap();
    let service = app.build();

    let raw = roundtrip(&service, b"GET /style.css HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 200);
    assert_eq!(raw.header("content-type"), Some("text/css"));
    assert_eq!(raw.body_text(), "body { color: red; }");

    let raw = roundtrip(&service, b"POST /style.css HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 404);

    let raw = roundtrip(&service, b"GET /../Cargo.toml HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(raw.status, 404);
}

#[test]
fn test_missing_public_dir_is_startup_error() {
    let mut app = App::new();
    assert!(matches!(
        app.serve_public_dir("/no/such/dir"),
        Err(brrtkit::ConfigError::MissingDirectory { .. })
    ));
}
