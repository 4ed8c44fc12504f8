use super::{RouteTable, NOT_FOUND_BODY, PLACEHOLDER_BODY};
use crate::context::RequestContext;
use crate::endpoint::{Endpoint, FnEndpoint};
use crate::error::ConfigError;
use crate::server::{Request, Response};
use http::Method;
use regex::Regex;
use std::sync::Arc;

fn named(name: &str) -> Arc<dyn Endpoint> {
    FnEndpoint::new(name, |_ctx: &mut RequestContext| Ok(())).into_arc()
}

#[test]
fn test_duplicate_route_is_rejected() {
    let mut table = RouteTable::new();
    table.register(Method::GET, "/a", named("first")).unwrap();
    let err = table.register(Method::GET, "/a", named("second")).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateRoute { ref pattern, .. } if pattern == "/a"));
}

#[test]
fn test_same_pattern_different_methods() {
    let mut table = RouteTable::new();
    table.register(Method::GET, "/a", named("get")).unwrap();
    table.register(Method::POST, "/a", named("post")).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.route(&Method::POST, "/a").unwrap().endpoint.name(), "post");
    assert!(table.route(&Method::DELETE, "/a").is_none());
}

#[test]
fn test_string_patterns_are_anchored() {
    let mut table = RouteTable::new();
    table.register(Method::GET, "/a", named("a")).unwrap();
    assert!(table.route(&Method::GET, "/a").is_some());
    assert!(table.route(&Method::GET, "/a/b").is_none());
    assert!(table.route(&Method::GET, "/x/a").is_none());
}

#[test]
fn test_alternation_is_anchored_on_every_branch() {
    let mut table = RouteTable::new();
    table.register(Method::GET, "/a|/b", named("either")).unwrap();
    table.register(Method::GET, "^/c$", named("pre_anchored")).unwrap();
    assert!(table.route(&Method::GET, "/a").is_some());
    assert!(table.route(&Method::GET, "/b").is_some());
    assert!(table.route(&Method::GET, "/a/extra").is_none());
    assert!(table.route(&Method::GET, "/x/b").is_none());
    assert!(table.route(&Method::GET, "/c").is_some());
    assert!(table.route(&Method::GET, "/c/d").is_none());
}

#[test]
fn test_first_registered_wins() {
    let mut table = RouteTable::new();
    table
        .register(Method::GET, r"/items/(?<id>\d+)", named("numeric"))
        .unwrap();
    table
        .register(Method::GET, r"/items/(?<slug>[a-z0-9-]+)", named("slug"))
        .unwrap();

    let m = table.route(&Method::GET, "/items/42").unwrap();
    assert_eq!(m.endpoint.name(), "numeric");
    assert_eq!(m.get_path_param("id"), Some("42"));

    let m = table.route(&Method::GET, "/items/blue-widget").unwrap();
    assert_eq!(m.endpoint.name(), "slug");
    assert_eq!(m.get_path_param("slug"), Some("blue-widget"));
}

#[test]
fn test_compiled_regex_is_used_verbatim() {
    let mut table = RouteTable::new();
    let re = Regex::new(r"^/files/(?<path>.+)").unwrap();
    table.register(Method::GET, re, named("files")).unwrap();

    let m = table.route(&Method::GET, "/files/a/b/c.txt").unwrap();
    assert_eq!(m.pattern.as_ref(), r"^/files/(?<path>.+)");
    assert_eq!(m.get_path_param("path"), Some("a/b/c.txt"));
}

#[test]
fn test_invalid_pattern_is_a_config_error() {
    let mut table = RouteTable::new();
    let err = table.register(Method::GET, "/broken(", named("x")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    assert!(table.is_empty());
}

#[test]
fn test_unknown_route_replies() {
    let mut table = RouteTable::new();
    let mut res = Response::detached();
    table.write_unknown_route(&mut res);
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.content(), Some(PLACEHOLDER_BODY.as_bytes()));

    table.register(Method::GET, "/a", named("a")).unwrap();
    let mut res = Response::detached();
    table.write_unknown_route(&mut res);
    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(res.content(), Some(NOT_FOUND_BODY.as_bytes()));
    assert_eq!(res.header("content-type"), Some("text/plain"));
}

#[test]
fn test_entries_preserve_registration_order() {
    let mut table = RouteTable::new();
    table.register(Method::GET, "/b", named("b")).unwrap();
    table.register(Method::GET, "/a", named("a")).unwrap();
    let names: Vec<&str> = table.entries().map(|(_, p, _)| p).collect();
    assert_eq!(names, vec!["/b", "/a"]);
}

#[test]
fn test_request_path_params_come_from_captures() {
    let mut table = RouteTable::new();
    table
        .register(Method::GET, r"/u/(?<user>\w+)/p/(\d+)", named("post"))
        .unwrap();
    let m = table.route(&Method::GET, "/u/ann/p/7").unwrap();
    // unnamed groups are not exposed
    assert_eq!(m.path_params.len(), 1);

    let mut req = Request::new(Method::GET, "/u/ann/p/7");
    req.set_path_params(m.path_params);
    assert_eq!(req.path_param("user"), Some("ann"));
}
