use std::hint::black_box;

use brrtkit::endpoint::FnEndpoint;
use brrtkit::hooks::{HookEntry, HookPipeline, PostHook, PreHook, TracingHook};
use brrtkit::router::RouteTable;
use brrtkit::testing::get;
use brrtkit::dispatcher::Dispatcher;
use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;

const ROUTES: &[(&str, &str)] = &[
    ("GET", "/"),
    ("GET", "/zoo/animals"),
    ("POST", "/zoo/animals"),
    ("GET", r"/zoo/animals/(?<id>\d+)"),
    ("PUT", r"/zoo/animals/(?<id>\d+)"),
    ("DELETE", r"/zoo/animals/(?<id>\d+)"),
    ("GET", r"/zoo/animals/(?<id>\d+)/toys/(?<toy_id>\d+)"),
    (
        "GET",
        r"/zoo/(?<category>[^/]+)/animals/(?<id>\d+)/habitats/(?<habitat_id>\d+)/sections/(?<section_id>\d+)",
    ),
    (
        "POST",
        r"/inventory/(?<warehouse_id>\d+)/feeds/(?<feed_id>\d+)/items/(?<item_id>\d+)/batches/(?<batch_id>\d+)",
    ),
    ("GET", "/zoo/health"),
];

fn route_table() -> RouteTable {
    let mut table = RouteTable::new();
    for (i, (method, pattern)) in ROUTES.iter().enumerate() {
        let method = Method::from_bytes(method.as_bytes()).unwrap();
        let endpoint = FnEndpoint::new(format!("route_{i}"), |ctx| {
            ctx.response_mut().text("ok");
            Ok(())
        });
        table.register(method, *pattern, endpoint.into_arc()).unwrap();
    }
    table
}

fn bench_route_matching(c: &mut Criterion) {
    let table = route_table();
    let test_paths = [
        (Method::GET, "/zoo/animals/123"),
        (Method::GET, "/zoo/animals/123/toys/456"),
        (Method::GET, "/zoo/cats/animals/123/habitats/88/sections/5"),
        (Method::POST, "/inventory/1/feeds/2/items/3/batches/4"),
        (Method::GET, "/does/not/exist"),
    ];
    c.bench_function("route_match", |b| {
        b.iter(|| {
            for (method, path) in &test_paths {
                black_box(table.route(method, path));
            }
        })
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut hooks = HookPipeline::new();
    hooks
        .add_pre_hook(HookEntry::<dyn PreHook>::instance(TracingHook))
        .unwrap();
    hooks
        .add_post_hook(HookEntry::<dyn PostHook>::instance(TracingHook))
        .unwrap();
    let dispatcher = Dispatcher::new(route_table(), hooks);
    c.bench_function("dispatch_with_hooks", |b| {
        b.iter(|| {
            let (mut ctx, sink) = get("/zoo/animals/123/toys/456");
            black_box(dispatcher.dispatch(&mut ctx));
            black_box(sink);
        })
    });
}

criterion_group!(benches, bench_route_matching, bench_dispatch);
criterion_main!(benches);
