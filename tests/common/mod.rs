#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use brrtkit::context::RequestContext;
use brrtkit::hooks::{ErrorHook, PostHook, PreHook};
use brrtkit::server::AppService;
use brrtkit::testing::{MemorySink, RawResponse};
use parking_lot::Mutex;

/// Shared log of hook invocations, in call order.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Records `pre:NAME`, `post:NAME` or `error:NAME` for every phase it runs in.
pub struct Recorder {
    pub name: &'static str,
    pub log: CallLog,
}

pub struct OtherRecorder {
    pub name: &'static str,
    pub log: CallLog,
}

macro_rules! recorder_impls {
    ($ty:ident) => {
        impl PreHook for $ty {
            fn before(&self, _ctx: &mut RequestContext) -> anyhow::Result<()> {
                self.log.push(format!("pre:{}", self.name));
                Ok(())
            }
        }

        impl PostHook for $ty {
            fn after(&self, _ctx: &mut RequestContext) -> anyhow::Result<()> {
                self.log.push(format!("post:{}", self.name));
                Ok(())
            }
        }

        impl ErrorHook for $ty {
            fn on_error(&self, _ctx: &mut RequestContext, _error: &anyhow::Error) -> anyhow::Result<()> {
                self.log.push(format!("error:{}", self.name));
                Ok(())
            }
        }
    };
}

recorder_impls!(Recorder);
recorder_impls!(OtherRecorder);

/// Counts how many times it ran and stamps the count on the response.
#[derive(Default)]
pub struct CountingHook {
    pub calls: AtomicUsize,
}

impl PostHook for CountingHook {
    fn after(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.response_mut().set_header("x-post-count", n.to_string());
        Ok(())
    }
}

/// Feed `raw` through `service`; `None` when nothing was written back.
pub fn roundtrip(service: &AppService, raw: &[u8]) -> Option<RawResponse> {
    let sink = MemorySink::new();
    service
        .serve(Cursor::new(raw.to_vec()), Box::new(sink.clone()))
        .ok();
    if sink.is_empty() {
        None
    } else {
        Some(RawResponse::parse(&sink.contents()).unwrap())
    }
}

/// Value of the `name=value` set-cookie line for `name`.
pub fn cookie_value(raw: &RawResponse, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    raw.header_all("set-cookie")
        .into_iter()
        .find_map(|line| line.strip_prefix(prefix.as_str()).map(str::to_string))
}
