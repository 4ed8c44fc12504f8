use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::{ErrorHook, PostHook};
use crate::context::RequestContext;

/// Request counters shared across every request.
///
/// Register one `Arc<MetricsHook>` as post- and error-hook and keep a clone
/// to read the counters. All updates are relaxed atomics.
#[derive(Debug, Default)]
pub struct MetricsHook {
    request_count: AtomicUsize,
    failure_count: AtomicUsize,
    total_latency_ns: AtomicU64,
}

impl MetricsHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that completed the post-hook chain
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Requests that entered the error chain
    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Mean latency over completed and failed requests; zero before the first one.
    pub fn average_latency(&self) -> Duration {
        let count = (self.request_count() + self.failure_count()) as u64;
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Prometheus text exposition of the counters.
    pub fn render(&self) -> String {
        format!(
            "# HELP brrtkit_requests_total Requests completed successfully\n\
             # TYPE brrtkit_requests_total counter\n\
             brrtkit_requests_total {}\n\
             # HELP brrtkit_request_failures_total Requests routed to the error chain\n\
             # TYPE brrtkit_request_failures_total counter\n\
             brrtkit_request_failures_total {}\n\
             # HELP brrtkit_request_latency_seconds Average request latency\n\
             # TYPE brrtkit_request_latency_seconds gauge\n\
             brrtkit_request_latency_seconds {:.6}\n",
            self.request_count(),
            self.failure_count(),
            self.average_latency().as_secs_f64()
        )
    }

    fn record_latency(&self, latency: Duration) {
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl PostHook for MetricsHook {
    fn after(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.record_latency(ctx.elapsed());
        Ok(())
    }
}

impl ErrorHook for MetricsHook {
    fn on_error(&self, ctx: &mut RequestContext, _error: &anyhow::Error) -> anyhow::Result<()> {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.record_latency(ctx.elapsed());
        Ok(())
    }
}
