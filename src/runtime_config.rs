//! # Runtime Configuration
//!
//! Coroutine runtime settings read from the environment.
//!
//! ### `BRRTKIT_STACK_SIZE`
//!
//! Stack size for connection coroutines, decimal (`32768`) or hex (`0x8000`).
//! Default: `0x8000` (32 KB).
//!
//! ### `BRRTKIT_WORKERS`
//!
//! Number of scheduler worker threads. Default: number of CPUs.

use std::env;

pub const DEFAULT_STACK_SIZE: usize = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
    /// Scheduler worker threads; `None` keeps the runtime default
    pub workers: Option<usize>,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            stack_size: env::var("BRRTKIT_STACK_SIZE")
                .ok()
                .and_then(|v| parse_size(&v))
                .unwrap_or(DEFAULT_STACK_SIZE),
            workers: env::var("BRRTKIT_WORKERS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|&n: &usize| n > 0),
        }
    }

    /// Push the settings into the `may` runtime. Call before the first coroutine.
    pub fn apply(&self) {
        let config = may::config();
        config.set_stack_size(self.stack_size);
        if let Some(workers) = self.workers {
            config.set_workers(workers);
        }
    }
}

fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
