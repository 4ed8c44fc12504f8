//! # CLI Module
//!
//! ### `serve`
//!
//! ```bash
//! brrtkit serve --config config/config.yaml --bind 0.0.0.0:8080
//! ```
//!
//! Runs the demo application: `GET /health`, `GET /metrics`, `GET /session`
//! (session echo), `POST /widgets`, `GET /widgets/{id}`, plus the public
//! directory when configured. Stops on SIGINT/SIGTERM.
//!
//! ### `routes`
//!
//! ```bash
//! brrtkit routes
//! ```
//!
//! Prints the demo route table in match order.

mod commands;
mod demo;


pub use commands::{load_config, run_cli, Cli, Commands};
pub use demo::{build_demo_app, JsonErrorHook};
