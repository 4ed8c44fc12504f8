//! # Sessions
//!
//! TTL-expiring sessions keyed by UUID and carried in a
//! `<prefix>:<scope>` cookie.
//!
//! - [`Session`] holds the expiry and a JSON payload, optionally backed by a
//!   [`SessionDelegate`].
//! - [`SessionStore`] is the single registry of live sessions. Removal from it
//!   is the only deletion path.
//! - [`SessionSweeper`] periodically removes expired sessions, then clears
//!   their backing data outside the store lock.
//! - [`SessionHook`] resolves or creates the session for each request;
//!   [`SessionPersistHook`] writes modified payloads back.
//!
//! Every time-dependent check reads an injected [`Clock`](crate::clock::Clock).

mod core;
mod delegate;
mod hook;
mod store;
mod sweeper;

pub use self::core::{
    cookie_name, Session, SessionOptions, DEFAULT_COOKIE_PREFIX, DEFAULT_SCOPE,
    DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL,
};
pub use delegate::{MemorySessionDelegate, SessionDelegate};
pub use hook::{SessionHook, SessionPersistHook};
pub use store::SessionStore;
pub use sweeper::SessionSweeper;
