use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use super::{Session, SessionDelegate, SessionOptions, SessionStore};
use crate::clock::Clock;
use crate::context::RequestContext;
use crate::hooks::{PostHook, PreHook};

/// Pre-hook resolving the request's session and attaching it as
/// `Arc<Session>`.
///
/// - Cookie present and known: postpone expiry, attach.
/// - Cookie absent: create, register, attach, set the cookie. Nothing to load.
/// - Cookie present but unknown (swept or from another instance): create,
///   register, attach, then load from the delegate. No cookie is written.
///
/// Delegate failures propagate to the error chain.
pub struct SessionHook {
    store: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
    delegate: Option<Arc<dyn SessionDelegate>>,
    cookie_name: String,
    ttl: Duration,
}

impl SessionHook {
    pub fn new(store: Arc<SessionStore>, clock: Arc<dyn Clock>, options: &SessionOptions) -> Self {
        Self {
            store,
            clock,
            delegate: None,
            cookie_name: options.cookie_name(),
            ttl: options.ttl,
        }
    }

    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn create(&self) -> Session {
        let session = Session::new(Uuid::new_v4().to_string(), self.ttl, Arc::clone(&self.clock));
        match &self.delegate {
            Some(delegate) => session.with_delegate(Arc::clone(delegate)),
            None => session,
        }
    }
}

impl PreHook for SessionHook {
    fn before(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        let cookie = ctx.request().cookie(&self.cookie_name).map(str::to_owned);

        if let Some(existing) = cookie.as_deref().and_then(|uuid| self.store.get(uuid)) {
            existing.postpone_expiration();
            debug!(
                request_id = %ctx.request_id(),
                session = %existing.uuid(),
                expires_at = existing.expiration_time(),
                "Session resumed"
            );
            ctx.replace(existing);
            return Ok(());
        }

        let session = Arc::new(self.create());
        self.store.add(Arc::clone(&session))?;
        ctx.replace(Arc::clone(&session));

        match cookie {
            None => {
                ctx.response_mut().set_cookie(&self.cookie_name, session.uuid());
                info!(
                    request_id = %ctx.request_id(),
                    session = %session.uuid(),
                    "Session created"
                );
            }
            Some(stale) => {
                let loaded = session.load_data()?;
                info!(
                    request_id = %ctx.request_id(),
                    session = %session.uuid(),
                    stale_cookie = %stale,
                    loaded,
                    "Session replaced stale cookie"
                );
            }
        }
        Ok(())
    }
}

/// Post-hook saving the attached session when its payload changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionPersistHook;

impl PostHook for SessionPersistHook {
    fn after(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        if let Some(session) = ctx.session().filter(|s| s.is_modified()) {
            session.save_data()?;
            debug!(request_id = %ctx.request_id(), session = %session.uuid(), "Session saved");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::server::Request;
    use crate::session::MemorySessionDelegate;
    use crate::testing::context_for;
    use http::Method;
    use serde_json::json;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<SessionStore>,
        delegate: Arc<MemorySessionDelegate>,
        hook: SessionHook,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(SessionStore::new());
        let delegate = Arc::new(MemorySessionDelegate::new());
        let hook = SessionHook::new(
            Arc::clone(&store),
            Arc::clone(&clock) as Arc<dyn Clock>,
            &SessionOptions::default(),
        )
        .with_delegate(Arc::clone(&delegate) as Arc<dyn SessionDelegate>);
        Fixture {
            clock,
            store,
            delegate,
            hook,
        }
    }

    fn request(cookie: Option<&str>) -> Request {
        let req = Request::new(Method::GET, "/");
        match cookie {
            Some(c) => req.with_header("Cookie", &format!("brrtkit:session={c}")),
            None => req,
        }
    }

    #[test]
    fn test_first_visit_creates_session_and_cookie() {
        let f = fixture();
        let (mut ctx, _) = context_for(request(None));
        f.hook.before(&mut ctx).unwrap();

        let session = ctx.session().unwrap();
        assert_eq!(f.store.len(), 1);
        assert_eq!(
            ctx.response().cookies(),
            &[("brrtkit:session".to_string(), session.uuid().to_string())]
        );
    }

    #[test]
    fn test_known_cookie_resumes_and_postpones() {
        let f = fixture();
        let (mut ctx, _) = context_for(request(None));
        f.hook.before(&mut ctx).unwrap();
        let uuid = ctx.session().unwrap().uuid().to_string();

        f.clock.set(60_000);
        let (mut ctx, _) = context_for(request(Some(&uuid)));
        f.hook.before(&mut ctx).unwrap();
        let session = ctx.session().unwrap();
        assert_eq!(session.uuid(), uuid);
        assert_eq!(session.expiration_time(), 60_000 + 30 * 60 * 1000);
        assert!(ctx.response().cookies().is_empty());
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn test_stale_cookie_creates_session_and_loads_without_cookie() {
        let f = fixture();
        let (mut ctx, _) = context_for(request(Some("gone")));
        f.hook.before(&mut ctx).unwrap();

        let session = ctx.session().unwrap();
        assert_ne!(session.uuid(), "gone");
        assert!(f.store.get(session.uuid()).is_some());
        assert!(ctx.response().cookies().is_empty());
    }

    #[test]
    fn test_persist_hook_saves_modified_session() {
        let f = fixture();
        let (mut ctx, _) = context_for(request(None));
        f.hook.before(&mut ctx).unwrap();
        let session = ctx.session().unwrap();

        SessionPersistHook.after(&mut ctx).unwrap();
        assert!(f.delegate.stored(session.uuid()).is_none());

        session.set("visits", 1);
        SessionPersistHook.after(&mut ctx).unwrap();
        assert_eq!(f.delegate.stored(session.uuid()), Some(json!({"visits": 1})));
        assert!(!session.is_modified());
    }
}
