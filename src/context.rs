//! Per-request state threaded through hooks and the endpoint.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ContextError, ResponseError};
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::server::{Request, Response};
use crate::session::Session;

struct Item {
    name: &'static str,
    value: Box<dyn Any + Send>,
}

/// Request, response, correlation id and a typed item store.
///
/// The store holds at most one value per type. Hooks use it to hand data to
/// later hooks and the endpoint, e.g. the `Arc<Session>` attached by
/// [`SessionHook`](crate::session::SessionHook):
///
/// ```rust,ignore
/// struct Claims { sub: String }
///
/// ctx.attach(Claims { sub: "u1".into() })?;
/// let claims = ctx.get::<Claims>()?;      // fails loudly when absent
/// let maybe = ctx.find::<Claims>();       // Option
/// ```
pub struct RequestContext {
    request: Request,
    response: Response,
    request_id: RequestId,
    items: HashMap<TypeId, Item>,
    started_at: Instant,
}

impl RequestContext {
    /// Reuses a valid inbound `x-request-id`, otherwise mints one, and stamps
    /// it on the response.
    pub fn new(request: Request, mut response: Response) -> Self {
        let request_id =
            RequestId::from_header_or_new(request.header(REQUEST_ID_HEADER).map(|h| h.first()));
        response.set_correlation_id(request_id.to_string());
        Self {
            request,
            response,
            request_id,
            items: HashMap::new(),
            started_at: Instant::now(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// # Errors
    ///
    /// [`ContextError::DuplicateItem`] when a `T` is already attached.
    pub fn attach<T: Any + Send>(&mut self, item: T) -> Result<(), ContextError> {
        let key = TypeId::of::<T>();
        if self.items.contains_key(&key) {
            return Err(ContextError::DuplicateItem(type_name::<T>()));
        }
        self.items.insert(
            key,
            Item {
                name: type_name::<T>(),
                value: Box::new(item),
            },
        );
        Ok(())
    }

    /// Attach `item`, returning the previous `T` if any.
    pub fn replace<T: Any + Send>(&mut self, item: T) -> Option<T> {
        let previous = self.take::<T>();
        self.items.insert(
            TypeId::of::<T>(),
            Item {
                name: type_name::<T>(),
                value: Box::new(item),
            },
        );
        previous
    }

    /// Required lookup.
    ///
    /// # Errors
    ///
    /// [`ContextError::MissingItem`] when no `T` is attached.
    pub fn get<T: Any + Send>(&self) -> Result<&T, ContextError> {
        self.find::<T>()
            .ok_or(ContextError::MissingItem(type_name::<T>()))
    }

    pub fn find<T: Any + Send>(&self) -> Option<&T> {
        self.items
            .get(&TypeId::of::<T>())
            .and_then(|item| item.value.downcast_ref::<T>())
    }

    pub fn find_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.items
            .get_mut(&TypeId::of::<T>())
            .and_then(|item| item.value.downcast_mut::<T>())
    }

    pub fn take<T: Any + Send>(&mut self) -> Option<T> {
        self.items
            .remove(&TypeId::of::<T>())
            .and_then(|item| item.value.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn contains<T: Any + Send>(&self) -> bool {
        self.items.contains_key(&TypeId::of::<T>())
    }

    /// Type names of attached items, for diagnostics.
    pub fn item_names(&self) -> Vec<&'static str> {
        self.items.values().map(|item| item.name).collect()
    }

    /// Session attached by the session pre-hook, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.find::<Arc<Session>>().map(Arc::clone)
    }

    /// Terminal operation; later hooks see `response().is_sent()`.
    pub fn send(&mut self) -> Result<(), ResponseError> {
        self.response.send()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("items", &self.item_names())
            .field("response", &self.response)
            .finish()
    }
}
