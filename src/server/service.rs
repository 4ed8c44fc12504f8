use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::time::Duration;

use may::net::TcpStream;
use tracing::{debug, warn};

use super::request::{Request, RequestLimits};
use super::response::Response;
use crate::context::RequestContext;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::ParseError;
use crate::session::{SessionStore, SessionSweeper};

/// One server instance: dispatcher (routes + hooks), session registry and
/// sweeper, and the connection limits. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AppService {
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionStore>,
    sweeper: Option<Arc<SessionSweeper>>,
    limits: RequestLimits,
    read_timeout: Option<Duration>,
}

impl AppService {
    pub fn new(dispatcher: Dispatcher, sessions: Arc<SessionStore>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            sessions,
            sweeper: None,
            limits: RequestLimits::default(),
            read_timeout: None,
        }
    }

    #[must_use]
    pub fn with_sweeper(mut self, sweeper: Arc<SessionSweeper>) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: RequestLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Socket read timeout; a client stalling mid-request fails the body read.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn sweeper(&self) -> Option<&Arc<SessionSweeper>> {
        self.sweeper.as_ref()
    }

    pub fn limits(&self) -> RequestLimits {
        self.limits
    }

    /// Parse one request from `reader` and dispatch it, replying on `writer`.
    ///
    /// A request head that fails to parse is answered with a plain `400` and
    /// no hooks run.
    ///
    /// # Errors
    ///
    /// The parse error, after the `400` was attempted.
    pub fn serve<R>(&self, reader: R, writer: Box<dyn Write + Send>) -> Result<DispatchOutcome, ParseError>
    where
        R: BufRead + Send + 'static,
    {
        match Request::read_from(reader, self.limits) {
            Ok(request) => {
                let mut ctx = RequestContext::new(request, Response::new(writer));
                Ok(self.dispatcher.dispatch(&mut ctx))
            }
            Err(ParseError::ConnectionClosed) => {
                debug!("Connection closed without a request");
                Err(ParseError::ConnectionClosed)
            }
            Err(e) => {
                warn!(error = %e, "Rejecting malformed request");
                let mut res = Response::new(writer);
                res.set_status(400).text(format!("Bad Request: {e}"));
                if let Err(send_err) = res.send() {
                    debug!(error = %send_err, "Failed to send 400 response");
                }
                Err(e)
            }
        }
    }

    /// Serve the single request carried by `stream`, then close it.
    pub fn handle_connection(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        if let Err(e) = stream.set_read_timeout(self.read_timeout) {
            warn!(peer = %peer, error = %e, "Failed to set read timeout");
        }
        let reader = match stream.try_clone() {
            Ok(read_half) => BufReader::new(read_half),
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to clone connection");
                return;
            }
        };
        let outcome = self.serve(reader, Box::new(stream));
        debug!(peer = %peer, outcome = ?outcome, "Connection finished");
    }
}
