use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use may::coroutine::JoinHandle;
use may::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::service::AppService;

/// Accept loop on `may::net`, one coroutine per connection.
pub struct HttpServer(pub AppService);

/// Handle to a running HTTP server
///
/// Provides methods for waiting until the server is ready, stopping it,
/// or joining the accept coroutine.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    service: AppService,
}

impl ServerHandle {
    /// Bound address; resolves port `0` to the real port.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn service(&self) -> &AppService {
        &self.service
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` error if the server doesn't become ready within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting connections and stop the session sweeper.
    pub fn stop(self) {
        // SAFETY: cancel() is unsafe in the may runtime. The handle is valid
        // (we own it) and cancellation is the intended shutdown path.
        unsafe {
            self.handle.coroutine().cancel();
        }
        if self.handle.join().is_err() {
            debug!(addr = %self.addr, "Accept loop ended by cancellation");
        }
        if let Some(sweeper) = self.service.sweeper() {
            sweeper.stop();
        }
        info!(addr = %self.addr, "Server stopped");
    }

    /// Block until the accept loop ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the accept coroutine panicked.
    pub fn join(self) -> std::thread::Result<()> {
        let result = self.handle.join();
        if let Some(sweeper) = self.service.sweeper() {
            sweeper.stop();
        }
        result
    }
}

impl HttpServer {
    /// Bind `addr`, start the session sweeper and the accept loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, the port cannot be bound,
    /// or the accept coroutine cannot be spawned.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;

        let service = self.0;
        if let Some(sweeper) = service.sweeper() {
            sweeper.start();
        }

        let accept_service = service.clone();
        // SAFETY: coroutine spawning is unsafe in the may runtime. The closure
        // owns everything it touches (listener and a service clone).
        let handle = unsafe {
            may::coroutine::Builder::new()
                .name("brrtkit-accept".to_string())
                .spawn(move || accept_loop(listener, accept_service))?
        };

        info!(
            addr = %local_addr,
            routes = service.dispatcher().routes().len(),
            "HTTP server listening"
        );
        Ok(ServerHandle {
            addr: local_addr,
            handle,
            service,
        })
    }
}

fn accept_loop(listener: TcpListener, service: AppService) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let service = service.clone();
                // SAFETY: see `HttpServer::start`; the connection coroutine owns
                // its stream and service clone.
                let spawned = unsafe {
                    may::coroutine::Builder::new().spawn(move || service.handle_connection(stream))
                };
                if let Err(e) = spawned {
                    error!(error = %e, "Failed to spawn connection coroutine");
                }
            }
            Err(e) => warn!(error = %e, "Failed to accept connection"),
        }
    }
}
