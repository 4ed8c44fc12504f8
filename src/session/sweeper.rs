use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::SessionStore;

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodic background pass removing expired sessions.
///
/// One worker thread at most: `start` while running and `stop` while stopped
/// are no-ops. The worker is stopped and joined on drop.
pub struct SessionSweeper {
    store: Arc<SessionStore>,
    interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl SessionSweeper {
    pub fn new(store: Arc<SessionStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            worker: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` if this call started the worker.
    pub fn start(&self) -> bool {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            debug!("Session sweeper already running");
            return false;
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let store = Arc::clone(&self.store);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name("brrtkit-session-sweeper".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        sweep(&store);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => {
                info!(interval_ms = interval.as_millis() as u64, "Session sweeper started");
                *worker = Some(Worker { stop_tx, handle });
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn session sweeper thread");
                false
            }
        }
    }

    /// Returns `true` if a running worker was stopped.
    pub fn stop(&self) -> bool {
        let Some(worker) = self.worker.lock().take() else {
            return false;
        };
        if worker.stop_tx.send(()).is_err() {
            debug!("Session sweeper thread already exited");
        }
        if worker.handle.join().is_err() {
            warn!("Session sweeper thread panicked");
        }
        info!("Session sweeper stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Run one sweep now. Returns the number of sessions removed.
    pub fn cleanup(&self) -> usize {
        sweep(&self.store)
    }
}

impl Drop for SessionSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Snapshot, then for each expired session: remove from the store, then clear
/// its backing data. Delegate calls run without the store lock.
fn sweep(store: &SessionStore) -> usize {
    let started = Instant::now();
    let snapshot = store.snapshot();
    let scanned = snapshot.len();
    let mut removed = 0;

    for session in snapshot.into_iter().filter(|s| s.is_expired()) {
        let Some(session) = store.remove_expired(session.uuid()) else {
            continue;
        };
        removed += 1;
        debug!(session = %session.uuid(), "Session expired");
        if let Err(e) = session.clear_data() {
            warn!(session = %session.uuid(), error = %e, "Failed to clear expired session data");
        }
    }

    if removed > 0 {
        info!(
            scanned,
            removed,
            remaining = store.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "Session sweep completed"
        );
    }
    removed
}
