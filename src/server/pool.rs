//! Fixed-size pool of connection-accepting workers.
//!
//! Every worker is a task running `accept -> handle -> repeat` on the shared
//! listener. Workers share nothing else, so no locking is involved. A worker
//! that dies is reaped and not replaced; shutdown aborts every worker
//! without waiting for transfers in progress.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::{Id, JoinSet};
use tokio::time;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{Error, Result};
use crate::server::handler::{ConnectionHandler, HandlerConfig};

/// Upper bound on the number of workers.
pub const MAX_WORKERS: usize = 10;

/// Pause after a failed accept.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Summary of a pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub started: usize,
    /// Workers that exited on their own and were not replaced.
    pub lost: Vec<usize>,
    /// Workers stopped by the shutdown request.
    pub stopped: usize,
}

// =============================================================================
// Supervisor
// =============================================================================

/// Tracks worker tasks by slot number.
pub struct Supervisor {
    set: JoinSet<()>,
    slots: HashMap<Id, usize>,
    report: PoolReport,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            set: JoinSet::new(),
            slots: HashMap::new(),
            report: PoolReport::default(),
        }
    }

    pub fn spawn<F>(&mut self, slot: usize, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.set.spawn(worker);
        self.slots.insert(handle.id(), slot);
        self.report.started += 1;
    }

    pub fn running(&self) -> usize {
        self.set.len()
    }

    /// Reap workers until `shutdown` resolves or none are left.
    pub async fn run_until<F>(mut self, shutdown: F) -> PoolReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(workers = self.set.len(), "shutdown requested");
                    break;
                }
                joined = self.set.join_next_with_id() => {
                    let Some(joined) = joined else {
                        warn!("no workers left");
                        return self.report;
                    };
                    let (id, reason) = match joined {
                        Ok((id, ())) => (id, "returned".to_string()),
                        Err(e) => (e.id(), e.to_string()),
                    };
                    let slot = self.slots.remove(&id).unwrap_or_default();
                    error!(worker = slot, %reason, "worker terminated, not restarting");
                    self.report.lost.push(slot);
                }
            }
        }

        self.set.abort_all();
        while let Some(joined) = self.set.join_next_with_id().await {
            let id = match joined {
                Ok((id, ())) => id,
                Err(e) => e.id(),
            };
            let slot = self.slots.remove(&id).unwrap_or_default();
            debug!(worker = slot, "worker reaped");
            self.report.stopped += 1;
        }
        self.report
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Worker pool
// =============================================================================

pub struct WorkerPool {
    listener: Arc<TcpListener>,
    workers: usize,
    handler: HandlerConfig,
}

impl WorkerPool {
    pub fn new(listener: TcpListener, workers: usize, handler: HandlerConfig) -> Result<Self> {
        if workers == 0 || workers > MAX_WORKERS {
            return Err(Error::Config(format!(
                "max {} workers are allowed (got {})",
                MAX_WORKERS, workers
            )));
        }
        Ok(Self {
            listener: Arc::new(listener),
            workers,
            handler,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the workers and supervise them until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> PoolReport
    where
        F: Future<Output = ()>,
    {
        let mut supervisor = Supervisor::new();
        for slot in 0..self.workers {
            let listener = Arc::clone(&self.listener);
            let handler = self.handler.clone();
            supervisor.spawn(slot, accept_loop(slot, listener, handler));
        }
        info!(workers = self.workers, "worker pool started");

        supervisor.run_until(shutdown).await
    }
}

async fn accept_loop(worker: usize, listener: Arc<TcpListener>, config: HandlerConfig) {
    loop {
        debug!(worker, "waiting for connections");
        let shared: &TcpListener = &listener;
        let (stream, peer) = accept_with_retry(worker, move || shared.accept()).await;

        let span = info_span!("conn", worker, %peer);
        ConnectionHandler::new(stream, peer, config.clone())
            .run()
            .instrument(span)
            .await;
    }
}

/// Retry `accept` until it yields a connection. Errors such as running out
/// of file descriptors tend to persist, so each one is followed by a pause.
async fn accept_with_retry<T, F, Fut>(worker: usize, mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!(worker, error = %e, "accept failed");
                time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}
