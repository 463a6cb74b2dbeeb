//! Server side: per-connection handler and the worker pool around it.

pub mod handler;
pub mod pool;

pub use handler::{ConnectionHandler, ConnectionOutcome, HandlerConfig};
pub use pool::{PoolReport, Supervisor, WorkerPool, MAX_WORKERS};
