//! Pooled server: `ackget-server <port> <workers>`

use ackget::cli::ServerArgs;
use ackget::logging::init_logging;
use ackget::server::WorkerPool;
use ackget::transport;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_logging(2 + args.verbose)?;
    let config = args.into_config()?;

    let listener = transport::bind(config.bind, config.port)
        .await
        .with_context(|| format!("cannot listen on {}:{}", config.bind, config.port))?;
    let pool = WorkerPool::new(listener, config.workers, config.handler())?;
    info!(
        addr = %pool.local_addr()?,
        workers = config.workers,
        idle_timeout = ?config.idle_timeout(),
        "server ready"
    );

    let report = pool
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for ctrl-c, shutting down");
            }
        })
        .await;

    info!(
        started = report.started,
        lost = report.lost.len(),
        stopped = report.stopped,
        "server stopped"
    );
    Ok(())
}
