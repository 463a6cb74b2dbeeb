//! TCP endpoints for the client and the server.

use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::debug;

use crate::error::{Error, Result};

/// Resolve `host`:`service` and connect to the first address that accepts.
///
/// `service` must be a port number.
pub async fn connect(host: &str, service: &str) -> Result<TcpStream> {
    let port: u16 = service
        .parse()
        .map_err(|_| Error::Config(format!("invalid port {:?}", service)))?;

    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
        return Err(Error::Config(format!("{} did not resolve", host)));
    }

    let mut last_err = None;
    for addr in addrs {
        debug!(%addr, "connecting");
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    match last_err {
        Some(e) if e.kind() == io::ErrorKind::ConnectionRefused => Err(Error::ConnectionRefused),
        Some(e) => Err(Error::Io(e)),
        None => Err(Error::ConnectionRefused),
    }
}

/// Bind a listening socket on `addr`:`port`.
pub async fn bind(addr: IpAddr, port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((addr, port)).await?;
    debug!(local = %listener.local_addr()?, "listening");
    Ok(listener)
}
