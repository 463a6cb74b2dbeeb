//! Server side of one connection.
//!
//! ```text
//! Greeting -> AwaitingCommand -> Serving -> AwaitingCommand ...
//!                  |
//!                  +-> Done (QUIT, idle timeout, peer gone, send failure)
//! ```

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_IDLE_TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::protocol::{Command, Expect, FramedStream, Message, Status};
use crate::transfer;

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// How long to wait for a command before closing the connection.
    pub idle_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Quit,
    IdleTimeout,
    PeerClosed,
    Failed,
}

pub struct ConnectionHandler<S> {
    framed: FramedStream<S>,
    peer: SocketAddr,
    config: HandlerConfig,
    files_sent: u64,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, config: HandlerConfig) -> Self {
        Self {
            framed: FramedStream::new(stream),
            peer,
            config,
            files_sent: 0,
        }
    }

    /// Serve the connection until it ends. The stream is dropped on return.
    pub async fn run(mut self) -> ConnectionOutcome {
        let outcome = match self.serve().await {
            Ok(outcome) => outcome,
            Err(Error::Timeout(after)) => {
                info!(peer = %self.peer, ?after, "timeout expired");
                ConnectionOutcome::IdleTimeout
            }
            Err(e) if e.is_peer_closed() => {
                info!(peer = %self.peer, "the connection has been closed");
                ConnectionOutcome::PeerClosed
            }
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "connection failed");
                ConnectionOutcome::Failed
            }
        };
        info!(
            peer = %self.peer,
            files = self.files_sent,
            ?outcome,
            "disconnected"
        );
        outcome
    }

    async fn serve(&mut self) -> Result<ConnectionOutcome> {
        self.framed.send(&Message::Hello).await?;
        info!(peer = %self.peer, "connected");

        loop {
            debug!(peer = %self.peer, "waiting for requests");
            let command = match self.next_command().await {
                Ok(command) => command,
                Err(Error::Malformed(reason)) => {
                    warn!(peer = %self.peer, %reason, "malformed request");
                    self.reject().await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match command {
                Command::Quit => return Ok(ConnectionOutcome::Quit),
                Command::Get(path) => match transfer::send_file(&mut self.framed, &path).await {
                    Ok(_) => self.files_sent += 1,
                    Err(e) if e.is_recoverable() => {
                        info!(peer = %self.peer, %path, error = %e, "request refused");
                        self.reject().await?;
                    }
                    Err(e) => return Err(e),
                },
                other => {
                    info!(peer = %self.peer, command = %other.to_line(), "illegal command");
                    self.reject().await?;
                }
            }
        }
    }

    /// Wait for the next command line, bounded by the idle timeout.
    async fn next_command(&mut self) -> Result<Command> {
        let timeout = self.config.idle_timeout;
        match time::timeout(timeout, self.framed.recv(Expect::Command)).await {
            Err(_) => Err(Error::Timeout(timeout)),
            Ok(Ok(Message::Command(command))) => Ok(command),
            Ok(Ok(other)) => Err(Error::Malformed(format!("expected command, got {:?}", other))),
            Ok(Err(e)) => Err(e),
        }
    }

    async fn reject(&mut self) -> Result<()> {
        self.framed.send(&Message::Status(Status::Err)).await?;
        self.framed.recv_ack().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn spawn_handler(idle: Duration) -> (DuplexStream, tokio::task::JoinHandle<ConnectionOutcome>) {
        let (server, client) = duplex(64 * 1024);
        let handler = ConnectionHandler::new(
            server,
            peer(),
            HandlerConfig { idle_timeout: idle },
        );
        (client, tokio::spawn(handler.run()))
    }

    async fn expect_bytes(client: &mut DuplexStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn test_greeting_then_quit() {
        let (mut client, handle) = spawn_handler(Duration::from_secs(5));
        expect_bytes(&mut client, b"HELLO").await;
        client.write_all(b"QUIT\r\n").await.unwrap();
        assert_eq!(handle.await.unwrap(), ConnectionOutcome::Quit);
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, b"hi").unwrap();

        let (mut client, handle) = spawn_handler(Duration::from_secs(5));
        expect_bytes(&mut client, b"HELLO").await;

        client.write_all(b"FOO\r\n").await.unwrap();
        expect_bytes(&mut client, b"-ERR\r\n").await;
        client.write_all(b"ACK").await.unwrap();

        client
            .write_all(format!("GET {}\r\n", path.display()).as_bytes())
            .await
            .unwrap();
        expect_bytes(&mut client, b"+OK\r\n").await;
        client.write_all(b"ACK").await.unwrap();
        expect_bytes(&mut client, &2u32.to_be_bytes()).await;
        client.write_all(b"ACK").await.unwrap();
        expect_bytes(&mut client, b"hi").await;
        client.write_all(b"ACK").await.unwrap();

        client.write_all(b"QUIT\r\n").await.unwrap();
        assert_eq!(handle.await.unwrap(), ConnectionOutcome::Quit);
    }

    #[tokio::test]
    async fn test_missing_file_then_abort_token() {
        let (mut client, handle) = spawn_handler(Duration::from_secs(5));
        expect_bytes(&mut client, b"HELLO").await;

        client.write_all(b"GET /no/such/file\r\n").await.unwrap();
        expect_bytes(&mut client, b"-ERR\r\n").await;
        client.write_all(b"ACK").await.unwrap();

        client.write_all(b"ABORT\r\n").await.unwrap();
        expect_bytes(&mut client, b"-ERR\r\n").await;
        client.write_all(b"ACK").await.unwrap();

        client.write_all(b"\xff\r\n").await.unwrap();
        expect_bytes(&mut client, b"-ERR\r\n").await;
        client.write_all(b"ACK").await.unwrap();

        drop(client);
        assert_eq!(handle.await.unwrap(), ConnectionOutcome::PeerClosed);
    }

    #[tokio::test]
    async fn test_overlong_line_answered_once() {
        let (mut client, handle) = spawn_handler(Duration::from_secs(5));
        expect_bytes(&mut client, b"HELLO").await;

        for _ in 0..3 {
            client.write_all(&[b'G'; 1000]).await.unwrap();
            tokio::task::yield_now().await;
        }
        client.write_all(b"\r\nACK").await.unwrap();
        expect_bytes(&mut client, b"-ERR\r\n").await;

        client.write_all(b"QUIT\r\n").await.unwrap();
        assert_eq!(handle.await.unwrap(), ConnectionOutcome::Quit);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let (mut client, handle) = spawn_handler(Duration::from_millis(100));
        expect_bytes(&mut client, b"HELLO").await;

        assert_eq!(handle.await.unwrap(), ConnectionOutcome::IdleTimeout);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_peer_closed_mid_transfer() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.bin");
        std::fs::write(&path, vec![1u8; 4096]).unwrap();

        let (mut client, handle) = spawn_handler(Duration::from_secs(5));
        expect_bytes(&mut client, b"HELLO").await;
        client
            .write_all(format!("GET {}\r\n", path.display()).as_bytes())
            .await
            .unwrap();
        expect_bytes(&mut client, b"+OK\r\n").await;
        client.write_all(b"ACK").await.unwrap();
        expect_bytes(&mut client, &4096u32.to_be_bytes()).await;
        client.write_all(b"ACK").await.unwrap();
        drop(client);

        assert_eq!(handle.await.unwrap(), ConnectionOutcome::PeerClosed);
    }
}
