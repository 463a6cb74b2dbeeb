//! Client side of one connection.
//!
//! ```text
//! AwaitingCommand --GET--> AwaitingReply --+OK--> Receiving --done--> AwaitingCommand
//!        |                       |                    |
//!        +--QUIT--> Terminated   +--ERR--> AwaitingCommand
//!                                                     +--ABORT--> Terminated
//! ```
//!
//! While idle and while receiving, the session waits on the socket and on
//! the input source at once; whichever is ready first wins.

use indicatif::ProgressBar;
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, Lines};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::client::console::Console;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{Command, Expect, FramedStream, Message};
use crate::transfer::{self, Download, Reply};
use crate::transport;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// `QUIT` was sent (typed, or end of input).
    Quit,
    /// The server closed the idle connection.
    Disconnected,
    /// A transfer was aborted; the connection is dropped with it.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub files: u64,
    pub bytes: u64,
    pub rejected: u64,
    pub end: SessionEnd,
}

enum Idle {
    Line(String),
    InputClosed,
    Disconnected,
}

#[derive(Debug, PartialEq, Eq)]
enum RequestEnd {
    Rejected,
    Completed,
    Aborted,
}

pub struct Session<S, I> {
    framed: FramedStream<S>,
    input: Lines<I>,
    input_open: bool,
    /// Lines typed while a transfer was running, issued afterwards in order.
    pending: VecDeque<String>,
    download_dir: PathBuf,
    console: Console,
    files: u64,
    bytes: u64,
    rejected: u64,
}

impl<I> Session<TcpStream, I>
where
    I: AsyncBufRead + Unpin,
{
    /// Connect to the configured server and wait for its greeting.
    pub async fn connect(config: &ClientConfig, input: Lines<I>, console: Console) -> Result<Self> {
        let stream = transport::connect(&config.host, &config.service).await?;
        let peer = stream.peer_addr()?;
        let session = Self::start(stream, input, config.download_dir.clone(), console).await?;
        session.console.connected(peer);
        info!(%peer, "connected");
        Ok(session)
    }
}

impl<S, I> Session<S, I>
where
    S: AsyncRead + AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
{
    /// Wait for the server greeting on an established stream.
    pub async fn start(
        stream: S,
        input: Lines<I>,
        download_dir: impl Into<PathBuf>,
        console: Console,
    ) -> Result<Self> {
        let mut framed = FramedStream::new(stream);
        match framed.recv(Expect::Hello).await {
            Ok(_) => {}
            Err(Error::PeerClosed) => return Err(Error::ConnectionRefused),
            Err(e) => return Err(e),
        }

        Ok(Self {
            framed,
            input,
            input_open: true,
            pending: VecDeque::new(),
            download_dir: download_dir.into(),
            console,
            files: 0,
            bytes: 0,
            rejected: 0,
        })
    }

    /// Drive the session until it terminates. The connection is closed on
    /// return, whatever the outcome.
    pub async fn run(mut self) -> Result<SessionSummary> {
        loop {
            let line = match self.pending.pop_front() {
                Some(line) => line,
                None => match self.await_command().await? {
                    Idle::Line(line) => line,
                    Idle::InputClosed => Command::Quit.to_line(),
                    Idle::Disconnected => {
                        self.console.disconnected();
                        return Ok(self.finish(SessionEnd::Disconnected));
                    }
                },
            };
            if line.trim().is_empty() {
                continue;
            }

            match Command::parse(&line) {
                Command::Quit => {
                    self.framed.send(&Message::Command(Command::Quit)).await?;
                    return Ok(self.finish(SessionEnd::Quit));
                }
                command => {
                    if self.request(command).await? == RequestEnd::Aborted {
                        return Ok(self.finish(SessionEnd::Aborted));
                    }
                }
            }
        }
    }

    async fn await_command(&mut self) -> Result<Idle> {
        if !self.input_open {
            return Ok(Idle::InputClosed);
        }
        self.console.prompt();

        tokio::select! {
            // Nothing is expected from the server while idle; any readiness
            // is the connection going away.
            _ = self.framed.fill() => Ok(Idle::Disconnected),
            line = self.input.next_line() => match line? {
                Some(line) => Ok(Idle::Line(line)),
                None => {
                    self.input_open = false;
                    Ok(Idle::InputClosed)
                }
            },
        }
    }

    async fn request(&mut self, command: Command) -> Result<RequestEnd> {
        debug!(command = %command.to_line(), "sending command");
        self.framed.send(&Message::Command(command.clone())).await?;

        let total = match transfer::await_reply(&mut self.framed).await? {
            Reply::Rejected => {
                self.rejected += 1;
                self.console.rejected();
                return Ok(RequestEnd::Rejected);
            }
            Reply::Accepted { total } => total,
        };
        let Command::Get(remote) = command else {
            return Err(Error::Malformed("+OK in reply to a non-GET command".into()));
        };

        let local_name = transfer::local_file_name(&remote);
        let mut download = Download::create(self.download_dir.join(local_name), total).await?;
        let bar = self.console.start_transfer(&remote, total);

        let received = self.receive(&mut download, &bar).await;
        let bytes = download.received();
        let closed = download.close().await;

        match received {
            Ok(true) => {
                closed?;
                self.files += 1;
                self.bytes += bytes;
                self.console.completed(&bar, total, local_name);
                info!(path = %remote, bytes, "file received");
                Ok(RequestEnd::Completed)
            }
            Ok(false) => {
                closed?;
                self.bytes += bytes;
                self.console.aborted(&bar, bytes);
                info!(path = %remote, bytes, total, "transfer aborted");
                Ok(RequestEnd::Aborted)
            }
            Err(e) => {
                bar.abandon();
                Err(e)
            }
        }
    }

    /// Receive chunks until the file is complete (`true`) or the user
    /// aborts (`false`). Cancellation is checked between chunks only.
    async fn receive(&mut self, download: &mut Download, bar: &ProgressBar) -> Result<bool> {
        while !download.is_complete() {
            if download.is_cancelled() {
                return Ok(false);
            }

            if let Some(msg) = self.framed.try_decode(download.next_unit())? {
                let chunk = match msg {
                    Message::DataChunk(chunk) => chunk,
                    other => {
                        return Err(Error::Malformed(format!("expected data, got {:?}", other)))
                    }
                };
                self.framed.send_ack().await?;
                download.accept_chunk(&chunk).await?;
                bar.set_position(download.received());
                debug!(
                    received = download.received(),
                    total = download.total(),
                    progress = download.fraction(),
                    "chunk received"
                );
                continue;
            }

            tokio::select! {
                filled = self.framed.fill() => {
                    if filled? == 0 {
                        return Err(Error::PeerClosed);
                    }
                }
                line = self.input.next_line(), if self.input_open => match line? {
                    Some(line) if Command::parse(&line) == Command::Abort => download.cancel(),
                    Some(line) => self.pending.push_back(line),
                    None => self.input_open = false,
                },
            }
        }
        Ok(true)
    }

    fn finish(self, end: SessionEnd) -> SessionSummary {
        self.console.closed();
        SessionSummary {
            files: self.files,
            bytes: self.bytes,
            rejected: self.rejected,
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::sync::oneshot;

    async fn read_line(server: &mut DuplexStream) -> String {
        let mut line = Vec::new();
        loop {
            let b = server.read_u8().await.unwrap();
            line.push(b);
            if line.ends_with(b"\r\n") {
                line.truncate(line.len() - 2);
                return String::from_utf8(line).unwrap();
            }
        }
    }

    async fn read_ack(server: &mut DuplexStream) {
        let mut ack = [0u8; 3];
        server.read_exact(&mut ack).await.unwrap();
        assert_eq!(&ack, b"ACK");
    }

    #[tokio::test]
    async fn test_refused_without_greeting() {
        let (client, server) = duplex(1024);
        drop(server);

        let input = (&b""[..]).lines();
        let err = Session::start(client, input, ".", Console::silent())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_end_of_input_sends_quit() {
        let (client, mut server) = duplex(1024);
        server.write_all(b"HELLO").await.unwrap();

        let input = (&b""[..]).lines();
        let session = Session::start(client, input, ".", Console::silent())
            .await
            .unwrap();
        let summary = session.run().await.unwrap();

        assert_eq!(summary.end, SessionEnd::Quit);
        assert_eq!(read_line(&mut server).await, "QUIT");
    }

    #[tokio::test]
    async fn test_idle_disconnect_detected() {
        let (client, mut server) = duplex(1024);
        server.write_all(b"HELLO").await.unwrap();

        // input stays open and silent
        let (_input_tx, input_rx) = duplex(64);
        let session = Session::start(client, BufReader::new(input_rx).lines(), ".", Console::silent())
            .await
            .unwrap();

        let run = tokio::spawn(session.run());
        drop(server);

        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.end, SessionEnd::Disconnected);
    }

    #[tokio::test]
    async fn test_abort_leaves_prefix() {
        let tmp = TempDir::new().unwrap();
        let content: Vec<u8> = (0..3000u32).map(|i| (i % 200) as u8).collect();
        let first_chunk = content[..1024].to_vec();

        let (client, mut server) = duplex(64 * 1024);
        let (input_tx, input_rx) = duplex(1024);
        let (acked_tx, acked_rx) = oneshot::channel();

        let fake_server = tokio::spawn(async move {
            server.write_all(b"HELLO").await.unwrap();
            assert_eq!(read_line(&mut server).await, "GET remote/dir/data.bin");
            server.write_all(b"+OK\r\n").await.unwrap();
            read_ack(&mut server).await;
            server.write_all(&3000u32.to_be_bytes()).await.unwrap();
            read_ack(&mut server).await;
            server.write_all(&content[..1024]).await.unwrap();
            read_ack(&mut server).await;
            acked_tx.send(()).unwrap();

            // the client hangs up instead of acknowledging more data
            let mut rest = Vec::new();
            let _ = server.read_to_end(&mut rest).await;
            rest
        });

        let mut input_tx = input_tx;
        input_tx.write_all(b"GET remote/dir/data.bin\n").await.unwrap();

        let session = Session::start(
            client,
            BufReader::new(input_rx).lines(),
            tmp.path(),
            Console::silent(),
        )
        .await
        .unwrap();
        let run = tokio::spawn(session.run());

        acked_rx.await.unwrap();
        input_tx.write_all(b"ABORT\n").await.unwrap();

        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.end, SessionEnd::Aborted);
        assert_eq!(summary.files, 0);
        assert_eq!(summary.bytes, 1024);

        let written = std::fs::read(tmp.path().join("data.bin")).unwrap();
        assert_eq!(written, first_chunk);

        // nothing but acks after the command: no further command was sent
        assert!(fake_server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_typed_ahead_command_runs_after_transfer() {
        let tmp = TempDir::new().unwrap();

        let (client, mut server) = duplex(64 * 1024);
        let (input_tx, input_rx) = duplex(1024);
        let (chunk_tx, chunk_rx) = oneshot::channel::<()>();
        let (typed_tx, typed_rx) = oneshot::channel::<()>();

        let fake_server = tokio::spawn(async move {
            server.write_all(b"HELLO").await.unwrap();
            assert_eq!(read_line(&mut server).await, "GET a.txt");
            server.write_all(b"+OK\r\n").await.unwrap();
            read_ack(&mut server).await;
            server.write_all(&1027u32.to_be_bytes()).await.unwrap();
            read_ack(&mut server).await;
            server.write_all(&[b'a'; 1024]).await.unwrap();
            read_ack(&mut server).await;
            chunk_tx.send(()).unwrap();
            typed_rx.await.unwrap();
            server.write_all(b"def").await.unwrap();
            read_ack(&mut server).await;

            // typed during the transfer
            assert_eq!(read_line(&mut server).await, "GET b.txt");
            server.write_all(b"-ERR\r\n").await.unwrap();
            read_ack(&mut server).await;
            assert_eq!(read_line(&mut server).await, "QUIT");
        });

        let mut input_tx = input_tx;
        input_tx.write_all(b"GET a.txt\n").await.unwrap();
        let session = Session::start(
            client,
            BufReader::new(input_rx).lines(),
            tmp.path(),
            Console::silent(),
        )
        .await
        .unwrap();
        let run = tokio::spawn(session.run());

        chunk_rx.await.unwrap();
        input_tx.write_all(b"GET b.txt\n").await.unwrap();
        // give the session a chance to read the typed line before the last chunk
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        typed_tx.send(()).unwrap();
        drop(input_tx);

        let summary = run.await.unwrap().unwrap();
        fake_server.await.unwrap();

        assert_eq!(summary.end, SessionEnd::Quit);
        assert_eq!(summary.files, 1);
        assert_eq!(summary.rejected, 1);
        let mut expected = vec![b'a'; 1024];
        expected.extend_from_slice(b"def");
        assert_eq!(std::fs::read(tmp.path().join("a.txt")).unwrap(), expected);
    }
}
