//! Receiving side of a transfer.
//!
//! Every unit is acknowledged once it is complete, including the last
//! chunk. A data unit is complete when [`chunk_len`] of the bytes still
//! owed have arrived, however many reads that took. The end of a transfer
//! is detected purely by comparing the byte count against the size header.

use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{chunk_len, Expect, FramedStream, Message, Status};

/// Server answer to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `+OK` followed by the size header.
    Accepted { total: u64 },
    /// `-ERR`: unknown command or missing file.
    Rejected,
}

/// Read the reply to a command, acknowledging each unit.
pub async fn await_reply<S>(framed: &mut FramedStream<S>) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match framed.recv_acked(Expect::Status).await? {
        Message::Status(Status::Err) => Ok(Reply::Rejected),
        Message::Status(Status::Ok) => match framed.recv_acked(Expect::SizeHeader).await? {
            Message::SizeHeader(total) => Ok(Reply::Accepted {
                total: u64::from(total),
            }),
            other => Err(Error::Malformed(format!("expected size header, got {:?}", other))),
        },
        other => Err(Error::Malformed(format!("expected status, got {:?}", other))),
    }
}

/// Name of the local copy: the last `/` segment, or the whole string.
pub fn local_file_name(remote_path: &str) -> &str {
    remote_path
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(remote_path)
}

/// One file being received.
pub struct Download {
    path: PathBuf,
    file: File,
    total: u64,
    received: u64,
    cancelled: bool,
}

impl Download {
    /// Create (or truncate) the destination file.
    pub async fn create(path: impl Into<PathBuf>, total: u64) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|source| Error::File {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file,
            total,
            received: 0,
            cancelled: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.received)
    }

    /// The unit to wait for next.
    pub fn next_unit(&self) -> Expect {
        Expect::DataChunk(chunk_len(self.remaining()))
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.total
    }

    /// Progress in `0.0..=1.0`. An empty file counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.received as f64 / self.total as f64
        }
    }

    /// Request cancellation; honoured at the next chunk boundary.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Append one received chunk.
    pub async fn accept_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let after = self.received + chunk.len() as u64;
        if after > self.total {
            return Err(Error::Malformed(format!(
                "peer sent {} bytes for a {} byte file",
                after, self.total
            )));
        }

        self.file
            .write_all(chunk)
            .await
            .map_err(|source| Error::File {
                path: self.path.clone(),
                source,
            })?;
        self.received = after;
        Ok(())
    }

    /// Flush and close the file, complete or not. Returns bytes written.
    pub async fn close(mut self) -> Result<u64> {
        self.file.flush().await.map_err(|source| Error::File {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.received)
    }
}

/// Receive the remaining chunks of `download` with no interruption source.
pub async fn recv_file<S>(framed: &mut FramedStream<S>, download: &mut Download) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while !download.is_complete() {
        match framed.recv_acked(download.next_unit()).await? {
            Message::DataChunk(chunk) => {
                download.accept_chunk(&chunk).await?;
                debug!(
                    received = download.received(),
                    total = download.total(),
                    "chunk received"
                );
            }
            other => return Err(Error::Malformed(format!("expected data, got {:?}", other))),
        }
    }
    Ok(download.received())
}
