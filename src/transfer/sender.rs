//! Sending side of a transfer.
//!
//! Each unit goes out only after the previous one was acknowledged, so at
//! most one unit is ever in flight.

use bytes::Bytes;
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{chunk_len, FramedStream, Message, Status, MAX_CHUNK_SIZE};

/// Stream the file at `path` to the peer and return its length.
///
/// Fails with [`Error::NotFound`] or [`Error::TooLarge`] before anything
/// is written, so the caller can still answer `-ERR`.
pub async fn send_file<S>(framed: &mut FramedStream<S>, path: &str) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut file, total) = open_for_sending(path).await?;

    framed.send(&Message::Status(Status::Ok)).await?;
    framed.recv_ack().await?;

    framed.send(&Message::SizeHeader(total)).await?;
    framed.recv_ack().await?;

    info!(path, bytes = total, "sending file");

    // Every unit but the last is full, which is how the receiver knows
    // where one ends without a length on the wire.
    let total = u64::from(total);
    let mut buf = vec![0u8; MAX_CHUNK_SIZE];
    let mut sent = 0u64;
    while sent < total {
        let n = chunk_len(total - sent);
        file.read_exact(&mut buf[..n]).await.map_err(|source| Error::File {
            path: path.into(),
            source,
        })?;

        framed
            .send(&Message::DataChunk(Bytes::copy_from_slice(&buf[..n])))
            .await?;
        framed.recv_ack().await?;

        sent += n as u64;
        debug!(path, chunk = n, sent, total, "chunk acknowledged");
    }
    info!(path, bytes = total, "transfer complete");

    Ok(total)
}

async fn open_for_sending(path: &str) -> Result<(File, u32)> {
    let not_found = |source| Error::NotFound {
        path: path.to_string(),
        source,
    };

    let mut file = File::open(path).await.map_err(not_found)?;
    let meta = file.metadata().await.map_err(not_found)?;
    if !meta.is_file() {
        return Err(not_found(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }

    let file_err = |source| Error::File {
        path: path.into(),
        source,
    };
    let size = file.seek(SeekFrom::End(0)).await.map_err(file_err)?;
    let total = u32::try_from(size).map_err(|_| Error::TooLarge {
        path: path.to_string(),
        size,
    })?;
    file.rewind().await.map_err(file_err)?;

    Ok((file, total))
}
