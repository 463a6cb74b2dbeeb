//! Buffered framing over a byte stream.
//!
//! [`FramedStream`] owns the read buffer of one connection. The only await
//! point on the read side is [`FramedStream::fill`], which appends to the
//! buffer, so reads can sit inside `tokio::select!` without losing bytes.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::codec::{self, Decoded, Expect, Message, MAX_CHUNK_SIZE, MAX_LINE_LEN};

pub struct FramedStream<S> {
    stream: S,
    buf: BytesMut,
    /// Discarding the tail of an overlong line.
    skipping_line: bool,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(MAX_CHUNK_SIZE),
            skipping_line: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Read whatever the transport has into the buffer.
    ///
    /// Returns the number of bytes read; zero means end-of-stream.
    /// Cancel safe.
    pub async fn fill(&mut self) -> Result<usize> {
        self.buf.reserve(MAX_CHUNK_SIZE);
        let n = self
            .stream
            .read_buf(&mut self.buf)
            .await
            .map_err(|e| classify(e, Error::Receive))?;
        trace!(bytes = n, "read from stream");
        Ok(n)
    }

    /// Decode from already buffered bytes without touching the stream.
    ///
    /// An overlong line is reported once, after its terminator arrived, so
    /// none of its bytes are mistaken for the next unit.
    pub fn try_decode(&mut self, expect: Expect) -> Result<Option<Message>> {
        if self.skipping_line {
            if !codec::skip_line(&mut self.buf) {
                return Ok(None);
            }
            self.skipping_line = false;
            return Err(Error::Malformed(format!("line exceeds {} bytes", MAX_LINE_LEN)));
        }

        match codec::decode(&mut self.buf, expect) {
            Decoded::Frame(msg) => Ok(Some(msg)),
            Decoded::NeedMoreData => Ok(None),
            Decoded::Malformed(reason) => Err(Error::Malformed(reason)),
            Decoded::LineTooLong => {
                self.skipping_line = true;
                self.try_decode(expect)
            }
        }
    }

    /// Wait for one unit. End-of-stream is [`Error::PeerClosed`].
    ///
    /// Cancel safe: partially received units stay buffered.
    pub async fn recv(&mut self, expect: Expect) -> Result<Message> {
        loop {
            if let Some(msg) = self.try_decode(expect)? {
                return Ok(msg);
            }
            if self.fill().await? == 0 {
                return Err(Error::PeerClosed);
            }
        }
    }

    /// Write one message and flush it.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        let frame = codec::encode(msg);
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| classify(e, Error::Transmission))?;
        self.stream
            .flush()
            .await
            .map_err(|e| classify(e, Error::Transmission))?;
        Ok(())
    }

    pub async fn send_ack(&mut self) -> Result<()> {
        self.send(&Message::Ack).await
    }

    pub async fn recv_ack(&mut self) -> Result<()> {
        self.recv(Expect::Ack).await.map(|_| ())
    }

    /// Acknowledge-receive step: wait for one unit, acknowledge it, return it.
    pub async fn recv_acked(&mut self, expect: Expect) -> Result<Message> {
        let msg = self.recv(expect).await?;
        self.send_ack().await?;
        Ok(msg)
    }
}

/// A reset or broken pipe means the other side hung up.
fn classify(e: io::Error, otherwise: fn(io::Error) -> Error) -> Error {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => Error::PeerClosed,
        _ => otherwise(e),
    }
}
