//! Message framing for the transfer protocol.
//!
//! `codec` is the stateless wire format; `framed` adds the per-connection
//! read buffer and the acknowledge-receive step built on it.

pub mod codec;
pub mod framed;

pub use codec::{
    chunk_len, decode, encode, skip_line, Command, Decoded, Expect, Message, Status, ACK, HELLO,
    LINE_END, MAX_CHUNK_SIZE, MAX_LINE_LEN, SIZE_HEADER_LEN,
};
pub use framed::FramedStream;
