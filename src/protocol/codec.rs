//! Wire format for the stop-and-wait transfer protocol.
//!
//! The format is not self-describing: the same bytes can be a size header
//! or file data depending on where the conversation is. Decoding therefore
//! takes an [`Expect`] naming the unit the caller is waiting for.
//!
//! ```text
//! server                           client
//!   HELLO                  ------>
//!                          <------  GET <path>\r\n
//!   +OK\r\n                ------>
//!                          <------  ACK
//!   size:u32 (big-endian)  ------>
//!                          <------  ACK
//!   data (<= 1024 bytes)   ------>
//!                          <------  ACK
//!   ...
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Greeting sent by the server once a connection is accepted.
pub const HELLO: &[u8; 5] = b"HELLO";

/// Acknowledgement token. Its content is never inspected on receipt.
pub const ACK: &[u8; 3] = b"ACK";

/// Terminator for command and status lines.
pub const LINE_END: &[u8; 2] = b"\r\n";

/// Largest unit of file data sent between two acknowledgements.
pub const MAX_CHUNK_SIZE: usize = 1024;

/// Longest command or status line accepted, terminator excluded.
pub const MAX_LINE_LEN: usize = 1024;

/// Width of the size header.
pub const SIZE_HEADER_LEN: usize = 4;

/// Length of the next data unit when `remaining` bytes of the file are
/// still owed. The sender fills every unit, so only the last is short.
pub fn chunk_len(remaining: u64) -> usize {
    remaining.min(MAX_CHUNK_SIZE as u64) as usize
}

const STATUS_OK: &str = "+OK";
const STATUS_ERR: &str = "-ERR";

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request a file; the path is the rest of the line after `GET `.
    Get(String),
    Quit,
    Abort,
    /// Any other line. Sent verbatim, answered with `-ERR`.
    Unknown(String),
}

impl Command {
    /// Parse one line (terminator already stripped).
    ///
    /// Only the first whitespace-delimited token selects the command.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim_start();
        let (token, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));

        match token {
            "GET" => Command::Get(rest.to_string()),
            "QUIT" => Command::Quit,
            "ABORT" => Command::Abort,
            _ => Command::Unknown(line.to_string()),
        }
    }

    /// The line as it goes on the wire, without terminator.
    pub fn to_line(&self) -> String {
        match self {
            Command::Get(path) => format!("GET {}", path),
            Command::Quit => "QUIT".to_string(),
            Command::Abort => "ABORT".to_string(),
            Command::Unknown(line) => line.clone(),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Err,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello,
    Command(Command),
    Status(Status),
    SizeHeader(u32),
    DataChunk(Bytes),
    Ack,
}

/// The unit a receiver is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Hello,
    Command,
    Status,
    SizeHeader,
    /// A data unit of the given length (see [`chunk_len`]).
    DataChunk(usize),
    Ack,
}

/// Result of a decode attempt against the bytes buffered so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Frame(Message),
    NeedMoreData,
    Malformed(String),
    /// A line grew past [`MAX_LINE_LEN`] without a terminator. Its bytes
    /// were dropped; the rest of it must be passed to [`skip_line`].
    LineTooLong,
}

// =============================================================================
// Encoding
// =============================================================================

pub fn encode(msg: &Message) -> Bytes {
    match msg {
        Message::Hello => Bytes::from_static(HELLO),
        Message::Ack => Bytes::from_static(ACK),
        Message::Command(cmd) => encode_line(&cmd.to_line()),
        Message::Status(Status::Ok) => encode_line(STATUS_OK),
        Message::Status(Status::Err) => encode_line(STATUS_ERR),
        Message::SizeHeader(size) => {
            let mut buf = BytesMut::with_capacity(SIZE_HEADER_LEN);
            buf.put_u32(*size);
            buf.freeze()
        }
        Message::DataChunk(data) => data.clone(),
    }
}

fn encode_line(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + LINE_END.len());
    buf.put_slice(text.as_bytes());
    buf.put_slice(LINE_END);
    buf.freeze()
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one unit from the front of `buf`.
///
/// Consumed bytes are removed from `buf`, including those of a malformed
/// line, so the caller can answer and keep reading.
pub fn decode(buf: &mut BytesMut, expect: Expect) -> Decoded {
    match expect {
        Expect::Hello => {
            if buf.len() < HELLO.len() {
                return Decoded::NeedMoreData;
            }
            let greeting = buf.split_to(HELLO.len());
            if greeting.as_ref() == HELLO {
                Decoded::Frame(Message::Hello)
            } else {
                Decoded::Malformed(format!("unexpected greeting {:?}", greeting.as_ref()))
            }
        }
        Expect::Ack => {
            if buf.len() < ACK.len() {
                return Decoded::NeedMoreData;
            }
            buf.advance(ACK.len());
            Decoded::Frame(Message::Ack)
        }
        Expect::SizeHeader => {
            if buf.len() < SIZE_HEADER_LEN {
                return Decoded::NeedMoreData;
            }
            Decoded::Frame(Message::SizeHeader(buf.get_u32()))
        }
        Expect::DataChunk(len) => {
            // The wire carries no length; a unit may arrive over several reads.
            let len = len.clamp(1, MAX_CHUNK_SIZE);
            if buf.len() < len {
                return Decoded::NeedMoreData;
            }
            Decoded::Frame(Message::DataChunk(buf.split_to(len).freeze()))
        }
        Expect::Command => match decode_line(buf) {
            Line::Complete(line) => Decoded::Frame(Message::Command(Command::parse(&line))),
            Line::Partial => Decoded::NeedMoreData,
            Line::TooLong => Decoded::LineTooLong,
            Line::Invalid(reason) => Decoded::Malformed(reason),
        },
        Expect::Status => match decode_line(buf) {
            Line::Complete(line) => match line.as_str() {
                STATUS_OK => Decoded::Frame(Message::Status(Status::Ok)),
                STATUS_ERR => Decoded::Frame(Message::Status(Status::Err)),
                other => Decoded::Malformed(format!("unknown status line {:?}", other)),
            },
            Line::Partial => Decoded::NeedMoreData,
            Line::TooLong => Decoded::LineTooLong,
            Line::Invalid(reason) => Decoded::Malformed(reason),
        },
    }
}

/// Discard the rest of a dropped line. Returns `true` once its terminator
/// has been consumed; until then the buffer is emptied as bytes arrive.
pub fn skip_line(buf: &mut BytesMut) -> bool {
    match find_line_end(buf) {
        Some(end) => {
            buf.advance(end + LINE_END.len());
            true
        }
        None => {
            drop_partial_line(buf);
            false
        }
    }
}

enum Line {
    Complete(String),
    Partial,
    TooLong,
    Invalid(String),
}

fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.windows(LINE_END.len()).position(|w| w == LINE_END)
}

/// Empty `buf`, keeping a trailing `\r` that may start the terminator.
fn drop_partial_line(buf: &mut BytesMut) {
    let pending_cr = buf.last() == Some(&LINE_END[0]);
    buf.clear();
    if pending_cr {
        buf.put_u8(LINE_END[0]);
    }
}

fn decode_line(buf: &mut BytesMut) -> Line {
    let Some(end) = find_line_end(buf) else {
        if buf.len() > MAX_LINE_LEN + 1 {
            drop_partial_line(buf);
            return Line::TooLong;
        }
        return Line::Partial;
    };

    let raw = buf.split_to(end + LINE_END.len());
    if end > MAX_LINE_LEN {
        return Line::Invalid(format!("line exceeds {} bytes", MAX_LINE_LEN));
    }
    match String::from_utf8(raw[..end].to_vec()) {
        Ok(line) => Line::Complete(line),
        Err(_) => Line::Invalid("line is not valid UTF-8".to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================
