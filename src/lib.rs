//! Stop-and-wait file transfer over TCP.
//!
//! A client asks for a file by name; the server streams it back one chunk
//! at a time and waits for an acknowledgement after every unit.
//!
//! # Layout
//!
//! - [`protocol`]: wire format and buffered framing
//! - [`transfer`]: the sending and receiving halves of one file transfer
//! - [`client`]: interactive session multiplexing socket and user input
//! - [`server`]: per-connection handler and the worker pool
//! - [`transport`], [`config`], [`cli`], [`logging`]: process plumbing

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod transfer;
pub mod transport;

pub use error::{Error, Result};
