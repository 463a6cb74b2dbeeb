//! Stop-and-wait transfer engine.
//!
//! ```text
//! sender                      receiver
//!   +OK / size / chunk  --->
//!                       <---  ACK
//!   next unit           --->
//! ```
//!
//! Neither side buffers unacknowledged data, so a stalled peer can block
//! a transfer but never corrupt it.

pub mod receiver;
pub mod sender;

pub use receiver::{await_reply, local_file_name, recv_file, Download, Reply};
pub use sender::send_file;
