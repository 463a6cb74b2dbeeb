//! Interactive client: one session per connection.

pub mod console;
pub mod session;

pub use console::Console;
pub use session::{Session, SessionEnd, SessionSummary};
