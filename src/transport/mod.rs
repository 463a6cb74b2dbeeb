//! Socket setup. Protocol handling lives in `protocol` and `transfer`.

pub mod tcp;

pub use tcp::{bind, connect};
