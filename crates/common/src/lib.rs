//! Shared error helpers and small utilities used across the crosstalk crates.

pub mod error;
pub mod time;

pub use error::FromMessage;
