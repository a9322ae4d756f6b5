//! Hex-dump tracing.
//!
//! - **`format`** – Turns a byte slice into hex-dump rows.
//! - **`decorator`** – [`HexDumpDecorator`], which publishes those rows for
//!   every message crossing a connection.

pub mod decorator;
pub mod format;

pub use decorator::{HexDumpDecorator, HexDumpDelegate};
pub use format::{format_row, printable, HexDumpRows, BYTES_PER_ROW};
