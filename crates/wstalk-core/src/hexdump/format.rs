//! Hex-dump row formatting.
//!
//! Row layout (offsets are zero-padded hex, minimum four digits):
//!
//! ```text
//! 0000  48 65 6c 6c 6f 2c 20 57  6f 72 6c 64 21 0d 0a 00  Hello,.World!...
//! 0010  48 69                                              Hi
//! ```
//!
//! - 16 bytes per row, split into two halves of 8 by an extra space.
//! - Two spaces separate the hex column from the ASCII column.
//! - Bytes 33..=126 print as themselves; everything else prints as `.`.
//! - A short final row is padded with blanks so its ASCII column starts at
//!   the same column as a full row.

use std::fmt::Write;

/// Number of bytes rendered on one row.
pub const BYTES_PER_ROW: usize = 16;

/// Bytes per half-row; an extra space separates the halves.
const HALF_ROW: usize = 8;

/// Iterator over the formatted rows of a hex dump.
///
/// Rows are formatted lazily, one per call to `next`, so a caller can emit
/// each row as soon as it is produced.
///
/// # Examples
///
/// ```rust
/// use wstalk_core::hexdump::HexDumpRows;
///
/// let rows: Vec<String> = HexDumpRows::new(b"Hi").collect();
/// assert_eq!(rows.len(), 1);
/// assert!(rows[0].starts_with("0000  48 69"));
/// assert!(rows[0].ends_with("  Hi"));
/// ```
#[derive(Debug, Clone)]
pub struct HexDumpRows<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> HexDumpRows<'a> {
    /// Creates an iterator over the rows needed to dump `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl Iterator for HexDumpRows<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.offset >= self.data.len() {
            return None;
        }
        let end = (self.offset + BYTES_PER_ROW).min(self.data.len());
        let line = format_row(self.offset, &self.data[self.offset..end]);
        self.offset = end;
        Some(line)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.data.len().saturating_sub(self.offset);
        let rows = remaining.div_ceil(BYTES_PER_ROW);
        (rows, Some(rows))
    }
}

impl ExactSizeIterator for HexDumpRows<'_> {}

/// Formats one row of at most [`BYTES_PER_ROW`] bytes starting at `offset`.
pub fn format_row(offset: usize, row: &[u8]) -> String {
    let mut line = String::with_capacity(4 + BYTES_PER_ROW * 3 + 4 + BYTES_PER_ROW);
    // Writing into a String cannot fail.
    let _ = write!(line, "{offset:04x}");
    for slot in 0..BYTES_PER_ROW {
        if slot % HALF_ROW == 0 {
            line.push(' ');
        }
        match row.get(slot) {
            Some(byte) => {
                let _ = write!(line, " {byte:02x}");
            }
            None => line.push_str("   "),
        }
    }
    line.push_str("  ");
    line.extend(row.iter().map(|&byte| printable(byte)));
    line
}

/// Renders one byte for the ASCII column.
pub fn printable(byte: u8) -> char {
    if (33..=126).contains(&byte) {
        char::from(byte)
    } else {
        '.'
    }
}

/// Announcement line emitted before the rows of an outbound message.
pub fn sending_announcement(len: usize) -> String {
    format!("Sending {len} bytes:")
}

/// Announcement line emitted before the rows of an inbound message.
pub fn received_announcement(len: usize) -> String {
    format!("Received {len} bytes:")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
