//! Human-readable reports.

use std::io::{self, Write};

use crate::core::entry::{Entry, Metadata};
use crate::util::size::format_bytes;

/// Write a `report_all` dump of `entries`.
pub fn write_entries<M: Metadata, W: Write>(entries: &[Entry<M>], out: &mut W) -> io::Result<()> {
    let live: usize = entries
        .iter()
        .filter(|e| !e.is_released())
        .map(|e| e.size)
        .sum();

    writeln!(
        out,
        "[memtrack] {} tracked entries, {} live",
        entries.len(),
        format_bytes(live)
    )?;
    for entry in entries {
        M::write_entry(entry, out)?;
    }
    if let Some(note) = M::REPORT_NOTE {
        writeln!(out, "  note: {}", note)?;
    }
    Ok(())
}

/// What shutdown found in the table.
#[derive(Debug, Clone)]
pub struct ShutdownReport<M> {
    /// Entries still live at shutdown. Each was released by the tracker.
    pub leaked: Vec<Entry<M>>,

    /// Entries already marked released (detailed metadata only).
    pub already_released: usize,
}

impl<M> Default for ShutdownReport<M> {
    fn default() -> Self {
        Self {
            leaked: Vec::new(),
            already_released: 0,
        }
    }
}

impl<M> ShutdownReport<M> {
    /// Number of leaked entries.
    pub fn leak_count(&self) -> usize {
        self.leaked.len()
    }

    /// Bytes held by the leaked entries.
    pub fn leaked_bytes(&self) -> usize {
        self.leaked.iter().map(|e| e.size).sum()
    }

    /// Whether nothing leaked.
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty()
    }
}
