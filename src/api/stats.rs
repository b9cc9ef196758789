//! Tracking statistics.

use crate::util::size::format_bytes;

/// Counters maintained by the entry primitives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Entries currently live (not released).
    pub live_entries: usize,

    /// Entries kept in the table after release (detailed metadata only).
    pub released_entries: usize,

    /// Bytes held by live entries.
    pub live_bytes: usize,

    /// Peak of `live_bytes` (high water mark).
    pub peak_live_bytes: usize,

    /// Entries ever added.
    pub allocation_count: u64,

    /// Releases that found their entry.
    pub release_count: u64,

    /// Releases refused because the entry was already released.
    pub double_release_count: u64,
}

impl TrackerStats {
    /// Create empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_add(&mut self, size: usize) {
        self.allocation_count += 1;
        self.live_entries += 1;
        self.grow(size);
    }

    pub(crate) fn grow(&mut self, size: usize) {
        self.live_bytes = self.live_bytes.saturating_add(size);
        self.peak_live_bytes = self.peak_live_bytes.max(self.live_bytes);
    }

    pub(crate) fn shrink(&mut self, size: usize) {
        self.live_bytes = self.live_bytes.saturating_sub(size);
    }

    pub(crate) fn record_release(&mut self, size: usize, retained: bool) {
        self.release_count += 1;
        self.live_entries = self.live_entries.saturating_sub(1);
        if retained {
            self.released_entries += 1;
        }
        self.shrink(size);
    }

    pub(crate) fn forget_live(&mut self, size: usize) {
        self.live_entries = self.live_entries.saturating_sub(1);
        self.shrink(size);
    }

    /// Entries present in the table, live or released.
    pub fn table_entries(&self) -> usize {
        self.live_entries + self.released_entries
    }
}

impl std::fmt::Display for TrackerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tracking Statistics:")?;
        writeln!(f, "  Live entries:    {}", self.live_entries)?;
        writeln!(f, "  Released kept:   {}", self.released_entries)?;
        writeln!(f, "  Live bytes:      {}", format_bytes(self.live_bytes))?;
        writeln!(f, "  Peak live bytes: {}", format_bytes(self.peak_live_bytes))?;
        writeln!(f, "  Allocations:     {}", self.allocation_count)?;
        writeln!(f, "  Releases:        {}", self.release_count)?;
        writeln!(f, "  Double releases: {}", self.double_release_count)?;
        Ok(())
    }
}
