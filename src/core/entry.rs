//! Tracked entries and the two metadata variants.
//!
//! [`Entry`] is the record kept per tracked address. What else an entry
//! carries is decided by its [`Metadata`]: [`Lean`] stores nothing and drops
//! the entry on release, [`Detailed`] keeps call sites and keeps released
//! entries around so a second release can be refused.

use std::fmt;
use std::io::{self, Write};

/// Call-site identification: originating file and line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Site {
    /// Source file.
    pub file: &'static str,
    /// Line within `file`.
    pub line: u32,
}

impl Site {
    /// Build a site from its parts.
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// The location of the caller.
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self::new(location.file(), location.line())
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Capture the current source location as a [`Site`].
///
/// ```
/// let site = memtrack::site!();
/// assert_eq!(site.file, file!());
/// ```
#[macro_export]
macro_rules! site {
    () => {
        $crate::Site::new(file!(), line!())
    };
}

/// What the tracker should do with an entry that is being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAction {
    /// Remove the entry from the table.
    Remove,
    /// Keep the entry, now marked released.
    Retain,
    /// The entry was already released; refuse the second release.
    Refuse {
        /// Where the first release happened.
        previous: Option<Site>,
    },
}

/// Per-entry metadata policy.
///
/// The tracker is written once against this trait; the behaviour that
/// differs between a lean and a debug-instrumented build lives here.
pub trait Metadata: Clone + Send + 'static {
    /// Variant name for reports.
    const NAME: &'static str;

    /// Footer printed after a report, if the variant omits detail.
    const REPORT_NOTE: Option<&'static str>;

    /// Metadata for a fresh allocation made at `site`.
    fn allocated(site: Site) -> Self;

    /// Record a resize performed at `site`.
    fn resized(&mut self, site: Site);

    /// Apply a release performed at `site`.
    fn release(&mut self, site: Site) -> ReleaseAction;

    /// Where the entry was released, if it has been.
    fn released_at(&self) -> Option<Site>;

    /// Whether the entry is marked released.
    fn is_released(&self) -> bool {
        self.released_at().is_some()
    }

    /// Write one `report_all` line block for `entry`.
    fn write_entry<W: Write>(entry: &Entry<Self>, out: &mut W) -> io::Result<()>;

    /// Context for the leak diagnostic raised at shutdown, or `None` to
    /// release the block silently.
    fn leak_context(entry: &mut Entry<Self>) -> Option<String>;
}

/// One tracked allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<M> {
    /// Base address of the block.
    pub address: usize,
    /// Size in bytes as last recorded.
    pub size: usize,
    /// Variant-specific metadata.
    pub meta: M,
}

impl<M: Metadata> Entry<M> {
    /// A fresh entry allocated at `site`.
    pub fn new(address: usize, size: usize, site: Site) -> Self {
        Self {
            address,
            size,
            meta: M::allocated(site),
        }
    }

    /// Whether the entry is marked released.
    pub fn is_released(&self) -> bool {
        self.meta.is_released()
    }
}

// =============================================================================
// Lean
// =============================================================================

/// Metadata that records nothing.
///
/// Released entries are removed immediately, so a double release reaches
/// the system allocator unchecked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lean;

impl Metadata for Lean {
    const NAME: &'static str = "lean";
    const REPORT_NOTE: Option<&'static str> =
        Some("build with the `debug` feature (or a Detailed tracker) for allocation sites");

    fn allocated(_site: Site) -> Self {
        Lean
    }

    fn resized(&mut self, _site: Site) {}

    fn release(&mut self, _site: Site) -> ReleaseAction {
        ReleaseAction::Remove
    }

    fn released_at(&self) -> Option<Site> {
        None
    }

    fn write_entry<W: Write>(entry: &Entry<Self>, out: &mut W) -> io::Result<()> {
        writeln!(out, "  {:#x}: {} bytes", entry.address, entry.size)
    }

    fn leak_context(_entry: &mut Entry<Self>) -> Option<String> {
        None
    }
}

// =============================================================================
// Detailed
// =============================================================================

/// Metadata with call-site provenance.
///
/// Released entries stay in the table, marked, until shutdown.
#[derive(Debug, Clone)]
pub struct Detailed {
    /// Where the block was first allocated.
    pub allocation_site: Site,
    /// Where the block was last resized.
    pub last_resize_site: Option<Site>,
    /// Where the block was released.
    pub release_site: Option<Site>,
    #[cfg(feature = "debug")]
    backtrace: backtrace::Backtrace,
}

impl PartialEq for Detailed {
    fn eq(&self, other: &Self) -> bool {
        self.allocation_site == other.allocation_site
            && self.last_resize_site == other.last_resize_site
            && self.release_site == other.release_site
    }
}

impl Eq for Detailed {}

impl Detailed {
    /// Resolved allocation backtrace, formatted.
    #[cfg(feature = "debug")]
    pub fn resolved_backtrace(&mut self) -> String {
        self.backtrace.resolve();
        format!("{:?}", self.backtrace)
    }
}

impl Metadata for Detailed {
    const NAME: &'static str = "detailed";
    const REPORT_NOTE: Option<&'static str> = None;

    fn allocated(site: Site) -> Self {
        Self {
            allocation_site: site,
            last_resize_site: None,
            release_site: None,
            #[cfg(feature = "debug")]
            backtrace: backtrace::Backtrace::new_unresolved(),
        }
    }

    fn resized(&mut self, site: Site) {
        self.last_resize_site = Some(site);
    }

    fn release(&mut self, site: Site) -> ReleaseAction {
        match self.release_site {
            Some(previous) => ReleaseAction::Refuse {
                previous: Some(previous),
            },
            None => {
                self.release_site = Some(site);
                ReleaseAction::Retain
            }
        }
    }

    fn released_at(&self) -> Option<Site> {
        self.release_site
    }

    fn write_entry<W: Write>(entry: &Entry<Self>, out: &mut W) -> io::Result<()> {
        let meta = &entry.meta;
        if let Some(site) = meta.release_site {
            writeln!(out, "  Already Freed")?;
            writeln!(out, "    Pointer: {:#x}, Size: {} bytes", entry.address, entry.size)?;
            writeln!(out, "    Free at {}", site)?;
        } else {
            writeln!(out, "  Pointer: {:#x}, Size: {} bytes", entry.address, entry.size)?;
        }
        writeln!(out, "    Allocated at {}", meta.allocation_site)?;
        if let Some(site) = meta.last_resize_site {
            writeln!(out, "    Last resized at {}", site)?;
        }
        Ok(())
    }

    fn leak_context(entry: &mut Entry<Self>) -> Option<String> {
        let mut context = format!(
            "address={:#x} size={} allocated at {}",
            entry.address, entry.size, entry.meta.allocation_site
        );
        if let Some(site) = entry.meta.last_resize_site {
            context.push_str(&format!(", last resized at {}", site));
        }
        #[cfg(feature = "debug")]
        {
            context.push_str("\n  backtrace:\n");
            context.push_str(&entry.meta.resolved_backtrace());
        }
        Some(context)
    }
}

/// Metadata selected by build configuration.
#[cfg(feature = "debug")]
pub type DefaultMetadata = Detailed;

/// Metadata selected by build configuration.
#[cfg(not(feature = "debug"))]
pub type DefaultMetadata = Lean;
