//! Size helper functions.

/// Multiply an element count by an element size, rejecting overflow.
///
/// The check is done by division (`count > usize::MAX / size`) so the
/// product is never formed when it would wrap. Returns `None` when `size`
/// is zero or the product does not fit in `usize`.
#[inline]
pub const fn array_bytes(count: usize, size: usize) -> Option<usize> {
    if size == 0 || count > usize::MAX / size {
        None
    } else {
        Some(count * size)
    }
}

/// Format bytes as a human-readable string.
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_bytes() {
        assert_eq!(array_bytes(4, 16), Some(64));
        assert_eq!(array_bytes(0, 16), Some(0));
        assert_eq!(array_bytes(4, 0), None);
        assert_eq!(array_bytes(usize::MAX, 2), None);
        assert_eq!(array_bytes(usize::MAX / 2, 2), Some(usize::MAX - 1));
        assert_eq!(array_bytes(usize::MAX / 2 + 1, 2), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }
}
