//! Layout utilities.

/// Size of a data pointer on this target.
pub const PTR_SIZE: usize = std::mem::size_of::<*const ()>();

/// Round `value` up to a multiple of `align`.
///
/// Works for any non-zero `align`; powers of two take the mask path.
/// Returns `None` if the rounded value would overflow.
#[inline]
pub const fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    if align <= 1 {
        return Some(value);
    }
    if value > usize::MAX - (align - 1) {
        return None;
    }
    if align.is_power_of_two() {
        Some((value + (align - 1)) & !(align - 1))
    } else {
        Some(((value + (align - 1)) / align) * align)
    }
}

/// Check whether `ptr` is aligned to `align`.
#[inline]
pub fn is_aligned_to(ptr: *const u8, align: usize) -> bool {
    align != 0 && (ptr as usize) % align == 0
}
