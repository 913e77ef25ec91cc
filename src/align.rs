//! Alignment unit and overflow-safe fit checks.

use std::mem;

/// Alignment unit for every size and address the pool hands out.
///
/// One machine word: chunk sources are only required to return
/// word-aligned memory.
pub const ALIGN: usize = mem::size_of::<usize>();

/// Largest request the pool will try to satisfy.
///
/// Derived from the pointer-difference range: `isize::MAX` minus one chunk
/// header, rounded down to [`ALIGN`].
pub const MAX_ALLOCATION: usize =
    (isize::MAX as usize - crate::chunk::HEADER_SIZE) & !(ALIGN - 1);

/// Rounds `size` up to the next multiple of [`ALIGN`].
///
/// Returns `None` when rounding would overflow `usize`.
#[must_use]
pub const fn align_up(size: usize) -> Option<usize> {
    match size.checked_add(ALIGN - 1) {
        Some(padded) => Some(padded & !(ALIGN - 1)),
        None => None,
    }
}

/// Rounds `size` down to a multiple of [`ALIGN`].
#[must_use]
pub const fn align_down(size: usize) -> usize {
    size & !(ALIGN - 1)
}

/// Returns `true` when `size` bytes starting at address `from` end inside
/// `(start, end]`.
///
/// Two comparisons on the wrapped sum: a single `from + size <= end` would
/// accept a sum that wrapped past the top of the address space.
#[must_use]
pub const fn fits(from: usize, size: usize, start: usize, end: usize) -> bool {
    let candidate = from.wrapping_add(size);
    candidate > start && candidate <= end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_per_word() {
        for i in 0..10 {
            let expected = ALIGN * (i + 1);
            for size in (ALIGN * i + 1)..=(ALIGN * (i + 1)) {
                assert_eq!(align_up(size), Some(expected));
            }
        }
        assert_eq!(align_up(0), Some(0));
    }

    #[test]
    fn rounding_overflow_is_reported() {
        assert_eq!(align_up(usize::MAX), None);
        assert_eq!(align_up(usize::MAX - ALIGN + 2), None);
    }

    #[test]
    fn rounds_down() {
        assert_eq!(align_down(ALIGN * 3 + 1), ALIGN * 3);
        assert_eq!(align_down(ALIGN - 1), 0);
    }

    #[test]
    fn fit_check_rejects_wraparound() {
        let start = usize::MAX - 64;
        let end = usize::MAX - 8;
        assert!(fits(start + 16, 8, start, end));
        assert!(fits(start + 16, end - start - 16, start, end));
        assert!(!fits(start + 16, end - start - 15, start, end));
        // Wraps to a small address: below `end` but not above `start`.
        assert!(!fits(start + 16, 64, start, end));
    }

    #[test]
    fn zero_size_fits_at_end() {
        assert!(fits(100, 0, 50, 100));
        assert!(!fits(50, 0, 50, 100));
    }

    #[test]
    fn max_allocation_is_aligned() {
        assert_eq!(MAX_ALLOCATION % ALIGN, 0);
        assert!(MAX_ALLOCATION < isize::MAX as usize);
    }
}
