use std::mem;

use crate::guard;

/// Machine word size, the alignment every block size is rounded to.
pub const WORD: usize = mem::size_of::<usize>();

/// Calculates the machine word alignment for the given size.
///
/// The expression is not overflow checked, use [`checked_align`] for sizes
/// that come from a caller.
///
/// # Examples
///
/// ```rust
/// use mapalloc::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::core::mem::size_of::<usize>())
  };
}

/// Rounds `value` up to a multiple of `align`, which must be a power of two.
///
/// ```rust
/// use mapalloc::align_to;
///
/// assert_eq!(align_to!(17, 16), 32);
/// assert_eq!(align_to!(32, 16), 32);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Word-aligns `value`, or returns `None` if the rounding would wrap.
pub const fn checked_align(value: usize) -> Option<usize> {
  match guard::checked_add(value, WORD - 1) {
    Some(padded) => Some(padded & !(WORD - 1)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (WORD * i + 1)..=(WORD * (i + 1));

      let expected_alignment = WORD * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_align_to() {
    assert_eq!(align_to!(0usize, 16), 0);
    assert_eq!(align_to!(1usize, 16), 16);
    assert_eq!(align_to!(4095usize, 4096), 4096);
    assert_eq!(align_to!(4097usize, 4096), 8192);
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - WORD + 2), None);
    assert_eq!(checked_align(usize::MAX - WORD + 1), Some(usize::MAX - WORD + 1));
  }
}
