/// Failures reported by the allocator.
///
/// The malloc-style entry points fold every variant into a null return; the
/// `try_*` methods hand it back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
  /// A size computation would wrap around `usize`.
  #[error("size computation overflowed")]
  Overflow,
  /// The mapping primitive refused to map `size` bytes.
  #[error("failed to map {size} bytes (errno {errno:?})")]
  MapFailure { size: usize, errno: Option<i32> },
  /// The unmapping primitive refused to release a mapping. Never fatal.
  #[error("failed to unmap {size} bytes at {address:#x} (errno {errno:?})")]
  UnmapFailure {
    address: usize,
    size: usize,
    errno: Option<i32>,
  },
  /// The pointer does not carry a header written by this allocator.
  #[error("pointer {address:#x} was not allocated here or was already released")]
  InvalidPointer { address: usize },
}
