//! Process-wide allocator with C-style entry points.
//!
//! The single [`Allocator`] lives behind a spin lock, starts out empty and is
//! never torn down; the system reclaims its mappings at process exit.

use spin::Mutex;

use crate::allocator::{Allocator, Stats};

static ALLOCATOR: Mutex<Allocator> = Mutex::new(Allocator::new());

/// Allocates `size` bytes. Null on failure or when `size` is zero.
pub fn malloc(size: usize) -> *mut u8 {
  ALLOCATOR.lock().allocate(size)
}

/// Allocates `count * size` zeroed bytes. Null on overflow or failure.
pub fn calloc(
  count: usize,
  size: usize,
) -> *mut u8 {
  ALLOCATOR.lock().zero_allocate(count, size)
}

/// Resizes the allocation at `ptr`.
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by this module.
pub unsafe fn realloc(
  ptr: *mut u8,
  size: usize,
) -> *mut u8 {
  unsafe { ALLOCATOR.lock().resize(ptr, size) }
}

/// Releases the allocation at `ptr`. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by this module.
pub unsafe fn free(ptr: *mut u8) {
  unsafe { ALLOCATOR.lock().release(ptr) }
}

pub fn stats() -> Stats {
  ALLOCATOR.lock().stats()
}
