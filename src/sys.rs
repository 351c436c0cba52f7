use std::{io, ptr::{self, NonNull}};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};

use crate::error::AllocError;

/// The bulk map/unmap primitive the allocator is built on.
///
/// [`MmapMapper`] talks to the kernel; tests substitute counting or failing
/// mappers to observe how often the allocator reaches for fresh memory.
pub trait Mapper {
  /// Maps `size` bytes of private, anonymous, read-write memory.
  fn map(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError>;

  /// Releases a mapping previously returned by [`Mapper::map`].
  ///
  /// # Safety
  ///
  /// `address` and `size` must be exactly a pair handed out by `map`, and
  /// nothing may access the range afterwards.
  unsafe fn unmap(
    &mut self,
    address: NonNull<u8>,
    size: usize,
  ) -> Result<(), AllocError>;
}

/// [`Mapper`] backed by `mmap(2)` / `munmap(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapMapper;

impl Mapper for MmapMapper {
  fn map(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    map_anonymous(size)
  }

  unsafe fn unmap(
    &mut self,
    address: NonNull<u8>,
    size: usize,
  ) -> Result<(), AllocError> {
    unsafe { unmap_anonymous(address, size) }
  }
}

fn last_errno() -> Option<i32> {
  io::Error::last_os_error().raw_os_error()
}

pub(crate) fn map_anonymous(size: usize) -> Result<NonNull<u8>, AllocError> {
  if size == 0 {
    return Err(AllocError::MapFailure { size, errno: None });
  }

  let address = unsafe {
    mmap(
      ptr::null_mut(),
      size,
      PROT_READ | PROT_WRITE,
      MAP_PRIVATE | MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if address == MAP_FAILED {
    return Err(AllocError::MapFailure {
      size,
      errno: last_errno(),
    });
  }

  NonNull::new(address as *mut u8).ok_or(AllocError::MapFailure { size, errno: None })
}

/// # Safety
///
/// See [`Mapper::unmap`].
pub(crate) unsafe fn unmap_anonymous(
  address: NonNull<u8>,
  size: usize,
) -> Result<(), AllocError> {
  if unsafe { munmap(address.as_ptr() as *mut c_void, size) } != 0 {
    return Err(AllocError::UnmapFailure {
      address: address.as_ptr() as usize,
      size,
      errno: last_errno(),
    });
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_map_write_unmap() {
    let mut mapper = MmapMapper;
    let size = 1 << 16;

    let address = mapper.map(size).unwrap();

    unsafe {
      // Fresh anonymous memory is zeroed.
      assert_eq!(*address.as_ptr(), 0);
      assert_eq!(*address.as_ptr().add(size - 1), 0);

      address.as_ptr().write_bytes(0x5A, size);
      assert_eq!(*address.as_ptr().add(size / 2), 0x5A);

      mapper.unmap(address, size).unwrap();
    }
  }

  #[test]
  fn test_zero_sized_map_fails() {
    assert_eq!(
      MmapMapper.map(0),
      Err(AllocError::MapFailure {
        size: 0,
        errno: None
      })
    );
  }

  #[test]
  fn test_impossible_map_fails() {
    let result = MmapMapper.map(usize::MAX - 4095);

    assert!(matches!(
      result,
      Err(AllocError::MapFailure { errno: Some(_), .. })
    ));
  }

  #[test]
  fn test_misaligned_unmap_fails() {
    let mut mapper = MmapMapper;
    let address = mapper.map(8192).unwrap();

    unsafe {
      let misaligned = NonNull::new_unchecked(address.as_ptr().add(1));
      assert!(matches!(
        mapper.unmap(misaligned, 4096),
        Err(AllocError::UnmapFailure { .. })
      ));

      mapper.unmap(address, 8192).unwrap();
    }
  }
}
