use std::{mem, ptr::{self, NonNull}};

use crate::{error::AllocError, guard, sys};

const MIN_TABLE_BYTES: usize = 4096;

/// Growable array of plain values living in its own anonymous mapping.
///
/// The allocator keeps its bookkeeping here instead of in a `Vec`, so no
/// allocation service other than the mapping primitive is ever touched.
pub(crate) struct Table<T: Copy> {
  ptr: *mut T,
  len: usize,
  capacity: usize,
  mapped: usize,
}

// Safety: the table exclusively owns its mapping.
unsafe impl<T: Copy + Send> Send for Table<T> {}

impl<T: Copy> Table<T> {
  pub(crate) const fn new() -> Self {
    Self {
      ptr: ptr::null_mut(),
      len: 0,
      capacity: 0,
      mapped: 0,
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.len
  }

  pub(crate) fn as_slice(&self) -> &[T] {
    if self.ptr.is_null() {
      return &[];
    }

    unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
  }

  pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
    if self.ptr.is_null() {
      return &mut [];
    }

    unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
  }

  /// Appends `value` and returns its index.
  pub(crate) fn push(
    &mut self,
    value: T,
  ) -> Result<usize, AllocError> {
    if self.len == self.capacity {
      self.grow()?;
    }

    let index = self.len;
    unsafe { self.ptr.add(index).write(value) };
    self.len += 1;

    Ok(index)
  }

  /// Removes the element at `index`, moving the last element into its slot.
  pub(crate) fn swap_remove(
    &mut self,
    index: usize,
  ) -> T {
    let slice = self.as_mut_slice();
    let last = slice.len() - 1;
    slice.swap(index, last);
    let value = slice[last];
    self.len -= 1;

    value
  }

  fn grow(&mut self) -> Result<(), AllocError> {
    let bytes = if self.mapped == 0 {
      MIN_TABLE_BYTES
    } else {
      guard::checked_multiply(self.mapped, 2).ok_or(AllocError::Overflow)?
    };

    let fresh = sys::map_anonymous(bytes)?.as_ptr() as *mut T;

    if let Some(old) = NonNull::new(self.ptr) {
      unsafe {
        ptr::copy_nonoverlapping(self.ptr, fresh, self.len);
        release(old.cast(), self.mapped);
      }
    }

    log::trace!("bookkeeping table grown to {bytes} bytes");

    self.ptr = fresh;
    self.mapped = bytes;
    self.capacity = bytes / mem::size_of::<T>();

    Ok(())
  }
}

unsafe fn release(
  address: NonNull<u8>,
  size: usize,
) {
  if let Err(err) = unsafe { sys::unmap_anonymous(address, size) } {
    log::warn!("leaking bookkeeping table: {err}");
  }
}

impl<T: Copy> Drop for Table<T> {
  fn drop(&mut self) {
    if let Some(ptr) = NonNull::new(self.ptr) {
      unsafe { release(ptr.cast(), self.mapped) };
    }
  }
}
