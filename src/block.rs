use std::{mem, ptr::NonNull};

use crate::{align, error::AllocError};

/// In-band header written at the start of every allocated block.
///
/// ```text
///   ┌──────────────────────┬─────────────────────────────┐
///   │ Header               │ payload                     │
///   │  size: total bytes   │                             │
///   │  tag:  owner check   │                             │
///   └──────────────────────┴─────────────────────────────┘
///   ^ block address        ^ block address + HEADER_SIZE
/// ```
#[repr(C)]
struct Header {
  size: usize,
  tag: usize,
}

/// Bytes taken by the block header. Payloads start this far into a block.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

const _: () = assert!(HEADER_SIZE == align!(HEADER_SIZE));

const TAG_SEED: usize = 0xA110_C8ED;

const fn tag_for(address: usize) -> usize {
  TAG_SEED ^ address
}

/// A contiguous span of mapped memory, identified by its start address.
///
/// `size` counts the whole block, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub address: usize,
  pub size: usize,
}

impl Block {
  pub const fn new(
    address: usize,
    size: usize,
  ) -> Self {
    Self { address, size }
  }

  /// First address past the block.
  pub const fn end(&self) -> usize {
    self.address + self.size
  }

  /// Bytes usable by the caller once the block is handed out.
  pub const fn capacity(&self) -> usize {
    self.size.saturating_sub(HEADER_SIZE)
  }

  pub const fn overlaps(
    &self,
    start: usize,
    end: usize,
  ) -> bool {
    self.address < end && start < self.end()
  }

  /// Stamps the header and returns the payload pointer.
  ///
  /// # Safety
  ///
  /// The block must lie in writable memory owned by the allocator and be
  /// aligned for a `usize`.
  pub(crate) unsafe fn write_header(&self) -> NonNull<u8> {
    let header = self.address as *mut Header;

    unsafe {
      header.write(Header {
        size: self.size,
        tag: tag_for(self.address),
      });

      NonNull::new_unchecked((self.address as *mut u8).add(HEADER_SIZE))
    }
  }

  /// Clears the ownership tag so the block is no longer recognized as live.
  ///
  /// # Safety
  ///
  /// Same as [`Block::write_header`].
  pub(crate) unsafe fn retire_header(&self) {
    unsafe { (*(self.address as *mut Header)).tag = 0 };
  }

  /// Recovers the block owning `payload` from the header right before it.
  ///
  /// This is the only place a payload pointer is turned back into a block.
  /// Obviously foreign pointers (too low, misaligned, untagged, already
  /// released) are rejected with [`AllocError::InvalidPointer`].
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by this allocator. The tag check is
  /// best effort: reading the would-be header of an arbitrary pointer is
  /// itself undefined behavior.
  pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> Result<Self, AllocError> {
    let payload = payload.as_ptr() as usize;
    let invalid = AllocError::InvalidPointer { address: payload };

    if payload < HEADER_SIZE || payload % mem::align_of::<Header>() != 0 {
      return Err(invalid);
    }

    let address = payload - HEADER_SIZE;
    let header = unsafe { &*(address as *const Header) };

    if header.tag != tag_for(address) || header.size <= HEADER_SIZE {
      return Err(invalid);
    }

    Ok(Self::new(address, header.size))
  }
}
