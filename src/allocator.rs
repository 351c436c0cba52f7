use std::ptr::{self, NonNull};

use crate::{
  align,
  block::{Block, HEADER_SIZE},
  config::Config,
  error::AllocError,
  free_list::FreeList,
  guard,
  region::Regions,
  sys::{Mapper, MmapMapper},
};

/// Whether any allocation is known to be outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  /// More allocations issued than released.
  Active,
  /// Every issued allocation has been released, including the initial state.
  Quiescent,
}

/// Snapshot of the allocator's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
  pub issued: usize,
  pub released: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub regions: usize,
  pub mapped_bytes: usize,
}

/// First-fit free-list allocator on top of a bulk [`Mapper`].
///
/// Not thread-safe: every method takes `&mut self`. Wrap it in a lock to
/// share it, as [`crate::global`] does.
///
/// Memory returns to the system only once every issued allocation has been
/// released. Dropping the allocator unmaps everything it still holds, which
/// leaves any outstanding pointer dangling.
pub struct Allocator<M: Mapper = MmapMapper> {
  free_list: FreeList,
  regions: Regions<M>,
  issued: usize,
  released: usize,
}

impl Allocator<MmapMapper> {
  pub const fn new() -> Self {
    Self::with_config(MmapMapper, Config::new())
  }
}

impl Default for Allocator<MmapMapper> {
  fn default() -> Self {
    Self::new()
  }
}

impl<M: Mapper> Allocator<M> {
  pub fn with_mapper(mapper: M) -> Self {
    Self::with_config(mapper, Config::new())
  }

  pub const fn with_config(
    mapper: M,
    config: Config,
  ) -> Self {
    Self {
      free_list: FreeList::new(),
      regions: Regions::new(mapper, config),
      issued: 0,
      released: 0,
    }
  }

  pub fn mapper(&self) -> &M {
    self.regions.mapper()
  }

  pub fn mapper_mut(&mut self) -> &mut M {
    self.regions.mapper_mut()
  }

  pub fn state(&self) -> State {
    if self.issued == self.released {
      State::Quiescent
    } else {
      State::Active
    }
  }

  pub fn stats(&self) -> Stats {
    Stats {
      issued: self.issued,
      released: self.released,
      free_blocks: self.free_list.len(),
      free_bytes: self.free_list.free_bytes(),
      regions: self.regions.len(),
      mapped_bytes: self.regions.mapped_bytes(),
    }
  }

  /// Free blocks in address order.
  pub fn free_blocks(&self) -> impl Iterator<Item = Block> + '_ {
    self.free_list.iter()
  }

  /// Allocates at least `size` bytes.
  ///
  /// `Ok(None)` for a zero-sized request, which allocates nothing.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    if size == 0 {
      return Ok(None);
    }

    let block_size = guard::checked_add(size, HEADER_SIZE)
      .and_then(align::checked_align)
      .ok_or(AllocError::Overflow)?;

    let block = match self.free_list.search(block_size) {
      Some(block) => block,
      None => self.grow(block_size)?,
    };

    self.issued += 1;
    let payload = unsafe { block.write_header() };

    log::trace!("allocate({size}) -> {:p}", payload);

    Ok(Some(payload))
  }

  /// Maps a fresh region and carves a `block_size` block from it.
  fn grow(
    &mut self,
    block_size: usize,
  ) -> Result<Block, AllocError> {
    let region = self.regions.acquire(block_size)?;

    if let Err(err) = self.free_list.insert(region) {
      let _ = unsafe { self.regions.release(region) };
      return Err(err);
    }

    self.free_list.merge_adjacent();

    self.free_list.search(block_size).ok_or(AllocError::MapFailure {
      size: region.size,
      errno: None,
    })
  }

  /// Allocates `count * element_size` zeroed bytes.
  pub fn try_zero_allocate(
    &mut self,
    count: usize,
    element_size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let size = guard::checked_multiply(count, element_size).ok_or(AllocError::Overflow)?;

    let payload = self.try_allocate(size)?;

    if let Some(payload) = payload {
      unsafe { payload.as_ptr().write_bytes(0, size) };
    }

    Ok(payload)
  }

  /// Moves the allocation at `ptr` into a fresh block of `new_size` bytes.
  ///
  /// A null `ptr` allocates; a zero `new_size` releases and yields
  /// `Ok(None)`. On failure the original allocation is left untouched.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn try_resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let Some(old) = NonNull::new(ptr) else {
      return self.try_allocate(new_size);
    };

    if new_size == 0 {
      unsafe { self.try_release(ptr)? };
      return Ok(None);
    }

    let old_block = unsafe { self.live_block(old)? };

    let Some(new) = self.try_allocate(new_size)? else {
      return Ok(None);
    };

    unsafe {
      ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old_block.capacity().min(new_size));
      self.try_release(ptr)?;
    }

    log::trace!("resize({:p}, {new_size}) -> {:p}", ptr, new);

    Ok(Some(new))
  }

  /// Returns the allocation at `ptr` to the free list. Null is a no-op.
  ///
  /// Once every issued allocation is released, all regions are unmapped.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  /// Foreign pointers and double frees are detected on a best-effort basis
  /// only.
  pub unsafe fn try_release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    let Some(payload) = NonNull::new(ptr) else {
      return Ok(());
    };

    let block = unsafe { self.live_block(payload)? };

    unsafe { block.retire_header() };
    self.released += 1;

    if let Err(err) = self.free_list.insert(block) {
      log::warn!("leaking block {:#x} ({} bytes): {err}", block.address, block.size);
    }

    self.free_list.merge_adjacent();

    log::trace!("release({:p})", ptr);

    if self.state() == State::Quiescent {
      self.free_list.merge_adjacent();
      self.release_regions();
    }

    Ok(())
  }

  /// Recovers the block behind a payload the caller claims is live.
  ///
  /// # Safety
  ///
  /// See [`Block::from_payload`].
  unsafe fn live_block(
    &self,
    payload: NonNull<u8>,
  ) -> Result<Block, AllocError> {
    // With nothing outstanding the regions may already be unmapped, so the
    // header must not be read.
    if self.released >= self.issued {
      return Err(AllocError::InvalidPointer {
        address: payload.as_ptr() as usize,
      });
    }

    unsafe { Block::from_payload(payload) }
  }

  fn release_regions(&mut self) {
    let released = unsafe { self.regions.release_all(&mut self.free_list) };

    log::debug!("quiescent, released {released} region(s), {} still mapped", self.regions.len());
  }

  /// `malloc`: null on failure or for a zero-sized request.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    null_on_failure(self.try_allocate(size))
  }

  /// `calloc`: null on overflow or failure.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    element_size: usize,
  ) -> *mut u8 {
    null_on_failure(self.try_zero_allocate(count, element_size))
  }

  /// `realloc`: null when `new_size` is zero or on failure.
  ///
  /// # Safety
  ///
  /// See [`Allocator::try_resize`].
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    null_on_failure(unsafe { self.try_resize(ptr, new_size) })
  }

  /// `free`: never fails observably, problems go to the log.
  ///
  /// # Safety
  ///
  /// See [`Allocator::try_release`].
  pub unsafe fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    if let Err(err) = unsafe { self.try_release(ptr) } {
      log::error!("release({:p}) ignored: {err}", ptr);
    }
  }
}

fn null_on_failure(result: Result<Option<NonNull<u8>>, AllocError>) -> *mut u8 {
  match result {
    Ok(Some(ptr)) => ptr.as_ptr(),
    Ok(None) => ptr::null_mut(),
    Err(err) => {
      log::debug!("allocation failed: {err}");
      ptr::null_mut()
    }
  }
}

impl<M: Mapper> std::fmt::Debug for Allocator<M> {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("Allocator")
      .field("issued", &self.issued)
      .field("released", &self.released)
      .field("free_list", &self.free_list)
      .field("regions", &self.regions.len())
      .finish()
  }
}
