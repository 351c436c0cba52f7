use std::ptr::NonNull;

use crate::{
  block::{Block, HEADER_SIZE},
  config::Config,
  error::AllocError,
  free_list::FreeList,
  guard,
  sys::Mapper,
  table::Table,
};

/// Acquires memory from the [`Mapper`] in large chunks and remembers every
/// mapping so it can later be released with its exact original extent.
pub struct Regions<M: Mapper> {
  mapper: M,
  mappings: Table<Block>,
  min_chunk_size: usize,
}

impl<M: Mapper> Regions<M> {
  pub const fn new(
    mapper: M,
    config: Config,
  ) -> Self {
    Self {
      mapper,
      mappings: Table::new(),
      min_chunk_size: config.min_chunk_size,
    }
  }

  pub fn mapper(&self) -> &M {
    &self.mapper
  }

  pub fn mapper_mut(&mut self) -> &mut M {
    &mut self.mapper
  }

  /// Number of live mappings.
  pub fn len(&self) -> usize {
    self.mappings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn mapped_bytes(&self) -> usize {
    self.mappings.as_slice().iter().map(|region| region.size).sum()
  }

  pub fn iter(&self) -> impl Iterator<Item = Block> + '_ {
    self.mappings.as_slice().iter().copied()
  }

  /// Size of the mapping [`Regions::acquire`] requests for `min_payload`.
  ///
  /// Room for the payload plus one header, rounded up to a whole number of
  /// headers, and never below the configured minimum chunk.
  pub fn request_size(
    &self,
    min_payload: usize,
  ) -> Result<usize, AllocError> {
    let request = guard::checked_add(min_payload, HEADER_SIZE).ok_or(AllocError::Overflow)?;
    let units = request
      .div_ceil(HEADER_SIZE)
      .max(self.min_chunk_size.div_ceil(HEADER_SIZE));

    match guard::checked_multiply(units, HEADER_SIZE) {
      Some(0) => Err(AllocError::MapFailure { size: 0, errno: None }),
      Some(size) => Ok(size),
      None => Err(AllocError::Overflow),
    }
  }

  /// Maps a new region able to hold `min_payload` bytes and returns it as a
  /// single block.
  pub fn acquire(
    &mut self,
    min_payload: usize,
  ) -> Result<Block, AllocError> {
    let size = self.request_size(min_payload)?;
    let address = self.mapper.map(size)?;
    let region = Block::new(address.as_ptr() as usize, size);

    if let Err(err) = self.mappings.push(region) {
      let _ = unsafe { self.unmap(region) };
      return Err(err);
    }

    log::debug!("mapped region {:#x}..{:#x} ({} bytes)", region.address, region.end(), size);

    Ok(region)
  }

  unsafe fn unmap(
    &mut self,
    region: Block,
  ) -> Result<(), AllocError> {
    let address = NonNull::new(region.address as *mut u8).ok_or(AllocError::InvalidPointer {
      address: region.address,
    })?;

    unsafe { self.mapper.unmap(address, region.size) }
      .inspect(|_| log::debug!("unmapped region {:#x}..{:#x}", region.address, region.end()))
      .inspect_err(|err| log::warn!("leaving region mapped: {err}"))
  }

  /// Unmaps the recorded region starting at `region.address`.
  ///
  /// An unmap failure is reported and the region stays mapped and recorded.
  ///
  /// # Safety
  ///
  /// Nothing may reference memory inside the region afterwards.
  pub unsafe fn release(
    &mut self,
    region: Block,
  ) -> Result<(), AllocError> {
    let index = self
      .mappings
      .as_slice()
      .iter()
      .position(|mapping| mapping.address == region.address)
      .ok_or(AllocError::InvalidPointer {
        address: region.address,
      })?;

    let region = self.mappings.as_slice()[index];

    unsafe { self.unmap(region)? };
    self.mappings.swap_remove(index);

    Ok(())
  }

  /// Unmaps every recorded region, one call per original mapping, and drops
  /// the free space inside each from `free_list`.
  ///
  /// Regions whose unmap fails stay mapped, recorded and reusable. Returns
  /// the number of regions released.
  ///
  /// # Safety
  ///
  /// No live allocation may point into any recorded region.
  pub unsafe fn release_all(
    &mut self,
    free_list: &mut FreeList,
  ) -> usize {
    let mut released = 0;
    let mut index = self.mappings.len();

    while index > 0 {
      index -= 1;
      let region = self.mappings.as_slice()[index];

      if unsafe { self.unmap(region) }.is_err() {
        continue;
      }

      self.mappings.swap_remove(index);
      released += 1;

      if let Err(err) = free_list.remove_range(region.address, region.end()) {
        log::warn!("free list lost track of region {:#x}: {err}", region.address);
      }
    }

    released
  }
}

impl<M: Mapper> Drop for Regions<M> {
  fn drop(&mut self) {
    for index in 0..self.mappings.len() {
      let region = self.mappings.as_slice()[index];
      let _ = unsafe { self.unmap(region) };
    }
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::{cell::Cell, rc::Rc};

  use super::*;
  use crate::sys::MmapMapper;

  /// Counts calls and can be told to refuse mappings or unmappings.
  ///
  /// `unmapped` is shared so it can still be read after the owner is dropped.
  #[derive(Debug, Default)]
  pub(crate) struct TestMapper {
    pub maps: usize,
    pub unmaps: usize,
    pub unmapped: Rc<Cell<usize>>,
    pub fail_map: bool,
    pub fail_unmap: bool,
  }

  impl Mapper for TestMapper {
    fn map(
      &mut self,
      size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
      if self.fail_map {
        return Err(AllocError::MapFailure { size, errno: None });
      }

      self.maps += 1;
      MmapMapper.map(size)
    }

    unsafe fn unmap(
      &mut self,
      address: NonNull<u8>,
      size: usize,
    ) -> Result<(), AllocError> {
      if self.fail_unmap {
        return Err(AllocError::UnmapFailure {
          address: address.as_ptr() as usize,
          size,
          errno: None,
        });
      }

      self.unmaps += 1;
      self.unmapped.set(self.unmapped.get() + 1);
      unsafe { MmapMapper.unmap(address, size) }
    }
  }

  fn regions(min_chunk_size: usize) -> Regions<TestMapper> {
    Regions::new(TestMapper::default(), Config::new().with_min_chunk_size(min_chunk_size))
  }

  #[test]
  fn test_request_size_uses_minimum_chunk() {
    let regions = regions(Config::new().min_chunk_size);

    assert_eq!(regions.request_size(1).unwrap(), 16 << 20);
    assert_eq!(regions.request_size(1024).unwrap(), 16 << 20);
  }

  #[test]
  fn test_request_size_grows_with_payload() {
    let regions = regions(4096);
    let size = regions.request_size(10_000).unwrap();

    assert_eq!(size % HEADER_SIZE, 0);
    assert!(size >= 10_000 + HEADER_SIZE);
    assert!(size < 10_000 + 2 * HEADER_SIZE);
  }

  #[test]
  fn test_request_size_overflow() {
    let regions = regions(4096);

    assert_eq!(regions.request_size(usize::MAX), Err(AllocError::Overflow));
    assert_eq!(regions.request_size(usize::MAX - HEADER_SIZE), Err(AllocError::Overflow));
  }

  #[test]
  fn test_acquire_and_release() {
    let mut regions = regions(4096);

    let first = regions.acquire(100).unwrap();
    let second = regions.acquire(8192).unwrap();

    assert_eq!(first.size, 4096);
    assert_eq!(regions.len(), 2);
    assert_eq!(regions.mapped_bytes(), first.size + second.size);
    assert_eq!(regions.mapper().maps, 2);

    unsafe {
      (first.address as *mut u8).write_bytes(0xEE, first.size);
      regions.release(first).unwrap();
    }

    assert_eq!(regions.len(), 1);
    assert_eq!(regions.iter().collect::<Vec<_>>(), vec![second]);
    assert_eq!(regions.mapper().unmaps, 1);
  }

  #[test]
  fn test_acquire_reports_map_failure() {
    let mut regions = regions(4096);
    regions.mapper.fail_map = true;

    assert!(matches!(regions.acquire(1), Err(AllocError::MapFailure { .. })));
    assert!(regions.is_empty());
  }

  #[test]
  fn test_release_all_clears_free_list() {
    let mut regions = regions(4096);
    let mut free_list = FreeList::new();

    for _ in 0..3 {
      let region = regions.acquire(1).unwrap();
      free_list.insert(region).unwrap();
    }
    free_list.merge_adjacent();

    let released = unsafe { regions.release_all(&mut free_list) };

    assert_eq!(released, 3);
    assert!(regions.is_empty());
    assert!(free_list.is_empty());
    assert_eq!(regions.mapper().unmaps, 3);
  }

  #[test]
  fn test_release_all_keeps_regions_that_fail_to_unmap() {
    let mut regions = regions(4096);
    let mut free_list = FreeList::new();

    let region = regions.acquire(1).unwrap();
    free_list.insert(region).unwrap();
    regions.mapper.fail_unmap = true;

    let released = unsafe { regions.release_all(&mut free_list) };

    assert_eq!(released, 0);
    assert_eq!(regions.len(), 1);
    assert_eq!(free_list.iter().collect::<Vec<_>>(), vec![region]);

    regions.mapper.fail_unmap = false;
  }
}
