use crate::{
  block::{Block, HEADER_SIZE},
  error::AllocError,
  table::Table,
};

/// Slot in the node arena. Vacant slots are chained through `next`.
#[derive(Clone, Copy)]
struct Node {
  block: Block,
  prev: Option<usize>,
  next: Option<usize>,
}

/// Address-ordered doubly linked list of free blocks.
///
/// Nodes live in an arena and link to each other by index; a block's
/// address is only used as the ordering key and to detect adjacency, the
/// free memory itself is never written to.
///
/// ```text
///   head
///    │
///    ▼
///   ┌────────────┐      ┌────────────┐      ┌────────────┐
///   │ 0x1000/0x40│ ───► │ 0x1080/0x20│ ───► │ 0x2000/0x80│ ───► None
///   └────────────┘ ◄─── └────────────┘ ◄─── └────────────┘
/// ```
///
/// # Invariants
/// - Blocks are sorted ascending by address and never overlap.
/// - After [`FreeList::merge_adjacent`] no block ends where the next begins.
pub struct FreeList {
  nodes: Table<Node>,
  head: Option<usize>,
  vacant: Option<usize>,
  len: usize,
}

impl FreeList {
  pub const fn new() -> Self {
    Self {
      nodes: Table::new(),
      head: None,
      vacant: None,
      len: 0,
    }
  }

  /// Number of free blocks.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  /// Total bytes held by free blocks, headers included.
  pub fn free_bytes(&self) -> usize {
    self.iter().map(|block| block.size).sum()
  }

  /// Iterates the free blocks in address order.
  pub fn iter(&self) -> Iter<'_> {
    Iter {
      list: self,
      cursor: self.head,
    }
  }

  fn node(
    &self,
    id: usize,
  ) -> Node {
    self.nodes.as_slice()[id]
  }

  fn node_mut(
    &mut self,
    id: usize,
  ) -> &mut Node {
    &mut self.nodes.as_mut_slice()[id]
  }

  fn occupy(
    &mut self,
    node: Node,
  ) -> Result<usize, AllocError> {
    match self.vacant {
      Some(id) => {
        self.vacant = self.node(id).next;
        *self.node_mut(id) = node;
        Ok(id)
      }
      None => self.nodes.push(node),
    }
  }

  fn vacate(
    &mut self,
    id: usize,
  ) {
    let vacant = self.vacant;
    let node = self.node_mut(id);
    node.prev = None;
    node.next = vacant;
    self.vacant = Some(id);
  }

  /// Inserts `block` at its address-ordered position.
  ///
  /// Fails only if the node arena cannot grow.
  pub fn insert(
    &mut self,
    block: Block,
  ) -> Result<(), AllocError> {
    let id = self.occupy(Node {
      block,
      prev: None,
      next: None,
    })?;

    let head = self.head;

    match head {
      Some(head) if self.node(head).block.address < block.address => {
        let mut cursor = head;

        while let Some(next) = self.node(cursor).next {
          if self.node(next).block.address >= block.address {
            break;
          }
          cursor = next;
        }

        let next = self.node(cursor).next;

        debug_assert!(self.node(cursor).block.end() <= block.address);
        debug_assert!(next.is_none_or(|next| block.end() <= self.node(next).block.address));

        let node = self.node_mut(id);
        node.prev = Some(cursor);
        node.next = next;

        self.node_mut(cursor).next = Some(id);
        if let Some(next) = next {
          self.node_mut(next).prev = Some(id);
        }
      }
      head => {
        debug_assert!(head.is_none_or(|head| block.end() <= self.node(head).block.address));

        self.node_mut(id).next = head;
        if let Some(head) = head {
          self.node_mut(head).prev = Some(id);
        }
        self.head = Some(id);
      }
    }

    self.len += 1;

    Ok(())
  }

  /// Detaches node `id` from the list and recycles its slot.
  fn unlink(
    &mut self,
    id: usize,
  ) -> Block {
    let Node { block, prev, next } = self.node(id);

    match prev {
      Some(prev) => self.node_mut(prev).next = next,
      None => self.head = next,
    }

    if let Some(next) = next {
      self.node_mut(next).prev = prev;
    }

    self.vacate(id);
    self.len -= 1;

    block
  }

  fn find(
    &self,
    address: usize,
  ) -> Option<usize> {
    let mut cursor = self.head;

    while let Some(id) = cursor {
      let node = self.node(id);

      if node.block.address == address {
        return Some(id);
      }
      if node.block.address > address {
        return None;
      }

      cursor = node.next;
    }

    None
  }

  /// Removes the free block starting at `block.address`.
  ///
  /// Returns `false` if no such block is linked.
  pub fn remove(
    &mut self,
    block: Block,
  ) -> bool {
    match self.find(block.address) {
      Some(id) => {
        self.unlink(id);
        true
      }
      None => false,
    }
  }

  /// First-fit search for a block strictly larger than `min_size`.
  ///
  /// If the surplus can host more than a header, the block is split: the
  /// leading `min_size` bytes are returned and the remainder stays linked in
  /// the same position. Otherwise the whole block is unlinked and returned.
  /// The returned block is never still linked.
  pub fn search(
    &mut self,
    min_size: usize,
  ) -> Option<Block> {
    let mut cursor = self.head;

    while let Some(id) = cursor {
      let node = self.node(id);

      if node.block.size > min_size {
        let surplus = node.block.size - min_size;

        if surplus > HEADER_SIZE {
          self.node_mut(id).block = Block::new(node.block.address + min_size, surplus);
          return Some(Block::new(node.block.address, min_size));
        }

        return Some(self.unlink(id));
      }

      cursor = node.next;
    }

    None
  }

  /// Coalesces physically contiguous neighbors in one forward pass.
  ///
  /// Returns the number of merges performed.
  pub fn merge_adjacent(&mut self) -> usize {
    let mut merged = 0;
    let mut cursor = self.head;

    while let Some(id) = cursor {
      let node = self.node(id);

      let Some(next) = node.next else {
        break;
      };

      let absorbed = self.node(next).block;

      if node.block.end() == absorbed.address {
        self.unlink(next);
        self.node_mut(id).block.size += absorbed.size;
        merged += 1;
      } else {
        cursor = Some(next);
      }
    }

    merged
  }

  /// Drops every free byte inside `[start, end)`, trimming blocks that
  /// straddle the boundaries.
  pub fn remove_range(
    &mut self,
    start: usize,
    end: usize,
  ) -> Result<(), AllocError> {
    let mut cursor = self.head;

    while let Some(id) = cursor {
      let node = self.node(id);
      let block = node.block;

      if block.address >= end {
        break;
      }

      cursor = node.next;

      if !block.overlaps(start, end) {
        continue;
      }

      let head = (block.address < start).then(|| Block::new(block.address, start - block.address));
      let tail = (block.end() > end).then(|| Block::new(end, block.end() - end));

      match (head, tail) {
        (Some(head), Some(tail)) => {
          self.node_mut(id).block = head;
          self.insert(tail)?;
        }
        (Some(head), None) => self.node_mut(id).block = head,
        (None, Some(tail)) => self.node_mut(id).block = tail,
        (None, None) => {
          self.unlink(id);
        }
      }
    }

    Ok(())
  }
}

impl Default for FreeList {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Debug for FreeList {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_list().entries(self.iter()).finish()
  }
}

/// Address-ordered iterator over a [`FreeList`].
pub struct Iter<'a> {
  list: &'a FreeList,
  cursor: Option<usize>,
}

impl Iterator for Iter<'_> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let node = self.list.node(self.cursor?);
    self.cursor = node.next;

    Some(node.block)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn blocks(list: &FreeList) -> Vec<(usize, usize)> {
    list.iter().map(|block| (block.address, block.size)).collect()
  }

  fn list_of(entries: &[(usize, usize)]) -> FreeList {
    let mut list = FreeList::new();

    for &(address, size) in entries {
      list.insert(Block::new(address, size)).unwrap();
    }

    list
  }

  #[test]
  fn test_insert_keeps_address_order() {
    let list = list_of(&[(0x3000, 0x100), (0x1000, 0x100), (0x2000, 0x100), (0x0800, 0x100), (0x4000, 0x100)]);

    assert_eq!(
      blocks(&list),
      vec![(0x0800, 0x100), (0x1000, 0x100), (0x2000, 0x100), (0x3000, 0x100), (0x4000, 0x100)]
    );
    assert_eq!(list.len(), 5);
    assert_eq!(list.free_bytes(), 0x500);
  }

  #[test]
  fn test_remove_relinks_neighbors_and_head() {
    let mut list = list_of(&[(0x1000, 0x100), (0x2000, 0x100), (0x3000, 0x100)]);

    assert!(list.remove(Block::new(0x2000, 0x100)));
    assert_eq!(blocks(&list), vec![(0x1000, 0x100), (0x3000, 0x100)]);

    assert!(list.remove(Block::new(0x1000, 0x100)));
    assert_eq!(blocks(&list), vec![(0x3000, 0x100)]);

    assert!(!list.remove(Block::new(0x1000, 0x100)));

    assert!(list.remove(Block::new(0x3000, 0x100)));
    assert!(list.is_empty());
    assert_eq!(list.len(), 0);
  }

  #[test]
  fn test_slots_are_recycled() {
    let mut list = FreeList::new();

    for round in 0..1000 {
      let block = Block::new(0x1000 + round * 0x10, 0x10);
      list.insert(block).unwrap();
      assert!(list.remove(block));
    }

    assert_eq!(list.nodes.len(), 1);
  }

  #[test]
  fn test_search_is_first_fit() {
    let mut list = list_of(&[(0x1000, 0x40), (0x2000, 0x400), (0x3000, 0x100)]);

    let block = list.search(0x80).unwrap();

    assert_eq!(block, Block::new(0x2000, 0x80));
    assert_eq!(blocks(&list), vec![(0x1000, 0x40), (0x2080, 0x380), (0x3000, 0x100)]);
  }

  #[test]
  fn test_search_requires_strictly_larger_block() {
    let mut list = list_of(&[(0x1000, 0x40)]);

    assert_eq!(list.search(0x40), None);
    assert_eq!(blocks(&list), vec![(0x1000, 0x40)]);
  }

  #[test]
  fn test_search_does_not_split_below_header() {
    let size = 0x40;
    let mut list = list_of(&[(0x1000, size + HEADER_SIZE)]);

    assert_eq!(list.search(size), Some(Block::new(0x1000, size + HEADER_SIZE)));
    assert!(list.is_empty());
  }

  #[test]
  fn test_search_empty_list() {
    let mut list = FreeList::new();

    assert_eq!(list.search(1), None);
  }

  #[test]
  fn test_merge_two_adjacent_blocks() {
    let mut list = list_of(&[(0x1040, 0x40), (0x1000, 0x40)]);

    assert_eq!(list.merge_adjacent(), 1);
    assert_eq!(blocks(&list), vec![(0x1000, 0x80)]);
  }

  #[test]
  fn test_merge_collapses_chains_in_one_pass() {
    let mut list = list_of(&[
      (0x1000, 0x40),
      (0x1040, 0x40),
      (0x1080, 0x80),
      (0x2000, 0x10),
      (0x3000, 0x10),
      (0x3010, 0x10),
    ]);

    assert_eq!(list.merge_adjacent(), 3);
    assert_eq!(blocks(&list), vec![(0x1000, 0x100), (0x2000, 0x10), (0x3000, 0x20)]);

    assert_eq!(list.merge_adjacent(), 0);
    assert_eq!(blocks(&list), vec![(0x1000, 0x100), (0x2000, 0x10), (0x3000, 0x20)]);
  }

  #[test]
  fn test_remove_range() {
    let mut list = list_of(&[(0x1000, 0x1000), (0x2000, 0x800), (0x3000, 0x1000)]);

    list.remove_range(0x2000, 0x3000).unwrap();
    assert_eq!(blocks(&list), vec![(0x1000, 0x1000), (0x3000, 0x1000)]);

    // Straddles both ends of a block.
    list.remove_range(0x3400, 0x3800).unwrap();
    assert_eq!(blocks(&list), vec![(0x1000, 0x1000), (0x3000, 0x400), (0x3800, 0x800)]);

    // Trims the tail of one block and the head of the next.
    list.remove_range(0x1800, 0x3200).unwrap();
    assert_eq!(blocks(&list), vec![(0x1000, 0x800), (0x3200, 0x200), (0x3800, 0x800)]);

    list.remove_range(0, usize::MAX).unwrap();
    assert!(list.is_empty());
  }

  #[test]
  fn test_debug_lists_blocks() {
    let list = list_of(&[(0x1000, 0x40)]);

    assert_eq!(format!("{list:?}"), "[Block { address: 4096, size: 64 }]");
  }
}
