use std::ptr;

use tracing::{debug, trace};

use crate::{
  align::checked_align,
  block::{Block, HEADER_SIZE, TAG},
  chain::Chain,
  error::{Error, Result},
  segment::Segment,
};

impl<S: Segment> Chain<S> {
  /// Hands out a block of at least `size` bytes and returns its payload offset.
  ///
  /// Reuses a free block picked by the search mode, splitting off the
  /// surplus, and grows the segment when nothing fits.
  pub(crate) fn allocate(
    &mut self,
    size: usize,
  ) -> Result<usize> {
    if size == 0 {
      return Err(Error::InvalidArgument("allocation size must be non-zero"));
    }

    let size = checked_align(size).ok_or(Error::OutOfMemory { requested: size })?;

    let offset = match self.find_free_block(size) {
      Some(offset) => {
        trace!(offset, size, found = self.block(offset).size, "reusing free block");
        self.split(offset, size);
        offset
      }
      None => self.grow(size)?,
    };

    let block = self.block_mut(offset);
    block.is_free = false;
    block.tag = TAG;
    self.cursor = Some(offset);

    Ok(offset + HEADER_SIZE)
  }

  /// Shrinks the free block at `offset` to `size` when the surplus can hold
  /// another header plus at least one payload byte. The surplus becomes a
  /// free block right after it.
  fn split(
    &mut self,
    offset: usize,
    size: usize,
  ) {
    let block = self.block(offset);
    if block.size < size + HEADER_SIZE + 1 {
      return;
    }

    let rest = offset + HEADER_SIZE + size;
    let rest_size = block.end(offset) - rest - HEADER_SIZE;
    self.write_block(rest, Block::new(rest_size, true, block.next));

    let block = self.block_mut(offset);
    block.size = size;
    block.next = rest;

    if self.tail == Some(offset) {
      self.tail = Some(rest);
    }

    trace!(offset, size, rest, rest_size, "split block");
  }

  /// Marks the block behind `ptr` free and merges free neighbours.
  ///
  /// Null is accepted and ignored. Pointers that do not lead to a tagged
  /// header inside the segment are rejected without touching any block.
  pub(crate) fn release(
    &mut self,
    ptr: *const u8,
  ) -> Result<()> {
    if ptr.is_null() {
      return Ok(());
    }

    let offset = self.locate(ptr)?;
    self.block_mut(offset).is_free = true;
    self.coalesce();
    Ok(())
  }

  /// Merges every run of adjacent free blocks into its first block.
  pub(crate) fn coalesce(&mut self) {
    let mut current = self.head;

    while let Some(offset) = current {
      let block = self.block(offset);
      let Some(next) = block.next() else {
        break;
      };
      let absorbed = self.block(next);

      if !(block.is_free && absorbed.is_free) {
        current = Some(next);
        continue;
      }

      let size = block.size + HEADER_SIZE + absorbed.size;
      let merged = self.block_mut(offset);
      merged.size = size;
      merged.next = absorbed.next;

      // A stale tag would let a second release of the absorbed pointer write
      // into the merged payload.
      self.block_mut(next).tag = 0;

      if self.tail == Some(next) {
        self.tail = Some(offset);
      }
      if self.cursor == Some(next) {
        self.cursor = Some(offset);
      }

      debug!(offset, absorbed = next, size, "coalesced free blocks");
    }
  }

  /// Grows or keeps the block behind `ptr` so it holds `new_size` bytes.
  ///
  /// A block that is already large enough is returned as is. Otherwise the
  /// payload moves to a fresh block and the old one is released; if that
  /// allocation fails the old block stays live and untouched.
  pub(crate) fn resize(
    &mut self,
    ptr: *const u8,
    new_size: usize,
  ) -> Result<usize> {
    if ptr.is_null() {
      return Err(Error::InvalidArgument("cannot resize a null pointer"));
    }
    if new_size == 0 {
      return Err(Error::InvalidArgument("resize size must be non-zero"));
    }

    let offset = self.locate(ptr)?;
    let old = self.block(offset);
    if old.is_free {
      return Err(Error::InvalidPointer(ptr.addr()));
    }

    if old.size >= new_size {
      return Ok(offset + HEADER_SIZE);
    }

    let fresh = self.allocate(new_size)?;
    unsafe {
      ptr::copy_nonoverlapping(
        self.payload_ptr(offset + HEADER_SIZE).as_ptr(),
        self.payload_ptr(fresh).as_ptr(),
        old.size,
      );
    }

    self.block_mut(offset).is_free = true;
    self.coalesce();

    Ok(fresh)
  }

  /// Allocates room for `count` elements of `elem_size` bytes, zero-filled.
  pub(crate) fn zero_allocate(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> Result<usize> {
    let total = count
      .checked_mul(elem_size)
      .ok_or(Error::InvalidArgument("element count times element size overflows"))?;

    let payload = self.allocate(total)?;
    let size = self.block(payload - HEADER_SIZE).size;
    unsafe { ptr::write_bytes(self.payload_ptr(payload).as_ptr(), 0, size) };

    Ok(payload)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{align::WORD, search::SearchMode, segment::ArenaSegment};

  fn chain(capacity: usize) -> Chain<ArenaSegment> {
    Chain::new(ArenaSegment::with_capacity(capacity).unwrap(), SearchMode::BestFit)
  }

  fn write(
    chain: &Chain<ArenaSegment>,
    payload: usize,
    len: usize,
    byte: u8,
  ) {
    unsafe { ptr::write_bytes(chain.payload_ptr(payload).as_ptr(), byte, len) }
  }

  fn read(
    chain: &Chain<ArenaSegment>,
    payload: usize,
    len: usize,
  ) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(chain.payload_ptr(payload).as_ptr(), len).to_vec() }
  }

  fn raw(
    chain: &Chain<ArenaSegment>,
    payload: usize,
  ) -> *const u8 {
    chain.payload_ptr(payload).as_ptr()
  }

  #[test]
  fn test_allocate_rejects_zero() {
    let mut chain = chain(1024);
    assert!(matches!(chain.allocate(0), Err(Error::InvalidArgument(_))));
    assert!(chain.head.is_none());
    assert_eq!(chain.segment.len(), 0);
  }

  #[test]
  fn test_allocate_rounds_to_word() {
    let mut chain = chain(1024);
    let first = chain.allocate(1).unwrap();
    let second = chain.allocate(WORD + 1).unwrap();

    assert_eq!(first, HEADER_SIZE);
    assert_eq!(chain.block(first - HEADER_SIZE).size, WORD);
    assert_eq!(second, first + WORD + HEADER_SIZE);
    assert_eq!(chain.block(second - HEADER_SIZE).size, 2 * WORD);
    assert_eq!(second % WORD, 0);
  }

  #[test]
  fn test_split_threshold() {
    let mut chain = chain(4096);
    let big = chain.allocate(128).unwrap();
    let _guard = chain.allocate(8).unwrap();
    chain.release(raw(&chain, big)).unwrap();

    // 128 - 40 leaves room for a header and a payload.
    let reused = chain.allocate(40).unwrap();
    assert_eq!(reused, big);
    assert_eq!(chain.block(big - HEADER_SIZE).size, 40);

    let rest = chain.block(big - HEADER_SIZE).next().unwrap();
    let rest_block = chain.block(rest);
    assert!(rest_block.is_free);
    assert_eq!(rest_block.size, 128 - 40 - HEADER_SIZE);
    chain.check().unwrap();
  }

  #[test]
  fn test_no_split_without_room_for_header() {
    let mut chain = chain(4096);
    let block = chain.allocate(HEADER_SIZE + 16).unwrap();
    let _guard = chain.allocate(8).unwrap();
    chain.release(raw(&chain, block)).unwrap();

    // Surplus is exactly one header: no payload byte left to split off.
    let reused = chain.allocate(16).unwrap();
    assert_eq!(reused, block);
    assert_eq!(chain.block(block - HEADER_SIZE).size, HEADER_SIZE + 16);
    assert_eq!(chain.offsets().count(), 2);
  }

  #[test]
  fn test_split_tail_moves_tail() {
    let mut chain = chain(4096);
    let block = chain.allocate(256).unwrap();
    chain.release(raw(&chain, block)).unwrap();

    chain.allocate(32).unwrap();
    let tail = chain.tail.unwrap();
    assert_ne!(tail, block - HEADER_SIZE);
    assert!(chain.block(tail).is_free);
    chain.check().unwrap();
  }

  #[test]
  fn test_coalesce_pair() {
    let mut chain = chain(4096);
    let first = chain.allocate(16).unwrap();
    let second = chain.allocate(16).unwrap();

    chain.release(raw(&chain, first)).unwrap();
    chain.release(raw(&chain, second)).unwrap();

    let blocks = chain.blocks();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].is_free);
    assert_eq!(blocks[0].size, 32 + HEADER_SIZE);
    assert_eq!(chain.tail, chain.head);
    chain.check().unwrap();
  }

  #[test]
  fn test_coalesce_run_in_middle() {
    let mut chain = chain(4096);
    let payloads: Vec<_> = (0..5).map(|_| chain.allocate(24).unwrap()).collect();

    chain.release(raw(&chain, payloads[1])).unwrap();
    chain.release(raw(&chain, payloads[3])).unwrap();
    assert_eq!(chain.offsets().count(), 5);

    chain.release(raw(&chain, payloads[2])).unwrap();
    let blocks = chain.blocks();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[1].offset, payloads[1]);
    assert_eq!(blocks[1].size, 3 * 24 + 2 * HEADER_SIZE);
    assert!(blocks[1].is_free);
    assert!(!blocks[0].is_free && !blocks[2].is_free);
    chain.check().unwrap();
  }

  #[test]
  fn test_release_absorbed_pointer_is_rejected() {
    let mut chain = chain(4096);
    let first = chain.allocate(16).unwrap();
    let second = chain.allocate(16).unwrap();

    chain.release(raw(&chain, first)).unwrap();
    chain.release(raw(&chain, second)).unwrap();
    let before = chain.blocks();

    assert!(matches!(chain.release(raw(&chain, second)), Err(Error::InvalidPointer(_))));
    assert_eq!(chain.blocks(), before);
  }

  #[test]
  fn test_double_release_is_harmless() {
    let mut chain = chain(4096);
    let first = chain.allocate(16).unwrap();
    let _second = chain.allocate(16).unwrap();

    chain.release(raw(&chain, first)).unwrap();
    let before = chain.blocks();
    chain.release(raw(&chain, first)).unwrap();
    assert_eq!(chain.blocks(), before);
    chain.check().unwrap();
  }

  #[test]
  fn test_release_foreign_pointers() {
    let mut chain = chain(4096);
    let payload = chain.allocate(64).unwrap();
    let before = chain.blocks();

    let local = 0u64;
    assert!(chain.release(std::ptr::null()).is_ok());
    assert!(chain.release(&raw const local as *const u8).is_err());
    assert!(chain.release(raw(&chain, payload).wrapping_add(1)).is_err());
    assert!(chain.release(raw(&chain, payload).wrapping_add(WORD)).is_err());
    assert!(chain.release(raw(&chain, 0)).is_err());
    assert!(chain.release(raw(&chain, chain.segment.len())).is_err());

    assert_eq!(chain.blocks(), before);
  }

  #[test]
  fn test_forged_header_in_payload_is_rejected() {
    let mut chain = chain(4096);
    let payload = chain.allocate(128).unwrap();

    // User data that happens to look like a tagged header.
    let forged = Block::new(1 << 20, false, crate::block::NIL);
    unsafe { chain.payload_ptr(payload).cast::<Block>().as_ptr().write(forged) };
    let contents = read(&chain, payload, 128);
    let before = chain.blocks();

    let inner = raw(&chain, payload + HEADER_SIZE);
    assert!(matches!(chain.release(inner), Err(Error::InvalidPointer(_))));
    assert!(matches!(chain.resize(inner, 1 << 21), Err(Error::InvalidPointer(_))));

    assert_eq!(read(&chain, payload, 128), contents);
    assert_eq!(chain.blocks(), before);
    chain.check().unwrap();
  }

  #[test]
  fn test_resize_in_place() {
    let mut chain = chain(4096);
    let payload = chain.allocate(64).unwrap();
    write(&chain, payload, 64, 0x5a);

    assert_eq!(chain.resize(raw(&chain, payload), 64).unwrap(), payload);
    assert_eq!(chain.resize(raw(&chain, payload), 8).unwrap(), payload);
    assert_eq!(chain.block(payload - HEADER_SIZE).size, 64);
    assert_eq!(read(&chain, payload, 64), vec![0x5a; 64]);
  }

  #[test]
  fn test_resize_moves_and_copies() {
    let mut chain = chain(4096);
    let payload = chain.allocate(32).unwrap();
    let _guard = chain.allocate(8).unwrap();
    let pattern: Vec<u8> = (0..32).collect();
    unsafe { ptr::copy_nonoverlapping(pattern.as_ptr(), chain.payload_ptr(payload).as_ptr(), 32) };

    let moved = chain.resize(raw(&chain, payload), 100).unwrap();
    assert_ne!(moved, payload);
    assert_eq!(read(&chain, moved, 32), pattern);
    assert!(chain.block(payload - HEADER_SIZE).is_free);
    chain.check().unwrap();
  }

  #[test]
  fn test_resize_failure_keeps_block() {
    let mut chain = chain(HEADER_SIZE + 32);
    let payload = chain.allocate(32).unwrap();
    write(&chain, payload, 32, 7);

    assert!(matches!(chain.resize(raw(&chain, payload), 64), Err(Error::OutOfMemory { .. })));
    assert!(!chain.block(payload - HEADER_SIZE).is_free);
    assert_eq!(read(&chain, payload, 32), vec![7; 32]);
    chain.check().unwrap();
  }

  #[test]
  fn test_resize_rejects_bad_input() {
    let mut chain = chain(4096);
    let payload = chain.allocate(16).unwrap();
    let _guard = chain.allocate(16).unwrap();

    assert!(matches!(chain.resize(std::ptr::null(), 8), Err(Error::InvalidArgument(_))));
    assert!(matches!(chain.resize(raw(&chain, payload), 0), Err(Error::InvalidArgument(_))));
    assert!(matches!(
      chain.resize(raw(&chain, payload).wrapping_add(1), 8),
      Err(Error::InvalidPointer(_))
    ));

    chain.release(raw(&chain, payload)).unwrap();
    assert!(matches!(chain.resize(raw(&chain, payload), 8), Err(Error::InvalidPointer(_))));
  }

  #[test]
  fn test_zero_allocate_clears_reused_memory() {
    let mut chain = chain(4096);
    let dirty = chain.allocate(64).unwrap();
    let _guard = chain.allocate(8).unwrap();
    write(&chain, dirty, 64, 0xff);
    chain.release(raw(&chain, dirty)).unwrap();

    let zeroed = chain.zero_allocate(8, 8).unwrap();
    assert_eq!(zeroed, dirty);
    assert_eq!(read(&chain, zeroed, 64), vec![0; 64]);
  }

  #[test]
  fn test_zero_allocate_overflow() {
    let mut chain = chain(4096);
    assert!(matches!(chain.zero_allocate(usize::MAX, 2), Err(Error::InvalidArgument(_))));
    assert!(matches!(chain.zero_allocate(0, 8), Err(Error::InvalidArgument(_))));
    assert!(chain.head.is_none());
  }
}
