use std::{iter, ptr::NonNull};

use crate::{
  align::WORD,
  block::{Block, HEADER_SIZE, TAG},
  error::{Error, Result},
  search::SearchMode,
  segment::Segment,
};

/// A block as seen from the outside, produced by walking the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload offset from the start of the heap segment.
  pub offset: usize,
  pub size: usize,
  pub is_free: bool,
  /// Whether the header still carries the sentinel tag.
  pub tag_valid: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub free_blocks: usize,
  /// Payload bytes available for reuse.
  pub free_bytes: usize,
  /// Payload bytes handed out to callers.
  pub used_bytes: usize,
  /// Bytes taken from the segment, headers included.
  pub segment_bytes: usize,
}

/// The block list laid over a segment.
///
/// Every offset stored here (`head`, `tail`, `cursor`, and each header's
/// `next`) is a header offset from the segment base.
pub(crate) struct Chain<S> {
  pub(crate) segment: S,
  pub(crate) head: Option<usize>,
  pub(crate) tail: Option<usize>,
  /// Most recently touched block; where next-fit resumes.
  pub(crate) cursor: Option<usize>,
  pub(crate) search: SearchMode,
}

impl<S: Segment> Chain<S> {
  pub const fn new(
    segment: S,
    search: SearchMode,
  ) -> Self {
    Self {
      segment,
      head: None,
      tail: None,
      cursor: None,
      search,
    }
  }

  fn header(
    &self,
    offset: usize,
  ) -> *mut Block {
    debug_assert!(offset % WORD == 0);
    debug_assert!(offset + HEADER_SIZE <= self.segment.len());
    unsafe { self.segment.base().as_ptr().add(offset).cast::<Block>() }
  }

  pub(crate) fn block(
    &self,
    offset: usize,
  ) -> Block {
    unsafe { self.header(offset).read() }
  }

  pub(crate) fn block_mut(
    &mut self,
    offset: usize,
  ) -> &mut Block {
    unsafe { &mut *self.header(offset) }
  }

  /// Formats a fresh header at `offset`, overwriting whatever bytes were there.
  pub(crate) fn write_block(
    &mut self,
    offset: usize,
    block: Block,
  ) {
    unsafe { self.header(offset).write(block) }
  }

  pub(crate) fn payload_ptr(
    &self,
    payload: usize,
  ) -> NonNull<u8> {
    unsafe { self.segment.base().add(payload) }
  }

  /// Maps a payload pointer back to the offset of its header.
  ///
  /// The pointer is checked against the segment bounds and word alignment
  /// before anything is read. After that the header must carry the tag and
  /// be linked into the chain, so a tag-shaped pattern inside a payload is
  /// not mistaken for a block.
  pub(crate) fn locate(
    &self,
    ptr: *const u8,
  ) -> Result<usize> {
    let addr = ptr.addr();
    let invalid = || Error::InvalidPointer(addr);

    let payload = addr
      .checked_sub(self.segment.base().as_ptr().addr())
      .ok_or_else(invalid)?;

    if self.head.is_none() || payload < HEADER_SIZE || payload >= self.segment.len() || payload % WORD != 0 {
      return Err(invalid());
    }

    let offset = payload - HEADER_SIZE;
    let tag = unsafe { (&raw const (*self.header(offset)).tag).read() };
    if tag != TAG || !self.offsets().any(|linked| linked == offset) {
      return Err(invalid());
    }

    Ok(offset)
  }

  /// Header offsets in chain order.
  pub(crate) fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
    self.offsets_from(self.head)
  }

  pub(crate) fn offsets_from(
    &self,
    start: Option<usize>,
  ) -> impl Iterator<Item = usize> + '_ {
    iter::successors(start, |&offset| self.block(offset).next())
  }

  pub fn blocks(&self) -> Vec<BlockInfo> {
    self
      .offsets()
      .map(|offset| {
        let block = self.block(offset);
        BlockInfo {
          offset: offset + HEADER_SIZE,
          size: block.size,
          is_free: block.is_free,
          tag_valid: block.is_valid(),
        }
      })
      .collect()
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      segment_bytes: self.segment.len(),
      ..Default::default()
    };

    for offset in self.offsets() {
      let block = self.block(offset);
      stats.blocks += 1;
      if block.is_free {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
      } else {
        stats.used_bytes += block.size;
      }
    }

    stats
  }

  /// Walks the chain and verifies the block invariants.
  ///
  /// Blocks must tile the segment from offset zero in ascending order, carry
  /// the tag, and never sit free next to a free neighbour.
  pub fn check(&self) -> Result<()> {
    let len = self.segment.len();
    let mut expected = 0;
    let mut previous_free = false;
    let mut last = None;
    let mut current = self.head;

    while let Some(offset) = current {
      if offset != expected {
        return Err(Error::Corrupted(format!(
          "block at {offset:#x} does not follow the previous block ending at {expected:#x}"
        )));
      }

      if offset.checked_add(HEADER_SIZE).is_none_or(|end| end > len) {
        return Err(Error::Corrupted(format!("header at {offset:#x} lies past the watermark {len:#x}")));
      }

      let block = self.block(offset);
      if !block.is_valid() {
        return Err(Error::Corrupted(format!("block at {offset:#x} carries tag {:#x}", block.tag)));
      }

      if previous_free && block.is_free {
        return Err(Error::Corrupted(format!("free block at {offset:#x} follows a free block")));
      }

      expected = offset
        .checked_add(HEADER_SIZE + block.size)
        .filter(|&end| end <= len)
        .ok_or_else(|| Error::Corrupted(format!("payload of block at {offset:#x} lies past the watermark {len:#x}")))?;

      previous_free = block.is_free;
      last = Some(offset);
      current = block.next();
    }

    if expected != len {
      return Err(Error::Corrupted(format!(
        "blocks end at {expected:#x} but the watermark is {len:#x}"
      )));
    }

    if last != self.tail {
      return Err(Error::Corrupted(format!("tail {:?} is not the last block {last:?}", self.tail)));
    }

    Ok(())
  }
}
