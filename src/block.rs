use core::mem;

use crate::align::WORD;

/// Sentinel stamped into every live header.
pub const TAG: u32 = 0x1234_5678;

/// Size of the in-band header that precedes every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Link value meaning "no next block".
pub(crate) const NIL: usize = usize::MAX;

const _: () = assert!(HEADER_SIZE % WORD == 0);

/// Header written in front of every payload.
///
/// `next` is the byte offset of the following header from the segment base,
/// never a raw pointer, so the chain stays valid wherever the segment lives.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub(crate) struct Block {
  pub size: usize,
  pub next: usize,
  pub tag: u32,
  pub is_free: bool,
}

impl Block {
  pub fn new(
    size: usize,
    is_free: bool,
    next: usize,
  ) -> Self {
    Self {
      size,
      next,
      tag: TAG,
      is_free,
    }
  }

  pub fn next(&self) -> Option<usize> {
    (self.next != NIL).then_some(self.next)
  }

  pub fn is_valid(&self) -> bool {
    self.tag == TAG
  }

  /// Offset one past the end of this block's payload.
  pub fn end(
    &self,
    offset: usize,
  ) -> usize {
    offset + HEADER_SIZE + self.size
  }
}
