use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};
use tracing::warn;

use crate::{
  align,
  align::{WORD, checked_align},
  error::{Error, Result},
};

/// A contiguous region that only ever grows at its end.
///
/// This is the OS primitive the heap grower sits on. `base` must stay put for
/// the lifetime of the segment and `extend` must hand out bytes that directly
/// follow the previous watermark.
pub trait Segment {
  /// Start of the region. Word aligned.
  fn base(&self) -> NonNull<u8>;

  /// Current watermark, in bytes from `base`.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Grows the region by `bytes` and returns the offset of the old watermark.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<usize>;
}

/// The process data segment, grown with `sbrk(2)`.
///
/// The break is process-wide: anything else moving it between two extensions
/// makes further growth fail with [`Error::BreakMoved`] instead of producing a
/// heap with holes in it.
pub struct BrkSegment {
  base: NonNull<u8>,
  len: usize,
  started: bool,
}

// SAFETY: the region past `base` is only touched through the owning heap.
unsafe impl Send for BrkSegment {}

impl BrkSegment {
  pub const fn new() -> Self {
    Self {
      base: NonNull::dangling(),
      len: 0,
      started: false,
    }
  }

  /// Current program break.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }

  unsafe fn sbrk(bytes: usize) -> Result<*mut u8> {
    let increment = intptr_t::try_from(bytes).map_err(|_| Error::OutOfMemory { requested: bytes })?;
    let previous = unsafe { sbrk(increment) };

    if previous == usize::MAX as *mut c_void {
      return Err(Error::OutOfMemory { requested: bytes });
    }

    Ok(previous as *mut u8)
  }
}

impl Default for BrkSegment {
  fn default() -> Self {
    Self::new()
  }
}

impl Segment for BrkSegment {
  fn base(&self) -> NonNull<u8> {
    self.base
  }

  fn len(&self) -> usize {
    self.len
  }

  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<usize> {
    let current = Self::program_break();

    if !self.started {
      // The initial break carries no alignment promise.
      let padding = align!(current.addr()) - current.addr();
      let total = bytes
        .checked_add(padding)
        .ok_or(Error::OutOfMemory { requested: bytes })?;

      let previous = unsafe { Self::sbrk(total)? };
      if previous != current {
        warn!(expected = ?current, found = ?previous, "program break moved during first growth");
        return Err(Error::BreakMoved {
          expected: current.addr(),
          found: previous.addr(),
        });
      }

      self.base = NonNull::new(unsafe { previous.add(padding) }).ok_or(Error::OutOfMemory { requested: bytes })?;
      self.len = bytes;
      self.started = true;
      return Ok(0);
    }

    let expected = unsafe { self.base.as_ptr().add(self.len) };
    if current != expected {
      warn!(?expected, found = ?current, "program break moved by a foreign caller");
      return Err(Error::BreakMoved {
        expected: expected.addr(),
        found: current.addr(),
      });
    }

    let previous = unsafe { Self::sbrk(bytes)? };
    if previous != expected {
      warn!(?expected, found = ?previous, "program break moved during growth");
      return Err(Error::BreakMoved {
        expected: expected.addr(),
        found: previous.addr(),
      });
    }

    let offset = self.len;
    self.len += bytes;
    Ok(offset)
  }
}

/// A private, fixed-capacity region with a simulated break.
///
/// The whole capacity is reserved up front. `extend` only moves the
/// watermark, and fails once the reservation is used up, so independent heaps
/// can coexist in one process and exhaustion is deterministic.
pub struct ArenaSegment {
  base: NonNull<u8>,
  len: usize,
  capacity: usize,
}

// SAFETY: the arena is exclusively owned.
unsafe impl Send for ArenaSegment {}

impl ArenaSegment {
  pub fn with_capacity(capacity: usize) -> Result<Self> {
    let capacity = checked_align(capacity).ok_or(Error::OutOfMemory { requested: capacity })?;

    let base = if capacity == 0 {
      NonNull::<usize>::dangling().cast()
    } else {
      let layout = Self::layout(capacity)?;
      NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or(Error::OutOfMemory { requested: capacity })?
    };

    Ok(Self { base, len: 0, capacity })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  fn layout(capacity: usize) -> Result<Layout> {
    Layout::from_size_align(capacity, WORD).map_err(|_| Error::OutOfMemory { requested: capacity })
  }
}

impl Segment for ArenaSegment {
  fn base(&self) -> NonNull<u8> {
    self.base
  }

  fn len(&self) -> usize {
    self.len
  }

  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<usize> {
    let watermark = self
      .len
      .checked_add(bytes)
      .filter(|&watermark| watermark <= self.capacity)
      .ok_or(Error::OutOfMemory { requested: bytes })?;

    let offset = self.len;
    self.len = watermark;
    Ok(offset)
  }
}

impl Drop for ArenaSegment {
  fn drop(&mut self) {
    if self.capacity == 0 {
      return;
    }

    if let Ok(layout) = Self::layout(self.capacity) {
      unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
    }
  }
}
