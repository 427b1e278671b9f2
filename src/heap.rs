use std::{cell::Cell, ptr::NonNull};

use parking_lot::lock_api::{self, GuardNoSend, RawMutex};
use tracing::debug;

use crate::{
  chain::{BlockInfo, Chain, HeapStats},
  error::Result,
  options::HeapOptions,
  search::SearchMode,
  segment::{ArenaSegment, BrkSegment, Segment},
};

/// A raw lock the heap can serialize on.
///
/// Each lock also names the search mode its heap uses when none is
/// configured: the locked profile scans for the best fit, the unlocked one
/// resumes from the last block it touched.
pub trait HeapLock: RawMutex {
  const SEARCH: SearchMode;
}

impl HeapLock for parking_lot::RawMutex {
  const SEARCH: SearchMode = SearchMode::BestFit;
}

/// Lock for heaps that never leave their thread.
///
/// It only tracks whether the heap is already borrowed, and it is `!Sync`, so
/// a heap built on it cannot be shared between threads.
pub struct NoLock {
  held: Cell<bool>,
}

unsafe impl RawMutex for NoLock {
  #[allow(clippy::declare_interior_mutable_const)]
  const INIT: Self = Self { held: Cell::new(false) };

  type GuardMarker = GuardNoSend;

  fn lock(&self) {
    assert!(self.try_lock(), "heap entered re-entrantly");
  }

  fn try_lock(&self) -> bool {
    !self.held.replace(true)
  }

  unsafe fn unlock(&self) {
    self.held.set(false);
  }
}

impl HeapLock for NoLock {
  const SEARCH: SearchMode = SearchMode::NextFit;
}

/// Heap shared between threads: one mutex around every operation.
pub type SyncHeap<S> = Heap<S, parking_lot::RawMutex>;

/// Heap confined to one thread.
pub type LocalHeap<S> = Heap<S, NoLock>;

/// The process data segment as a thread-safe heap.
pub type BrkHeap = SyncHeap<BrkSegment>;

/// A thread-safe heap over a private arena.
pub type ArenaHeap = SyncHeap<ArenaSegment>;

/// An allocator context: one chain of blocks over one segment, behind one
/// lock.
///
/// Every operation, including growth of the segment, takes the lock for its
/// whole duration.
pub struct Heap<S, R: RawMutex = parking_lot::RawMutex> {
  chain: lock_api::Mutex<R, Chain<S>>,
}

impl<S: Segment, R: HeapLock> Heap<S, R> {
  /// A heap over `segment` with the lock's default search mode.
  pub const fn new(segment: S) -> Self {
    Self::with_search(segment, R::SEARCH)
  }

  pub const fn with_search(
    segment: S,
    search: SearchMode,
  ) -> Self {
    Self {
      chain: lock_api::Mutex::const_new(R::INIT, Chain::new(segment, search)),
    }
  }

  pub fn with_options(
    segment: S,
    options: &HeapOptions,
  ) -> Self {
    Self::with_search(segment, options.search_mode().unwrap_or(R::SEARCH))
  }

  /// Hands out at least `size` bytes, word aligned.
  ///
  /// Fails with `InvalidArgument` for a zero size and with `OutOfMemory` or
  /// `BreakMoved` when the segment cannot grow. No state changes on failure.
  pub fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let mut chain = self.chain.lock();
    let payload = chain.allocate(size)?;
    Ok(chain.payload_ptr(payload))
  }

  /// Like [`Heap::allocate`] for `count * elem_size` bytes, zero-filled.
  /// An overflowing product is rejected.
  pub fn zero_allocate(
    &self,
    count: usize,
    elem_size: usize,
  ) -> Result<NonNull<u8>> {
    let mut chain = self.chain.lock();
    let payload = chain.zero_allocate(count, elem_size)?;
    Ok(chain.payload_ptr(payload))
  }

  /// Returns the block behind `ptr` to the heap.
  ///
  /// Null, and anything that is not a payload pointer of this heap, is
  /// ignored.
  ///
  /// # Safety
  ///
  /// Nothing may access the payload during the call or after it returns.
  pub unsafe fn release(
    &self,
    ptr: *mut u8,
  ) {
    if let Err(err) = unsafe { self.try_release(ptr) } {
      debug!(%err, "release ignored");
    }
  }

  /// [`Heap::release`] that reports rejected pointers.
  ///
  /// # Safety
  ///
  /// Same as [`Heap::release`].
  pub unsafe fn try_release(
    &self,
    ptr: *mut u8,
  ) -> Result<()> {
    self.chain.lock().release(ptr)
  }

  /// Makes the allocation behind `ptr` hold at least `new_size` bytes.
  ///
  /// Returns `ptr` itself when the block is already big enough. Otherwise the
  /// contents move to a new block and `ptr` is released. If that fails, `ptr`
  /// stays valid and unchanged.
  ///
  /// # Safety
  ///
  /// Nothing may access the payload during the call. When a different pointer
  /// comes back, `ptr` must not be used again.
  pub unsafe fn resize(
    &self,
    ptr: *mut u8,
    new_size: usize,
  ) -> Result<NonNull<u8>> {
    let mut chain = self.chain.lock();
    let payload = chain.resize(ptr, new_size)?;
    Ok(chain.payload_ptr(payload))
  }

  /// Payload capacity of the live block behind `ptr`.
  pub fn usable_size(
    &self,
    ptr: *const u8,
  ) -> Option<usize> {
    let chain = self.chain.lock();
    let offset = chain.locate(ptr).ok()?;
    let block = chain.block(offset);
    (!block.is_free).then_some(block.size)
  }

  /// Snapshot of every block in address order.
  pub fn blocks(&self) -> Vec<BlockInfo> {
    self.chain.lock().blocks()
  }

  pub fn stats(&self) -> HeapStats {
    self.chain.lock().stats()
  }

  /// Verifies the chain; `Error::Corrupted` names the first broken invariant.
  pub fn check(&self) -> Result<()> {
    self.chain.lock().check()
  }

  pub fn search_mode(&self) -> SearchMode {
    self.chain.lock().search
  }

  /// Options that build a heap with this heap's search policy.
  pub fn options(&self) -> HeapOptions {
    let mut options = HeapOptions::new();
    options.search(self.search_mode());
    options
  }

  /// Address where payload offsets reported by [`Heap::blocks`] start from.
  pub fn base(&self) -> NonNull<u8> {
    self.chain.lock().segment.base()
  }
}

impl<R: HeapLock> Heap<ArenaSegment, R> {
  /// A heap over a fresh private arena of `capacity` bytes.
  pub fn arena(capacity: usize) -> Result<Self> {
    Ok(Self::new(ArenaSegment::with_capacity(capacity)?))
  }
}
