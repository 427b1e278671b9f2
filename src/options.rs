use crate::{
  error::Result,
  heap::{Heap, HeapLock, LocalHeap, SyncHeap},
  search::SearchMode,
  segment::{ArenaSegment, Segment},
};

/// Knobs for building a [`Heap`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapOptions {
  search: Option<SearchMode>,

  arena_capacity: usize,
}

impl Default for HeapOptions {
  fn default() -> Self {
    Self {
      search: None,
      arena_capacity: 1 << 20,
    }
  }
}

impl HeapOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Block search policy. Left unset, each lock profile picks its own.
  pub fn search(
    &mut self,
    mode: SearchMode,
  ) -> &mut Self {
    self.search = Some(mode);
    self
  }

  /// Bytes reserved by the arenas this builder creates.
  pub fn arena_capacity(
    &mut self,
    bytes: usize,
  ) -> &mut Self {
    self.arena_capacity = bytes;
    self
  }

  pub fn search_mode(&self) -> Option<SearchMode> {
    self.search
  }

  pub fn build<S: Segment, R: HeapLock>(
    &self,
    segment: S,
  ) -> Heap<S, R> {
    Heap::with_options(segment, self)
  }

  pub fn arena_heap(&self) -> Result<SyncHeap<ArenaSegment>> {
    Ok(self.build(ArenaSegment::with_capacity(self.arena_capacity)?))
  }

  pub fn local_arena_heap(&self) -> Result<LocalHeap<ArenaSegment>> {
    Ok(self.build(ArenaSegment::with_capacity(self.arena_capacity)?))
  }
}
