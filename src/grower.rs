use tracing::debug;

use crate::{
  block::{Block, HEADER_SIZE, NIL},
  chain::Chain,
  error::{Error, Result},
  segment::Segment,
};

impl<S: Segment> Chain<S> {
  /// Extends the segment by one block of `size` payload bytes and appends it
  /// to the chain, live and tagged.
  ///
  /// On failure nothing is linked and the chain is unchanged.
  pub(crate) fn grow(
    &mut self,
    size: usize,
  ) -> Result<usize> {
    let bytes = size
      .checked_add(HEADER_SIZE)
      .ok_or(Error::OutOfMemory { requested: size })?;

    let offset = self.segment.extend(bytes)?;
    self.write_block(offset, Block::new(size, false, NIL));

    match self.tail {
      Some(tail) => self.block_mut(tail).next = offset,
      None => self.head = Some(offset),
    }
    self.tail = Some(offset);
    self.cursor = Some(offset);

    debug!(offset, size, watermark = self.segment.len(), "heap grown");
    Ok(offset)
  }
}
