use crate::{chain::Chain, segment::Segment};

/// How the engine picks a free block for a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
  /// Smallest block that fits, scanning the whole chain. Ties go to the
  /// lowest address.
  #[default]
  BestFit,
  /// First block that fits, scanning from the head.
  FirstFit,
  /// First block that fits, scanning from the most recently touched block and
  /// wrapping around to the head.
  NextFit,
}

impl<S: Segment> Chain<S> {
  pub(crate) fn find_free_block(
    &self,
    size: usize,
  ) -> Option<usize> {
    match self.search {
      SearchMode::BestFit => self.best_fit(size),
      SearchMode::FirstFit => self.offsets().find(|&offset| self.fits(offset, size)),
      SearchMode::NextFit => self.next_fit(size),
    }
  }

  fn fits(
    &self,
    offset: usize,
    size: usize,
  ) -> bool {
    let block = self.block(offset);
    block.is_free && block.size >= size
  }

  fn best_fit(
    &self,
    size: usize,
  ) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;

    for offset in self.offsets() {
      let block = self.block(offset);
      if !block.is_free || block.size < size {
        continue;
      }

      if best.is_none_or(|(_, best_size)| block.size < best_size) {
        best = Some((offset, block.size));
        if block.size == size {
          break;
        }
      }
    }

    best.map(|(offset, _)| offset)
  }

  fn next_fit(
    &self,
    size: usize,
  ) -> Option<usize> {
    let start = self.cursor.or(self.head)?;

    self
      .offsets_from(Some(start))
      .chain(self.offsets().take_while(|&offset| offset != start))
      .find(|&offset| self.fits(offset, size))
  }
}
