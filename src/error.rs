#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("Invalid argument: {0}")]
  InvalidArgument(&'static str),

  #[error("Out of memory: cannot extend the heap by {requested} bytes")]
  OutOfMemory { requested: usize },

  #[error("Program break moved: expected {expected:#x}, found {found:#x}")]
  BreakMoved { expected: usize, found: usize },

  #[error("Invalid pointer: {0:#x}")]
  InvalidPointer(usize),

  #[error("Corrupted heap: {0}")]
  Corrupted(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
