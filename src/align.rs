use core::mem;

/// Machine word size. Headers and payloads are always a multiple of it.
pub const WORD: usize = mem::size_of::<usize>();

/// Rounds a byte count up to the machine word.
///
/// # Examples
///
/// ```rust
/// use brkheap::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Overflow-checked [`align!`]: `None` when rounding up would wrap.
pub fn checked_align(value: usize) -> Option<usize> {
  value.checked_add(WORD - 1).map(|rounded| rounded & !(WORD - 1))
}
