use std::ptr::NonNull;

use brkheap::{BrkHeap, BrkSegment, Heap};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static HEAP: BrkHeap = Heap::new(BrkSegment::new());

/// Prints the current program break, the upper boundary of the data segment.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    BrkSegment::program_break(),
  );
}

fn print_alloc(
  size: usize,
  ptr: NonNull<u8>,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    ptr,
    BrkSegment::program_break()
  );
}

/// Walks the block chain, one line per block.
fn print_blocks(label: &str) {
  println!("[{label}] {:?}", HEAP.stats());
  for block in HEAP.blocks() {
    println!(
      "    +{:<6} {:>6} bytes  {}",
      block.offset,
      block.size,
      if block.is_free { "free" } else { "used" }
    );
  }
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer())
    .with(EnvFilter::from_default_env())
    .init();

  print_program_break("start");

  // --------------------------------------------------------------------
  // 1) Ten i32s: fill them, read them back.
  // --------------------------------------------------------------------
  let size = 10 * size_of::<i32>();
  let array = HEAP.allocate(size)?;
  print_alloc(size, array);

  let ints = array.cast::<i32>().as_ptr();
  unsafe {
    for i in 0..10 {
      ints.add(i).write(i as i32);
    }
    let values: Vec<i32> = (0..10).map(|i| ints.add(i).read()).collect();
    println!("{values:?}");
  }

  // --------------------------------------------------------------------
  // 2) A few neighbours, so releases have something to merge with.
  // --------------------------------------------------------------------
  let small = HEAP.allocate(16)?;
  let zeroed = HEAP.zero_allocate(8, size_of::<u64>())?;
  print_alloc(16, small);
  print_alloc(64, zeroed);
  print_blocks("after allocations");

  // --------------------------------------------------------------------
  // 3) Release the array and the small block: they coalesce.
  // --------------------------------------------------------------------
  unsafe {
    HEAP.release(array.as_ptr());
    HEAP.release(small.as_ptr());
  }
  print_blocks("after releases");

  // --------------------------------------------------------------------
  // 4) A request that fits the merged block is split out of it; no growth.
  // --------------------------------------------------------------------
  let reused = HEAP.allocate(24)?;
  print_alloc(24, reused);
  println!("reused the freed block? {}", reused == array);

  // --------------------------------------------------------------------
  // 5) Growing past the block moves the contents elsewhere.
  // --------------------------------------------------------------------
  let grown = unsafe { HEAP.resize(zeroed.as_ptr(), 64 * 1024)? };
  print_alloc(64 * 1024, grown);
  print_program_break("after large resize");

  unsafe {
    HEAP.release(reused.as_ptr());
    HEAP.release(grown.as_ptr());
  }
  print_blocks("end");
  HEAP.check()?;

  println!("\nEnd of example. Process will exit and the OS will reclaim all memory.");
  Ok(())
}
